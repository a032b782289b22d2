//! Task execution for the job manager.
//!
//! - [`Task`]: the unit of work, run with a [`JobContext`] and a
//!   [`Progress`](crate::scheduler::Progress) handle
//! - [`JobExecutor`]: runs one task, catches panics and classifies the
//!   outcome as Finished, Cancelled or Failed
//! - [`pool::run_units`]: bounded fan-out for tasks made of many independent
//!   units (batch tagging, hash migration)
//!
//! # Cancellation
//!
//! Cancellation is cooperative. A task polls [`JobContext::is_cancelled`] or
//! [`JobContext::check_cancelled`] between units and returns
//! [`Cancelled`] when asked to stop. Nothing is ever aborted from outside.

pub mod executor;
pub mod pool;
pub mod task;

pub use executor::{ExecutionResult, JobExecutor};
pub use pool::{run_units, FanOut, FanOutReport};
pub use task::{from_fn, Cancelled, JobContext, Task, TaskFn};
