pub mod app;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod library;
pub mod scheduler;
pub mod shutdown;
pub mod subscription;
pub mod worker;

pub use error::{JobError, Result};
pub use scheduler::{JobId, JobManager, JobRecord, JobStatus, Progress};
pub use subscription::Broadcaster;
pub use worker::{from_fn, Cancelled, JobContext, Task};
