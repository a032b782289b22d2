pub mod job;
pub mod manager;
pub mod progress;
pub mod queue;

pub use job::{JobId, JobRecord, JobStatus};
pub use manager::JobManager;
pub use progress::{Progress, ProgressSnapshot};
pub use queue::JobQueue;
