use thiserror::Error;

use crate::scheduler::JobId;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job manager is shut down, submission rejected")]
    ShutDown,

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
