use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::scheduler::{JobId, JobStatus, Progress};
use crate::worker::task::{Cancelled, JobContext, Task};

/// Result of job execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Runs a single task and classifies how it ended.
///
/// Panics inside the task are caught here and reported as Failed, so a
/// misbehaving task never takes down the worker or the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct JobExecutor;

impl JobExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        mut task: Box<dyn Task>,
        ctx: JobContext,
        progress: Progress,
    ) -> ExecutionResult {
        let job_id = ctx.job_id();
        tracing::info!(job_id = %job_id, "Executing job");

        let outcome = AssertUnwindSafe(task.execute(ctx.clone(), progress))
            .catch_unwind()
            .await;

        Self::process_outcome(job_id, ctx.is_cancelled(), outcome)
    }

    fn process_outcome(
        job_id: JobId,
        cancel_requested: bool,
        outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
    ) -> ExecutionResult {
        let (status, error) = match outcome {
            Ok(Ok(())) => {
                if cancel_requested {
                    tracing::warn!(
                        job_id = %job_id,
                        "Cancellation was requested but the task ran to completion"
                    );
                }
                (JobStatus::Finished, None)
            }
            Ok(Err(e)) if e.downcast_ref::<Cancelled>().is_some() => {
                if !cancel_requested {
                    tracing::warn!(
                        job_id = %job_id,
                        "Task reported cancellation without a cancellation request"
                    );
                }
                (JobStatus::Cancelled, None)
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                tracing::error!(job_id = %job_id, error = %message, "Job failed");
                (JobStatus::Failed, Some(message))
            }
            Err(payload) => {
                let message = format!("task panicked: {}", panic_message(payload.as_ref()));
                tracing::error!(job_id = %job_id, error = %message, "Job panicked");
                (JobStatus::Failed, Some(message))
            }
        };

        tracing::info!(job_id = %job_id, status = %status, "Job completed");

        ExecutionResult {
            job_id,
            status,
            error,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
