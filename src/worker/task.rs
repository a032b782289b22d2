use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{JobId, Progress};

/// Returned by a task that stopped early because cancellation was requested.
///
/// The executor maps this (also when wrapped in `anyhow` context) to a
/// Cancelled job instead of a Failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job cancelled")]
pub struct Cancelled;

/// Cancellable execution context handed to a running task.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    token: CancellationToken,
}

impl JobContext {
    pub fn new(job_id: JobId, token: CancellationToken) -> Self {
        Self { job_id, token }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Checkpoint for use with `?`: errors with [`Cancelled`] once the job
    /// has been asked to stop.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A unit of work the job manager can run.
#[async_trait]
pub trait Task: Send + 'static {
    /// Run to completion. Implementations should poll `ctx` at each unit of
    /// work and return `Err(Cancelled)` (see [`JobContext::check_cancelled`])
    /// once cancellation is observed.
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()>;
}

/// Task built from a closure. See [`from_fn`].
pub struct TaskFn<F> {
    f: Option<F>,
}

/// Wrap a one-shot async closure as a [`Task`].
pub fn from_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: FnOnce(JobContext, Progress) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    TaskFn { f: Some(f) }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: FnOnce(JobContext, Progress) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        match self.f.take() {
            Some(f) => f(ctx, progress).await,
            None => anyhow::bail!("task already executed"),
        }
    }
}
