use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{ManagerConfig, ShutdownMode};
use crate::error::{JobError, Result};
use crate::scheduler::job::{JobId, JobRecord, JobStatus};
use crate::scheduler::queue::{JobQueue, StartedJob};
use crate::worker::{JobContext, JobExecutor, Task};

struct Shared {
    config: ManagerConfig,
    queue: Mutex<JobQueue>,
    accepting: AtomicBool,
    /// Parent of every job's cancellation token.
    root: CancellationToken,
    slots: Arc<Semaphore>,
    /// Wakes the dispatcher: new submission or shutdown.
    wake: Notify,
    /// Wakes `wait` callers: some job reached a terminal state.
    finished: Notify,
    workers: TaskTracker,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    executor: JobExecutor,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, JobQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the job table and runs submitted tasks with bounded concurrency.
///
/// Jobs start in submission order. At most `max_concurrency` run at once;
/// each runs on its own Tokio task so the dispatcher keeps managing slots.
/// Clones are handles to the same manager.
#[derive(Clone)]
pub struct JobManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("config", &self.shared.config)
            .field("accepting", &self.shared.accepting.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Create the manager and start its dispatcher. Must be called inside a
    /// Tokio runtime.
    pub fn new(config: ManagerConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(JobQueue::new()),
            accepting: AtomicBool::new(true),
            root: CancellationToken::new(),
            slots,
            wake: Notify::new(),
            finished: Notify::new(),
            workers: TaskTracker::new(),
            dispatcher: Mutex::new(None),
            executor: JobExecutor::new(),
        });

        let handle = tokio::spawn(Self::dispatch_loop(shared.clone()));
        *shared
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tracing::info!(
            max_concurrency = shared.config.max_concurrency,
            "Job manager started"
        );
        Self { shared }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Queue a task and return its id without waiting for it to run.
    pub fn submit(&self, description: impl Into<String>, task: impl Task) -> Result<JobId> {
        self.submit_boxed(description, Box::new(task))
    }

    pub fn submit_boxed(
        &self,
        description: impl Into<String>,
        task: Box<dyn Task>,
    ) -> Result<JobId> {
        let description = description.into();
        let id = {
            let mut queue = self.shared.queue();
            // Checked under the queue lock so shutdown cannot miss a submission.
            if !self.shared.accepting.load(Ordering::SeqCst) {
                return Err(JobError::ShutDown);
            }
            queue.add_job(description.clone(), task, self.shared.root.child_token())
        };

        tracing::info!(job_id = %id, description = %description, "Job submitted");
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Snapshot of every known job, ascending by id.
    pub fn list(&self) -> Vec<JobRecord> {
        self.shared.queue().all_jobs()
    }

    pub fn get(&self, id: JobId) -> Result<JobRecord> {
        self.shared
            .queue()
            .get_job(&id)
            .map(|job| job.snapshot())
            .ok_or(JobError::NotFound(id))
    }

    /// Cancel a job.
    ///
    /// A queued job is removed and marked Cancelled without ever running. A
    /// running job has its context cancelled; the task decides when to stop.
    /// Returns `Ok(false)` if the job had already ended.
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        let changed = {
            let mut queue = self.shared.queue();
            if queue.cancel_queued(&id) {
                tracing::info!(job_id = %id, "Queued job cancelled");
                true
            } else {
                let job = queue.get_job_mut(&id).ok_or(JobError::NotFound(id))?;
                match job.status {
                    JobStatus::Running => {
                        job.cancel_requested = true;
                        job.cancel.cancel();
                        tracing::info!(job_id = %id, "Cancellation requested for running job");
                        true
                    }
                    _ => false,
                }
            }
        };
        if changed {
            self.shared.finished.notify_waiters();
        }
        Ok(changed)
    }

    /// Wait until the job reaches a terminal state and return its record.
    pub async fn wait(&self, id: JobId) -> Result<JobRecord> {
        loop {
            let notified = self.shared.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let record = self.get(id)?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            notified.await;
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting submissions and wind down.
    ///
    /// `Drain` lets queued and running jobs finish; `Cancel` cancels queued
    /// jobs and requests cancellation of running ones. Either way this
    /// returns once every worker has returned. Calling it again is harmless.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let (first, queued, running) = {
            let queue = self.shared.queue();
            (
                self.shared.accepting.swap(false, Ordering::SeqCst),
                queue.pending_count(),
                queue.running_count(),
            )
        };
        if first {
            tracing::info!(mode = ?mode, queued, running, "Job manager shutting down");
        }

        if mode == ShutdownMode::Cancel {
            let cancelled = self.shared.queue().cancel_all_queued();
            if !cancelled.is_empty() {
                tracing::info!(count = cancelled.len(), "Queued jobs cancelled by shutdown");
            }
            self.cancel_running();
            self.shared.finished.notify_waiters();
        }
        self.shared.wake.notify_one();

        let dispatcher = self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher exited abnormally");
            }
            self.shared.workers.close();
        }

        self.shared.workers.wait().await;
        if first {
            tracing::info!("Job manager stopped");
        }
    }

    fn cancel_running(&self) {
        let mut queue = self.shared.queue();
        for id in queue.running_ids() {
            if let Some(job) = queue.get_job_mut(&id) {
                job.cancel_requested = true;
                job.cancel.cancel();
            }
        }
    }

    /// Single coordinator: take a slot, then the oldest queued job, then hand
    /// both to a worker. Exits once shut down with nothing left queued.
    async fn dispatch_loop(shared: Arc<Shared>) {
        loop {
            let permit = match shared.slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let started = loop {
                let notified = shared.wake.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                {
                    let mut queue = shared.queue();
                    if let Some(started) = queue.start_next() {
                        break Some(started);
                    }
                    if !shared.accepting.load(Ordering::SeqCst) && queue.pending_count() == 0 {
                        break None;
                    }
                }
                notified.await;
            };

            let Some(started) = started else {
                break;
            };

            let StartedJob {
                id,
                description,
                task,
                progress,
                cancel,
            } = started;
            tracing::info!(job_id = %id, description = %description, "Job started");

            let worker_shared = shared.clone();
            shared.workers.spawn(async move {
                let ctx = JobContext::new(id, cancel);
                let result = worker_shared.executor.execute(task, ctx, progress).await;
                {
                    let mut queue = worker_shared.queue();
                    if let Some(job) = queue.get_job_mut(&id) {
                        if job.cancel_requested && result.status != JobStatus::Cancelled {
                            tracing::warn!(
                                job_id = %id,
                                status = %result.status,
                                "Job ignored cancellation request"
                            );
                        }
                        job.finish(result.status, result.error);
                    }
                }
                drop(permit);
                worker_shared.finished.notify_waiters();
            });
        }
        tracing::debug!("Dispatcher stopped");
    }
}
