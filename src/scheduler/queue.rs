use std::collections::{BTreeMap, VecDeque};

use tokio_util::sync::CancellationToken;

use crate::scheduler::job::{Job, JobId, JobRecord, JobStatus};
use crate::scheduler::progress::Progress;
use crate::worker::Task;

/// Everything a worker needs to run a job that just left the queue.
pub struct StartedJob {
    pub id: JobId,
    pub description: String,
    pub task: Box<dyn Task>,
    pub progress: Progress,
    pub cancel: CancellationToken,
}

/// Job table plus the FIFO of jobs waiting for a slot.
///
/// Records are retained after they reach a terminal state; nothing is ever
/// evicted for the lifetime of the process.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: BTreeMap<JobId, Job>,
    pending: VecDeque<JobId>,
    next_id: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and enqueue a new Queued job.
    pub fn add_job(
        &mut self,
        description: impl Into<String>,
        task: Box<dyn Task>,
        cancel: CancellationToken,
    ) -> JobId {
        self.next_id += 1;
        let id = JobId(self.next_id);
        self.jobs.insert(id, Job::new(id, description, task, cancel));
        self.pending.push_back(id);
        id
    }

    pub fn get_job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_job_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Pop the oldest Queued job and mark it Running.
    pub fn start_next(&mut self) -> Option<StartedJob> {
        while let Some(id) = self.pending.pop_front() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if let Some((task, progress, cancel)) = job.start() {
                return Some(StartedJob {
                    id,
                    description: job.description.clone(),
                    task,
                    progress,
                    cancel,
                });
            }
        }
        None
    }

    /// Remove a Queued job from the FIFO and mark it Cancelled. Returns false
    /// if the job is not queued.
    pub fn cancel_queued(&mut self, id: &JobId) -> bool {
        let Some(job) = self.jobs.get_mut(id) else {
            return false;
        };
        if job.status != JobStatus::Queued {
            return false;
        }
        job.cancel_requested = true;
        job.finish(JobStatus::Cancelled, None);
        self.pending.retain(|pending| pending != id);
        true
    }

    /// Cancel every queued job. Returns the ids that were cancelled.
    pub fn cancel_all_queued(&mut self) -> Vec<JobId> {
        let ids: Vec<JobId> = self.pending.iter().copied().collect();
        ids.into_iter()
            .filter(|id| self.cancel_queued(id))
            .collect()
    }

    /// Snapshot of all jobs, ascending by id.
    pub fn all_jobs(&self) -> Vec<JobRecord> {
        self.jobs.values().map(Job::snapshot).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn running_ids(&self) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }
}
