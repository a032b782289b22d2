use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::scheduler::progress::{Progress, ProgressSnapshot};
use crate::worker::Task;

/// Identifier assigned at submission. Monotonically increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time copy of a job, safe to hand to status pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub description: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: ProgressSnapshot,
    pub error: Option<String>,
    pub cancel_requested: bool,
}

/// Live entry in the manager's job table.
pub struct Job {
    pub id: JobId,
    pub description: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    pub error: Option<String>,
    pub cancel_requested: bool,
    /// Trigger bound to this job's execution context.
    pub cancel: CancellationToken,
    /// Taken by the dispatcher when the job starts.
    pub task: Option<Box<dyn Task>>,
}

impl Job {
    pub fn new(
        id: JobId,
        description: impl Into<String>,
        task: Box<dyn Task>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            progress: Progress::new(),
            error: None,
            cancel_requested: false,
            cancel,
            task: Some(task),
        }
    }

    /// Transition Queued -> Running, handing back what the worker needs.
    pub fn start(&mut self) -> Option<(Box<dyn Task>, Progress, CancellationToken)> {
        if self.status != JobStatus::Queued {
            return None;
        }
        let task = self.task.take()?;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.progress = Progress::new();
        Some((task, self.progress.clone(), self.cancel.clone()))
    }

    /// Set the terminal state. Only the first call has any effect.
    pub fn finish(&mut self, status: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(Utc::now());
        self.task = None;
        true
    }

    pub fn snapshot(&self) -> JobRecord {
        JobRecord {
            id: self.id,
            description: self.description.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            progress: self.progress.snapshot(),
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("status", &self.status)
            .field("cancel_requested", &self.cancel_requested)
            .finish_non_exhaustive()
    }
}
