use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::scheduler::Progress;
use crate::worker::task::JobContext;

/// How a task fans out its independent units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// One unit at a time, in order.
    Serial,
    /// Up to `n` units in flight.
    Concurrent(usize),
}

impl FanOut {
    pub fn limit(&self) -> usize {
        match self {
            FanOut::Serial => 1,
            FanOut::Concurrent(n) => (*n).max(1),
        }
    }
}

impl Default for FanOut {
    fn default() -> Self {
        FanOut::Concurrent(4)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub completed: usize,
    pub failed: usize,
    /// Units never started because cancellation was observed.
    pub skipped: usize,
}

impl FanOutReport {
    pub fn was_cut_short(&self) -> bool {
        self.skipped > 0
    }
}

/// Bounded worker pool for the units of a single job.
///
/// Sets the progress total to the number of units, checks cancellation
/// before launching each unit, and increments progress as units finish.
/// Once cancellation is seen no new unit is launched, but units already in
/// flight run to completion before this returns. A failing or panicking unit
/// is counted and logged; it does not stop its siblings.
pub async fn run_units<U, F, Fut>(
    ctx: &JobContext,
    progress: &Progress,
    mode: FanOut,
    units: Vec<U>,
    describe: impl Fn(&U) -> String,
    work: F,
) -> FanOutReport
where
    U: Send + 'static,
    F: Fn(U) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let total = units.len();
    progress.set_total(total as u64);

    let slots = Arc::new(Semaphore::new(mode.limit()));
    let mut in_flight = JoinSet::new();
    let mut report = FanOutReport::default();
    let mut launched = 0usize;

    for unit in units {
        if ctx.is_cancelled() {
            break;
        }
        let permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let label = describe(&unit);
        let unit_work = work(unit);
        let progress = progress.clone();
        in_flight.spawn(async move {
            let result = progress
                .execute_subtask_async(label.clone(), unit_work)
                .await;
            progress.increment();
            drop(permit);
            (label, result)
        });
        launched += 1;
    }

    report.skipped = total - launched;
    if report.skipped > 0 {
        tracing::info!(
            job_id = %ctx.job_id(),
            skipped = report.skipped,
            "Stopping due to user request, waiting for in-flight units"
        );
    }

    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.completed += 1,
            Ok((label, Err(e))) => {
                report.failed += 1;
                let message = format!("{:#}", e);
                tracing::warn!(job_id = %ctx.job_id(), unit = %label, error = %message, "Unit failed");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(job_id = %ctx.job_id(), error = %e, "Unit panicked");
            }
        }
    }

    report
}
