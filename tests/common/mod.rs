//! Shared tasks and helpers for the job manager integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use media_jobs::worker::{from_fn, Cancelled, JobContext, Task};
use media_jobs::Progress;

/// Ordered log of task events, e.g. `start:a`, `end:a`.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == event)
    }
}

/// Records start and end around a fixed sleep. Ignores cancellation.
pub fn recording_task(log: EventLog, name: &str, duration: Duration) -> impl Task {
    let name = name.to_string();
    from_fn(move |_ctx: JobContext, _progress: Progress| async move {
        log.push(format!("start:{}", name));
        tokio::time::sleep(duration).await;
        log.push(format!("end:{}", name));
        anyhow::Ok(())
    })
}

/// Sleeps for `duration` without ever looking at its context.
pub fn sleeping_task(duration: Duration) -> impl Task {
    from_fn(move |_ctx: JobContext, _progress: Progress| async move {
        tokio::time::sleep(duration).await;
        anyhow::Ok(())
    })
}

/// Processes `units` steps of `step` each, reporting progress and checking
/// for cancellation before every step.
pub fn cooperative_task(units: u64, step: Duration) -> impl Task {
    from_fn(move |ctx: JobContext, progress: Progress| async move {
        progress.set_total(units);
        for _ in 0..units {
            ctx.check_cancelled()?;
            tokio::time::sleep(step).await;
            progress.increment();
        }
        anyhow::Ok(())
    })
}

/// Waits until cancelled, then reports it.
pub fn cancellable_task() -> impl Task {
    from_fn(|ctx: JobContext, _progress: Progress| async move {
        ctx.cancelled().await;
        Err::<(), anyhow::Error>(Cancelled.into())
    })
}

pub fn failing_task(message: &'static str) -> impl Task {
    from_fn(move |_ctx: JobContext, _progress: Progress| async move {
        Err::<(), anyhow::Error>(anyhow::anyhow!(message))
    })
}

fn explode(message: &str) -> anyhow::Result<()> {
    panic!("{}", message)
}

pub fn panicking_task(message: &'static str) -> impl Task {
    from_fn(move |_ctx: JobContext, _progress: Progress| async move { explode(message) })
}

/// Blocks until the returned sender fires or is dropped.
pub fn gated_task(log: EventLog, name: &str) -> (impl Task, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let name = name.to_string();
    let task = from_fn(move |_ctx: JobContext, _progress: Progress| async move {
        log.push(format!("start:{}", name));
        let _ = rx.await;
        log.push(format!("end:{}", name));
        anyhow::Ok(())
    });
    (task, tx)
}

/// Tracks how many of its tasks are running at once.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn task(&self, duration: Duration) -> impl Task {
        let gauge = self.clone();
        from_fn(move |_ctx: JobContext, _progress: Progress| async move {
            let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(duration).await;
            gauge.current.fetch_sub(1, Ordering::SeqCst);
            anyhow::Ok(())
        })
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
