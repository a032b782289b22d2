use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Read-only copy of a job's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Expected unit count, `None` while indeterminate.
    pub total: Option<u64>,
    pub processed: u64,
    /// In `[0, 100]`, `None` until derived or set.
    pub percent: Option<f64>,
    pub current_task: Option<String>,
}

#[derive(Debug, Default)]
struct ProgressState {
    total: Option<u64>,
    processed: u64,
    percent: Option<f64>,
    /// Open sub-task labels in start order; the newest is reported.
    labels: Vec<(u64, String)>,
    next_label: u64,
}

impl ProgressState {
    fn recompute(&mut self) {
        if let Some(total) = self.total {
            self.percent = Some(if total == 0 {
                100.0
            } else {
                self.processed as f64 / total as f64 * 100.0
            });
        }
    }
}

/// Progress handle shared between a running task and status readers.
///
/// Clones refer to the same tracker. Mutators take a short lock and never
/// block on job execution, so a poller can snapshot at any time.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    inner: Arc<Mutex<ProgressState>>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the expected unit count. Resets `processed` to 0.
    pub fn set_total(&self, total: u64) {
        let mut state = self.state();
        state.total = Some(total);
        state.processed = 0;
        state.recompute();
    }

    /// Mark one unit done. Never moves `processed` past a known total.
    pub fn increment(&self) {
        let mut state = self.state();
        match state.total {
            Some(total) if state.processed >= total => {}
            _ => state.processed += 1,
        }
        state.recompute();
    }

    /// Direct override for phases without a countable unit. Clamped to `[0, 100]`.
    pub fn set_percent(&self, percent: f64) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.state().percent = Some(percent);
    }

    /// Run `f` with `description` as the current label, restoring the
    /// previous label afterwards (also on unwind).
    pub fn execute_subtask<T>(&self, description: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let _label = self.push_label(description.into());
        f()
    }

    /// Async counterpart of [`Progress::execute_subtask`]. The label is
    /// restored even if the future is dropped before completion.
    pub async fn execute_subtask_async<F>(
        &self,
        description: impl Into<String>,
        fut: F,
    ) -> F::Output
    where
        F: Future,
    {
        let _label = self.push_label(description.into());
        fut.await
    }

    fn push_label(&self, description: String) -> LabelGuard {
        let mut state = self.state();
        state.next_label += 1;
        let id = state.next_label;
        state.labels.push((id, description));
        LabelGuard {
            progress: self.clone(),
            id,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state();
        ProgressSnapshot {
            total: state.total,
            processed: state.processed,
            percent: state.percent,
            current_task: state.labels.last().map(|(_, label)| label.clone()),
        }
    }
}

struct LabelGuard {
    progress: Progress,
    id: u64,
}

impl Drop for LabelGuard {
    fn drop(&mut self) {
        // Only this sub-task's entry goes; siblings may end in any order.
        self.progress
            .state()
            .labels
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_is_indeterminate() {
        let snap = Progress::new().snapshot();
        assert_eq!(snap, ProgressSnapshot::default());
    }

    #[test]
    fn test_increment_up_to_total() {
        let progress = Progress::new();
        progress.set_total(10);
        for _ in 0..10 {
            progress.increment();
        }
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 10);
        assert_eq!(snap.percent, Some(100.0));
    }

    #[test]
    fn test_increment_never_exceeds_total() {
        let progress = Progress::new();
        progress.set_total(3);
        for _ in 0..7 {
            progress.increment();
        }
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 3);
        assert_eq!(snap.total, Some(3));
        assert_eq!(snap.percent, Some(100.0));
    }

    #[test]
    fn test_set_total_resets_processed() {
        let progress = Progress::new();
        progress.set_total(4);
        progress.increment();
        progress.increment();
        assert_eq!(progress.snapshot().percent, Some(50.0));

        progress.set_total(8);
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.percent, Some(0.0));
    }

    #[test]
    fn test_increment_without_total_counts_but_no_percent() {
        let progress = Progress::new();
        progress.increment();
        progress.increment();
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 2);
        assert!(snap.total.is_none());
        assert!(snap.percent.is_none());
    }

    #[test]
    fn test_zero_total_is_complete() {
        let progress = Progress::new();
        progress.set_total(0);
        progress.increment();
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.percent, Some(100.0));
    }

    #[test]
    fn test_set_percent_clamps() {
        let progress = Progress::new();
        progress.set_percent(150.0);
        assert_eq!(progress.snapshot().percent, Some(100.0));
        progress.set_percent(-3.0);
        assert_eq!(progress.snapshot().percent, Some(0.0));
        progress.set_percent(42.5);
        assert_eq!(progress.snapshot().percent, Some(42.5));
    }

    #[test]
    fn test_nested_subtasks_restore_parent_label() {
        let progress = Progress::new();
        progress.execute_subtask("parent", || {
            assert_eq!(progress.snapshot().current_task.as_deref(), Some("parent"));
            progress.execute_subtask("child", || {
                assert_eq!(progress.snapshot().current_task.as_deref(), Some("child"));
            });
            assert_eq!(progress.snapshot().current_task.as_deref(), Some("parent"));
        });
        assert!(progress.snapshot().current_task.is_none());
    }

    #[test]
    fn test_overlapping_subtasks_end_out_of_order() {
        let progress = Progress::new();
        let outer = progress.push_label("phase".to_string());
        let first = progress.push_label("unit 0".to_string());
        let second = progress.push_label("unit 1".to_string());
        assert_eq!(progress.snapshot().current_task.as_deref(), Some("unit 1"));

        drop(first);
        assert_eq!(progress.snapshot().current_task.as_deref(), Some("unit 1"));
        drop(second);
        assert_eq!(progress.snapshot().current_task.as_deref(), Some("phase"));
        drop(outer);
        assert!(progress.snapshot().current_task.is_none());
    }

    #[test]
    fn test_subtask_returns_value() {
        let progress = Progress::new();
        let value = progress.execute_subtask("compute", || 21 * 2);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_subtask_label_restored_after_panic() {
        let progress = Progress::new();
        let cloned = progress.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: () = cloned.execute_subtask("explodes", || panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(progress.snapshot().current_task.is_none());
    }

    #[tokio::test]
    async fn test_async_subtask_restores_label() {
        let progress = Progress::new();
        let inner = progress.clone();
        progress
            .execute_subtask_async("outer", async {
                inner
                    .execute_subtask_async("inner", async {
                        assert_eq!(inner.snapshot().current_task.as_deref(), Some("inner"));
                    })
                    .await;
                assert_eq!(inner.snapshot().current_task.as_deref(), Some("outer"));
            })
            .await;
        assert!(progress.snapshot().current_task.is_none());
    }

    #[test]
    fn test_concurrent_increments() {
        let progress = Progress::new();
        progress.set_total(400);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = progress.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        p.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.snapshot().processed, 400);
    }
}
