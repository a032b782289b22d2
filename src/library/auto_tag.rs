use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::library::ports::AutoTagger;
use crate::scheduler::Progress;
use crate::worker::{Cancelled, JobContext, Task};

/// Auto-tag request. Each list holds entity ids or `"*"` for every entity
/// of that kind. With all three lists empty, every kind is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoTagInput {
    /// Files to tag; empty for every file.
    pub paths: Vec<PathBuf>,
    pub performers: Vec<String>,
    pub studios: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoTagKind {
    Performer,
    Studio,
    Tag,
}

impl std::fmt::Display for AutoTagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutoTagKind::Performer => write!(f, "performers"),
            AutoTagKind::Studio => write!(f, "studios"),
            AutoTagKind::Tag => write!(f, "tags"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoTagSelector {
    All,
    Ids(Vec<u64>),
}

impl AutoTagSelector {
    /// `None` when nothing usable was requested.
    fn parse(raw: &[String]) -> Option<Self> {
        if raw.iter().any(|id| id.trim() == "*") {
            return Some(AutoTagSelector::All);
        }
        let ids: Vec<u64> = raw
            .iter()
            .filter_map(|id| match id.trim().parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::debug!(id = %id, "Ignoring non-numeric id");
                    None
                }
            })
            .collect();
        (!ids.is_empty()).then_some(AutoTagSelector::Ids(ids))
    }
}

impl AutoTagInput {
    /// One pass per requested kind, in performer, studio, tag order.
    pub fn passes(&self) -> Vec<(AutoTagKind, AutoTagSelector)> {
        let requested = [
            (AutoTagKind::Performer, &self.performers),
            (AutoTagKind::Studio, &self.studios),
            (AutoTagKind::Tag, &self.tags),
        ];
        if requested.iter().all(|(_, ids)| ids.is_empty()) {
            return requested
                .iter()
                .map(|(kind, _)| (*kind, AutoTagSelector::All))
                .collect();
        }
        requested
            .iter()
            .filter_map(|(kind, ids)| {
                AutoTagSelector::parse(ids).map(|selector| (*kind, selector))
            })
            .collect()
    }
}

pub(crate) struct AutoTagJob {
    pub(crate) input: AutoTagInput,
    pub(crate) tagger: Arc<dyn AutoTagger>,
}

#[async_trait]
impl Task for AutoTagJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        let passes = self.input.passes();
        progress.set_total(passes.len() as u64);

        let mut tagged = 0usize;
        for (kind, selector) in &passes {
            ctx.check_cancelled()?;

            let result = progress
                .execute_subtask_async(
                    format!("Auto-tagging {}", kind),
                    self.tagger.auto_tag(&ctx, *kind, selector, &self.input.paths),
                )
                .await;
            match result {
                Ok(count) => tagged += count,
                Err(e) if e.downcast_ref::<Cancelled>().is_some() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        job_id = %ctx.job_id(),
                        kind = %kind,
                        error = %format!("{:#}", e),
                        "Auto-tag pass failed"
                    );
                }
            }
            progress.increment();
        }

        tracing::info!(
            job_id = %ctx.job_id(),
            passes = passes.len(),
            files = tagged,
            "Finished auto-tagging"
        );
        Ok(())
    }
}
