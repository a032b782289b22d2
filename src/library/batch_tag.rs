use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StashBoxConfig;
use crate::library::ports::{ExternalTagger, TagKind, TagRequest, TagTarget, TagTargetReader};
use crate::scheduler::Progress;
use crate::worker::{run_units, Cancelled, FanOut, JobContext, Task};

/// Batch tag request. With neither ids nor names, every entity whose link
/// state matches `refresh` is tagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTagInput {
    /// Index into the configured endpoints.
    pub endpoint: i64,
    #[serde(default, alias = "performer_ids")]
    pub ids: Vec<String>,
    #[serde(default, alias = "performer_names")]
    pub names: Vec<String>,
    /// Re-tag entities already linked if true; otherwise only unlinked ones.
    #[serde(default)]
    pub refresh: bool,
    /// Studios only: also create missing parent studios.
    #[serde(default)]
    pub create_parent: bool,
    #[serde(default, alias = "exclude_fields")]
    pub exclude_fields: Vec<String>,
}

pub(crate) struct BatchTagJob {
    pub(crate) kind: TagKind,
    pub(crate) input: BatchTagInput,
    pub(crate) endpoints: Vec<StashBoxConfig>,
    pub(crate) reader: Arc<dyn TagTargetReader>,
    pub(crate) tagger: Arc<dyn ExternalTagger>,
    pub(crate) fan_out: FanOut,
}

impl BatchTagJob {
    fn endpoint(&self) -> Option<&StashBoxConfig> {
        usize::try_from(self.input.endpoint)
            .ok()
            .and_then(|index| self.endpoints.get(index))
    }

    async fn select_targets(&self, endpoint: &StashBoxConfig) -> anyhow::Result<Vec<TagTarget>> {
        let input = &self.input;

        if !input.ids.is_empty() {
            let mut targets = Vec::new();
            for raw in &input.ids {
                let Ok(id) = raw.trim().parse::<u64>() else {
                    tracing::debug!(id = %raw, "Ignoring non-numeric id");
                    continue;
                };
                match self.reader.find(self.kind, id).await? {
                    // Only entities whose link state matches the refresh choice.
                    Some(target) if target.is_linked() == input.refresh => targets.push(target),
                    Some(_) => {}
                    None => tracing::warn!(kind = %self.kind, id, "Entity not found, skipping"),
                }
            }
            Ok(targets)
        } else if !input.names.is_empty() {
            Ok(input
                .names
                .iter()
                .filter(|name| !name.is_empty())
                .map(|name| TagTarget::named(name.as_str()))
                .collect())
        } else {
            self.reader
                .find_by_link_status(self.kind, input.refresh, &endpoint.endpoint)
                .await
        }
    }
}

#[async_trait]
impl Task for BatchTagJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        tracing::info!(job_id = %ctx.job_id(), kind = %self.kind, "Initiating batch tag");

        let Some(endpoint) = self.endpoint().cloned() else {
            tracing::error!(
                job_id = %ctx.job_id(),
                endpoint = self.input.endpoint,
                "Invalid endpoint index"
            );
            return Ok(());
        };

        let targets = self.select_targets(&endpoint).await?;
        if targets.is_empty() {
            tracing::info!(job_id = %ctx.job_id(), kind = %self.kind, "Nothing to tag");
            return Ok(());
        }

        tracing::info!(
            job_id = %ctx.job_id(),
            kind = %self.kind,
            count = targets.len(),
            endpoint = %endpoint.endpoint,
            "Starting batch tag operation"
        );

        let requests: Vec<TagRequest> = targets
            .into_iter()
            .map(|target| TagRequest {
                kind: self.kind,
                // Entities created by name have nothing to refresh.
                refresh: self.input.refresh && target.id.is_some(),
                target,
                endpoint: endpoint.clone(),
                create_parent: self.input.create_parent,
                exclude_fields: self.input.exclude_fields.clone(),
            })
            .collect();

        let tagger = self.tagger.clone();
        let report = run_units(
            &ctx,
            &progress,
            self.fan_out,
            requests,
            TagRequest::describe,
            |request| {
                let tagger = tagger.clone();
                async move { tagger.tag(request).await }
            },
        )
        .await;

        if report.was_cut_short() {
            return Err(Cancelled.into());
        }

        tracing::info!(
            job_id = %ctx.job_id(),
            kind = %self.kind,
            tagged = report.completed,
            failed = report.failed,
            "Batch tag finished"
        );
        Ok(())
    }
}
