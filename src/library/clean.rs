use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::library::ports::LibraryCleaner;
use crate::scheduler::Progress;
use crate::subscription::Broadcaster;
use crate::worker::{JobContext, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanInput {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Report what would be removed without deleting anything.
    #[serde(default)]
    pub dry_run: bool,
}

pub(crate) struct CleanJob {
    pub(crate) input: CleanInput,
    pub(crate) cleaner: Arc<dyn LibraryCleaner>,
    pub(crate) broadcaster: Broadcaster,
}

#[async_trait]
impl Task for CleanJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        tracing::info!(
            job_id = %ctx.job_id(),
            paths = self.input.paths.len(),
            dry_run = self.input.dry_run,
            "Starting clean"
        );
        let result = self.cleaner.clean(&ctx, &self.input, &progress).await;
        self.broadcaster.publish();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_input_deserializes_camel_case() {
        let input: CleanInput =
            serde_json::from_str(r#"{"paths": ["/media/videos"], "dryRun": true}"#).unwrap();
        assert!(input.dry_run);
        assert_eq!(input.paths, vec![PathBuf::from("/media/videos")]);
    }
}
