use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::library::ports::{MetadataGenerator, SceneReader};
use crate::scheduler::Progress;
use crate::worker::{JobContext, Task};

/// Which generated artefacts to produce. Empty `scene_ids` means every scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateInput {
    pub scene_ids: Vec<String>,
    pub covers: bool,
    pub sprites: bool,
    pub previews: bool,
    pub phashes: bool,
    /// Replace files that already exist.
    pub overwrite: bool,
}

pub(crate) struct GenerateJob {
    pub(crate) input: GenerateInput,
    pub(crate) generator: Arc<dyn MetadataGenerator>,
}

#[async_trait]
impl Task for GenerateJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        tracing::info!(
            job_id = %ctx.job_id(),
            scenes = self.input.scene_ids.len(),
            overwrite = self.input.overwrite,
            "Starting generate"
        );
        self.generator.generate(&ctx, &self.input, &progress).await?;
        tracing::info!(job_id = %ctx.job_id(), "Generate finished");
        Ok(())
    }
}

/// Regenerates the cover of a single scene.
pub(crate) struct ScreenshotJob {
    /// As submitted; parsed when the job runs.
    pub(crate) scene_id: String,
    pub(crate) at: Option<f64>,
    pub(crate) scenes: Arc<dyn SceneReader>,
    pub(crate) generator: Arc<dyn MetadataGenerator>,
}

#[async_trait]
impl Task for ScreenshotJob {
    async fn execute(&mut self, ctx: JobContext, _progress: Progress) -> anyhow::Result<()> {
        let Ok(id) = self.scene_id.trim().parse::<u64>() else {
            tracing::error!(job_id = %ctx.job_id(), scene_id = %self.scene_id, "Invalid scene id");
            return Ok(());
        };

        let Some(scene) = self.scenes.find_scene(id).await? else {
            tracing::error!(job_id = %ctx.job_id(), scene_id = id, "Scene not found");
            return Ok(());
        };

        self.generator
            .generate_screenshot(&ctx, &scene, self.at)
            .await?;
        tracing::info!(
            job_id = %ctx.job_id(),
            scene_id = id,
            at = ?self.at,
            "Generate screenshot finished"
        );
        Ok(())
    }
}
