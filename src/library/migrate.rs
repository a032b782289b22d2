use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::library::ports::{HashMigrator, SceneReader};
use crate::scheduler::Progress;
use crate::worker::{run_units, Cancelled, FanOut, JobContext, Task};

/// Moves every scene's generated files to the current hash naming.
pub(crate) struct MigrateHashJob {
    pub(crate) reader: Arc<dyn SceneReader>,
    pub(crate) migrator: Arc<dyn HashMigrator>,
    pub(crate) fan_out: FanOut,
}

#[async_trait]
impl Task for MigrateHashJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        tracing::info!(job_id = %ctx.job_id(), "Migrating generated files");

        let scenes = self
            .reader
            .all_scenes()
            .await
            .context("failed to fetch list of scenes for migration")?;

        let migrator = self.migrator.clone();
        let report = run_units(
            &ctx,
            &progress,
            self.fan_out,
            scenes,
            |scene| format!("Migrating scene {}", scene.id),
            |scene| {
                let migrator = migrator.clone();
                async move { migrator.migrate(scene).await }
            },
        )
        .await;

        if report.was_cut_short() {
            return Err(Cancelled.into());
        }

        tracing::info!(
            job_id = %ctx.job_id(),
            migrated = report.completed,
            failed = report.failed,
            "Finished migrating"
        );
        Ok(())
    }
}
