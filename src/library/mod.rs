//! Media-library job kinds built on the job manager.
//!
//! [`LibraryTasks`] turns each library operation into a [`Task`] and submits
//! it, returning the job id. Collaborators are attached with the `with_*`
//! builders; an operation whose collaborator is missing is refused with a
//! config error at submission.

pub mod auto_tag;
pub mod batch_tag;
pub mod clean;
pub mod generate;
pub mod migrate;
pub mod ports;
pub mod scan;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::LibraryConfig;
use crate::error::{JobError, Result};
use crate::scheduler::{JobId, JobManager};
use crate::subscription::Broadcaster;
use crate::worker::{from_fn, Task};

pub use auto_tag::{AutoTagInput, AutoTagKind, AutoTagSelector};
pub use batch_tag::BatchTagInput;
pub use clean::CleanInput;
pub use generate::GenerateInput;
pub use ports::{
    AutoTagger, DatabaseOptimiser, ExternalTagger, HashMigrator, LibraryCleaner, LibraryScanner,
    MediaKind, MetadataGenerator, MetadataPorter, Scene, SceneReader, ScannedFile, TagKind,
    TagRequest, TagTarget, TagTargetReader,
};
pub use scan::{resolve_scan_paths, FsScanner, ScanInput};

use auto_tag::AutoTagJob;
use batch_tag::BatchTagJob;
use clean::CleanJob;
use generate::{GenerateJob, ScreenshotJob};
use migrate::MigrateHashJob;
use scan::ScanJob;

#[derive(Clone, Default)]
struct Collaborators {
    scanner: Option<Arc<dyn LibraryScanner>>,
    cleaner: Option<Arc<dyn LibraryCleaner>>,
    porter: Option<Arc<dyn MetadataPorter>>,
    optimiser: Option<Arc<dyn DatabaseOptimiser>>,
    scenes: Option<Arc<dyn SceneReader>>,
    migrator: Option<Arc<dyn HashMigrator>>,
    tag_targets: Option<Arc<dyn TagTargetReader>>,
    tagger: Option<Arc<dyn ExternalTagger>>,
    generator: Option<Arc<dyn MetadataGenerator>>,
    auto_tagger: Option<Arc<dyn AutoTagger>>,
}

fn require<T: ?Sized>(collaborator: &Option<Arc<T>>, what: &str) -> Result<Arc<T>> {
    collaborator
        .clone()
        .ok_or_else(|| JobError::Config(format!("no {} configured", what)))
}

/// Submits library operations to a [`JobManager`]. Cheap to clone.
#[derive(Clone)]
pub struct LibraryTasks {
    manager: JobManager,
    scan_events: Broadcaster,
    config: Arc<LibraryConfig>,
    collaborators: Collaborators,
}

impl std::fmt::Debug for LibraryTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryTasks")
            .field("config", &self.config)
            .field("scan_events", &self.scan_events)
            .finish_non_exhaustive()
    }
}

impl LibraryTasks {
    pub fn new(manager: JobManager, scan_events: Broadcaster, config: LibraryConfig) -> Self {
        Self {
            manager,
            scan_events,
            config: Arc::new(config),
            collaborators: Collaborators::default(),
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn LibraryScanner>) -> Self {
        self.collaborators.scanner = Some(scanner);
        self
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn LibraryCleaner>) -> Self {
        self.collaborators.cleaner = Some(cleaner);
        self
    }

    pub fn with_metadata_porter(mut self, porter: Arc<dyn MetadataPorter>) -> Self {
        self.collaborators.porter = Some(porter);
        self
    }

    pub fn with_optimiser(mut self, optimiser: Arc<dyn DatabaseOptimiser>) -> Self {
        self.collaborators.optimiser = Some(optimiser);
        self
    }

    pub fn with_hash_migration(
        mut self,
        scenes: Arc<dyn SceneReader>,
        migrator: Arc<dyn HashMigrator>,
    ) -> Self {
        self.collaborators.scenes = Some(scenes);
        self.collaborators.migrator = Some(migrator);
        self
    }

    pub fn with_tagging(
        mut self,
        targets: Arc<dyn TagTargetReader>,
        tagger: Arc<dyn ExternalTagger>,
    ) -> Self {
        self.collaborators.tag_targets = Some(targets);
        self.collaborators.tagger = Some(tagger);
        self
    }

    /// Screenshots also look scenes up through the reader given to
    /// [`LibraryTasks::with_hash_migration`] or [`LibraryTasks::with_scene_reader`].
    pub fn with_generator(mut self, generator: Arc<dyn MetadataGenerator>) -> Self {
        self.collaborators.generator = Some(generator);
        self
    }

    pub fn with_scene_reader(mut self, scenes: Arc<dyn SceneReader>) -> Self {
        self.collaborators.scenes = Some(scenes);
        self
    }

    pub fn with_auto_tagger(mut self, tagger: Arc<dyn AutoTagger>) -> Self {
        self.collaborators.auto_tagger = Some(tagger);
        self
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Notified after every scan or clean job ends. See [`Broadcaster`].
    pub fn subscribe_scan(&self, token: CancellationToken) -> mpsc::Receiver<bool> {
        self.scan_events.subscribe(token)
    }

    pub fn scan(&self, input: ScanInput) -> Result<JobId> {
        let job = ScanJob {
            input,
            library: self.config.clone(),
            scanner: require(&self.collaborators.scanner, "library scanner")?,
            broadcaster: self.scan_events.clone(),
        };
        self.manager.submit("Scanning...", job)
    }

    pub fn clean(&self, input: CleanInput) -> Result<JobId> {
        let job = CleanJob {
            input,
            cleaner: require(&self.collaborators.cleaner, "library cleaner")?,
            broadcaster: self.scan_events.clone(),
        };
        self.manager.submit("Cleaning...", job)
    }

    pub fn import(&self) -> Result<JobId> {
        let dir = self.metadata_path()?;
        let porter = require(&self.collaborators.porter, "metadata porter")?;
        self.manager.submit(
            "Importing...",
            from_fn(move |ctx, progress| async move {
                porter.import(&ctx, &dir, &progress).await
            }),
        )
    }

    pub fn export(&self) -> Result<JobId> {
        let dir = self.metadata_path()?;
        let porter = require(&self.collaborators.porter, "metadata porter")?;
        self.manager.submit(
            "Exporting...",
            from_fn(move |ctx, progress| async move {
                porter.export(&ctx, &dir, &progress).await
            }),
        )
    }

    pub fn optimise_database(&self) -> Result<JobId> {
        let optimiser = require(&self.collaborators.optimiser, "database optimiser")?;
        self.manager.submit(
            "Optimising database...",
            from_fn(move |ctx, _progress| async move { optimiser.optimise(&ctx).await }),
        )
    }

    pub fn generate(&self, input: GenerateInput) -> Result<JobId> {
        let job = GenerateJob {
            input,
            generator: require(&self.collaborators.generator, "metadata generator")?,
        };
        self.manager.submit("Generating...", job)
    }

    /// Regenerate one scene's cover at `at` seconds, or the default offset.
    /// An unparsable or unknown id is logged when the job runs.
    pub fn generate_screenshot(&self, scene_id: &str, at: Option<f64>) -> Result<JobId> {
        let job = ScreenshotJob {
            scene_id: scene_id.to_string(),
            at,
            scenes: require(&self.collaborators.scenes, "scene reader")?,
            generator: require(&self.collaborators.generator, "metadata generator")?,
        };
        self.manager.submit(
            format!("Generating screenshot for scene id {}", scene_id),
            job,
        )
    }

    pub fn auto_tag(&self, input: AutoTagInput) -> Result<JobId> {
        let job = AutoTagJob {
            input,
            tagger: require(&self.collaborators.auto_tagger, "auto tagger")?,
        };
        self.manager.submit("Auto-tagging...", job)
    }

    pub fn migrate_hash(&self) -> Result<JobId> {
        let job = MigrateHashJob {
            reader: require(&self.collaborators.scenes, "scene reader")?,
            migrator: require(&self.collaborators.migrator, "hash migrator")?,
            fan_out: self.config.fan_out,
        };
        self.manager.submit("Migrating scene hashes...", job)
    }

    pub fn batch_tag_performers(&self, input: BatchTagInput) -> Result<JobId> {
        let job = self.batch_tag_job(TagKind::Performer, input)?;
        self.manager.submit("Batch stash-box performer tag...", job)
    }

    pub fn batch_tag_studios(&self, input: BatchTagInput) -> Result<JobId> {
        let job = self.batch_tag_job(TagKind::Studio, input)?;
        self.manager.submit("Batch stash-box studio tag...", job)
    }

    /// Submit an arbitrary task under its own description.
    pub fn run_single(&self, description: impl Into<String>, task: impl Task) -> Result<JobId> {
        self.manager.submit(description, task)
    }

    fn batch_tag_job(&self, kind: TagKind, input: BatchTagInput) -> Result<BatchTagJob> {
        Ok(BatchTagJob {
            kind,
            input,
            endpoints: self.config.stash_boxes.clone(),
            reader: require(&self.collaborators.tag_targets, "tag target reader")?,
            tagger: require(&self.collaborators.tagger, "external tagger")?,
            fan_out: self.config.fan_out,
        })
    }

    fn metadata_path(&self) -> Result<std::path::PathBuf> {
        self.config
            .metadata_path
            .clone()
            .ok_or_else(|| JobError::Config("metadata path must be set in config".to_string()))
    }
}
