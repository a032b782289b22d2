//! Collaborators the library jobs drive.
//!
//! The job kinds own sequencing, progress and cancellation; the actual file,
//! database and network work sits behind these traits so each can be swapped
//! or faked in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{LibraryPath, StashBoxConfig};
use crate::library::auto_tag::{AutoTagKind, AutoTagSelector};
use crate::library::clean::CleanInput;
use crate::library::generate::GenerateInput;
use crate::scheduler::Progress;
use crate::worker::JobContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub modified: Option<DateTime<Utc>>,
}

/// Walks one resolved library path.
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    /// Scan `target`, skipping files last modified before `min_mod_time`.
    /// Returns the number of files picked up.
    async fn scan(
        &self,
        ctx: &JobContext,
        target: &LibraryPath,
        min_mod_time: Option<DateTime<Utc>>,
    ) -> anyhow::Result<usize>;
}

#[async_trait]
pub trait LibraryCleaner: Send + Sync {
    async fn clean(
        &self,
        ctx: &JobContext,
        input: &CleanInput,
        progress: &Progress,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MetadataPorter: Send + Sync {
    async fn import(&self, ctx: &JobContext, dir: &Path, progress: &Progress)
        -> anyhow::Result<()>;
    async fn export(&self, ctx: &JobContext, dir: &Path, progress: &Progress)
        -> anyhow::Result<()>;
}

#[async_trait]
pub trait DatabaseOptimiser: Send + Sync {
    async fn optimise(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: u64,
    pub path: PathBuf,
    pub checksum: Option<String>,
    pub oshash: Option<String>,
}

#[async_trait]
pub trait SceneReader: Send + Sync {
    async fn all_scenes(&self) -> anyhow::Result<Vec<Scene>>;

    async fn find_scene(&self, id: u64) -> anyhow::Result<Option<Scene>> {
        Ok(self
            .all_scenes()
            .await?
            .into_iter()
            .find(|scene| scene.id == id))
    }
}

/// Renames a scene's generated files to the configured hash naming.
#[async_trait]
pub trait HashMigrator: Send + Sync {
    async fn migrate(&self, scene: Scene) -> anyhow::Result<()>;
}

/// Produces generated media: covers, sprites, previews and hashes.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(
        &self,
        ctx: &JobContext,
        input: &GenerateInput,
        progress: &Progress,
    ) -> anyhow::Result<()>;

    /// Regenerate one scene's cover, at `at` seconds or the default offset.
    /// Existing covers are overwritten.
    async fn generate_screenshot(
        &self,
        ctx: &JobContext,
        scene: &Scene,
        at: Option<f64>,
    ) -> anyhow::Result<()>;
}

/// Matches performer, studio or tag names against file paths.
#[async_trait]
pub trait AutoTagger: Send + Sync {
    /// Tag files under `paths` (every file if empty) with the selected
    /// entities of `kind`. Returns the number of files changed.
    async fn auto_tag(
        &self,
        ctx: &JobContext,
        kind: AutoTagKind,
        selector: &AutoTagSelector,
        paths: &[PathBuf],
    ) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Performer,
    Studio,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagKind::Performer => write!(f, "performer"),
            TagKind::Studio => write!(f, "studio"),
        }
    }
}

/// A performer or studio to look up on an external endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTarget {
    /// `None` for an entity that does not exist locally yet.
    pub id: Option<u64>,
    pub name: String,
    /// Endpoints this entity is already linked to.
    pub external_ids: Vec<String>,
}

impl TagTarget {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            external_ids: Vec::new(),
        }
    }

    pub fn is_linked(&self) -> bool {
        !self.external_ids.is_empty()
    }
}

#[async_trait]
pub trait TagTargetReader: Send + Sync {
    async fn find(&self, kind: TagKind, id: u64) -> anyhow::Result<Option<TagTarget>>;

    /// Every entity of `kind` whose link state to `endpoint` equals `linked`.
    async fn find_by_link_status(
        &self,
        kind: TagKind,
        linked: bool,
        endpoint: &str,
    ) -> anyhow::Result<Vec<TagTarget>>;
}

/// One entity to tag against one endpoint.
#[derive(Debug, Clone)]
pub struct TagRequest {
    pub kind: TagKind,
    pub target: TagTarget,
    pub endpoint: StashBoxConfig,
    pub refresh: bool,
    pub create_parent: bool,
    pub exclude_fields: Vec<String>,
}

impl TagRequest {
    pub fn describe(&self) -> String {
        format!("Tagging {} {}", self.kind, self.target.name)
    }
}

#[async_trait]
pub trait ExternalTagger: Send + Sync {
    async fn tag(&self, request: TagRequest) -> anyhow::Result<()>;
}
