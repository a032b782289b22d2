use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::worker::FanOut;

/// What happens to outstanding jobs when the manager shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Run every queued and running job to completion.
    #[default]
    Drain,
    /// Cancel queued jobs and ask running ones to stop.
    Cancel,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Jobs allowed to run at once. Scan, generate, import and export all
    /// write the same media tree and store, so the default is one.
    pub max_concurrency: usize,
    pub shutdown_mode: ShutdownMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            shutdown_mode: ShutdownMode::Drain,
        }
    }
}

impl ManagerConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }
}

/// A configured library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryPath {
    pub path: PathBuf,
    #[serde(default)]
    pub exclude_video: bool,
    #[serde(default)]
    pub exclude_image: bool,
}

impl LibraryPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exclude_video: false,
            exclude_image: false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// An external metadata endpoint used for batch tagging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashBoxConfig {
    pub endpoint: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub library_paths: Vec<LibraryPath>,
    /// Directory for import/export. Both are refused while unset.
    pub metadata_path: Option<PathBuf>,
    pub stash_boxes: Vec<StashBoxConfig>,
    pub fan_out: FanOut,
    pub video_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            library_paths: Vec::new(),
            metadata_path: None,
            stash_boxes: Vec::new(),
            fan_out: FanOut::default(),
            video_extensions: ["m4v", "mp4", "mov", "wmv", "avi", "mpg", "mpeg", "mkv", "webm"]
                .map(String::from)
                .to_vec(),
            image_extensions: ["png", "jpg", "jpeg", "gif", "webp"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl LibraryConfig {
    pub fn with_library_path(mut self, path: LibraryPath) -> Self {
        self.library_paths.push(path);
        self
    }

    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    pub fn with_stash_box(mut self, endpoint: impl Into<String>) -> Self {
        self.stash_boxes.push(StashBoxConfig {
            endpoint: endpoint.into(),
            name: String::new(),
        });
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// The configured root containing `path`, if any.
    pub fn library_for(&self, path: &Path) -> Option<&LibraryPath> {
        self.library_paths.iter().find(|lib| lib.contains(path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardConfig {
    pub listen_addr: SocketAddr,
}

impl DashboardConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub manager: ManagerConfig,
    pub library: LibraryConfig,
    /// No dashboard when unset.
    pub dashboard: Option<DashboardConfig>,
}
