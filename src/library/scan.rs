use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::config::{LibraryConfig, LibraryPath};
use crate::error::JobError;
use crate::library::ports::{LibraryScanner, MediaKind, ScannedFile};
use crate::scheduler::Progress;
use crate::subscription::Broadcaster;
use crate::worker::{Cancelled, JobContext, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanInput {
    /// Paths to scan. Empty means every configured library root.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Files modified before this are ignored.
    #[serde(default)]
    pub min_mod_time: Option<DateTime<Utc>>,
}

/// Map requested paths onto configured library roots.
///
/// No paths selects every root. A path keeps the options of the root that
/// contains it; a path outside every root is logged and skipped.
pub fn resolve_scan_paths(config: &LibraryConfig, paths: &[PathBuf]) -> Vec<LibraryPath> {
    if paths.is_empty() {
        return config.library_paths.clone();
    }

    paths
        .iter()
        .filter_map(|path| match config.library_for(path) {
            Some(root) => Some(LibraryPath {
                path: path.clone(),
                ..root.clone()
            }),
            None => {
                tracing::warn!(
                    path = %path.display(),
                    "Path is not in the configured library paths, skipping"
                );
                None
            }
        })
        .collect()
}

pub(crate) struct ScanJob {
    pub(crate) input: ScanInput,
    pub(crate) library: Arc<LibraryConfig>,
    pub(crate) scanner: Arc<dyn LibraryScanner>,
    pub(crate) broadcaster: Broadcaster,
}

impl ScanJob {
    async fn scan_all(&self, ctx: &JobContext, progress: &Progress) -> anyhow::Result<()> {
        let targets = resolve_scan_paths(&self.library, &self.input.paths);
        progress.set_total(targets.len() as u64);

        let mut found = 0usize;
        for target in &targets {
            ctx.check_cancelled()?;

            let label = format!("Scanning {}", target.path.display());
            let scanned = progress
                .execute_subtask_async(
                    label,
                    self.scanner.scan(ctx, target, self.input.min_mod_time),
                )
                .await;
            match scanned {
                Ok(count) => found += count,
                Err(e) if e.downcast_ref::<Cancelled>().is_some() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        job_id = %ctx.job_id(),
                        path = %target.path.display(),
                        error = %format!("{:#}", e),
                        "Scan of library path failed"
                    );
                }
            }
            progress.increment();
        }

        tracing::info!(
            job_id = %ctx.job_id(),
            paths = targets.len(),
            files = found,
            "Scan complete"
        );
        Ok(())
    }
}

#[async_trait]
impl Task for ScanJob {
    async fn execute(&mut self, ctx: JobContext, progress: Progress) -> anyhow::Result<()> {
        let result = self.scan_all(&ctx, &progress).await;
        // Subscribers refresh after every scan, cancelled or not.
        self.broadcaster.publish();
        result
    }
}

/// Scanner that walks library directories on the local filesystem.
///
/// Matching files are reported on the optional sink; the count is returned
/// either way. The walk runs on the blocking pool and checks for
/// cancellation at every entry. Unreadable entries are logged and skipped; a
/// missing root fails the path.
#[derive(Debug, Clone)]
pub struct FsScanner {
    video_extensions: Vec<String>,
    image_extensions: Vec<String>,
    sink: Option<mpsc::UnboundedSender<ScannedFile>>,
}

impl FsScanner {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            video_extensions: lowercase(&config.video_extensions),
            image_extensions: lowercase(&config.image_extensions),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<ScannedFile>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn classify(&self, path: &Path, target: &LibraryPath) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if !target.exclude_video && self.video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else if !target.exclude_image && self.image_extensions.contains(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

fn lowercase(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

impl FsScanner {
    /// Blocking walk of one root. Walk errors are logged and the entry skipped.
    fn walk(
        &self,
        ctx: &JobContext,
        target: &LibraryPath,
        min_mod_time: Option<DateTime<Utc>>,
    ) -> anyhow::Result<usize> {
        let mut count = 0usize;

        for entry in WalkDir::new(&target.path).follow_links(false) {
            ctx.check_cancelled()?;

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        job_id = %ctx.job_id(),
                        path = ?e.path(),
                        error = %e,
                        "Error walking directory, skipping"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(kind) = self.classify(entry.path(), target) else {
                continue;
            };
            let modified = match entry.metadata() {
                Ok(metadata) => metadata.modified().ok().map(DateTime::<Utc>::from),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Cannot stat file");
                    continue;
                }
            };
            if let (Some(min), Some(modified)) = (min_mod_time, modified) {
                if modified < min {
                    continue;
                }
            }

            tracing::debug!(path = %entry.path().display(), kind = ?kind, "Found media file");
            count += 1;
            if let Some(sink) = &self.sink {
                let _ = sink.send(ScannedFile {
                    path: entry.into_path(),
                    kind,
                    modified,
                });
            }
        }

        Ok(count)
    }
}

#[async_trait]
impl LibraryScanner for FsScanner {
    async fn scan(
        &self,
        ctx: &JobContext,
        target: &LibraryPath,
        min_mod_time: Option<DateTime<Utc>>,
    ) -> anyhow::Result<usize> {
        let root = tokio::fs::metadata(&target.path)
            .await
            .map_err(JobError::from)
            .with_context(|| format!("cannot read library path {}", target.path.display()))?;
        if !root.is_dir() {
            anyhow::bail!("library path {} is not a directory", target.path.display());
        }

        let scanner = self.clone();
        let ctx = ctx.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || scanner.walk(&ctx, &target, min_mod_time))
            .await
            .context("directory walk aborted")?
    }
}
