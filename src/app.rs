use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::library::{FsScanner, LibraryTasks};
use crate::scheduler::JobManager;
use crate::subscription::Broadcaster;

/// Process wiring: one job manager, the scan broadcaster, the library
/// operations and the optional dashboard.
pub struct App {
    pub config: AppConfig,
    pub manager: JobManager,
    pub scan_events: Broadcaster,
    pub library: LibraryTasks,
}

impl App {
    /// Build every component with a filesystem scanner attached. Must be
    /// called inside a Tokio runtime.
    pub fn new(config: AppConfig) -> Self {
        let manager = JobManager::new(config.manager.clone());
        let scan_events = Broadcaster::new();
        let library = LibraryTasks::new(manager.clone(), scan_events.clone(), config.library.clone())
            .with_scanner(Arc::new(FsScanner::new(&config.library)));

        Self {
            config,
            manager,
            scan_events,
            library,
        }
    }

    /// Replace the library operations, e.g. to attach more collaborators.
    pub fn map_library(mut self, f: impl FnOnce(LibraryTasks) -> LibraryTasks) -> Self {
        self.library = f(self.library);
        self
    }

    /// Run until `shutdown` is cancelled, then stop the job manager with the
    /// configured mode.
    ///
    /// The dashboard, if configured, stops accepting connections as soon as
    /// the token fires. This returns once every job worker has returned.
    pub async fn run(self, shutdown: CancellationToken) {
        let dashboard = self.config.dashboard.map(|dashboard| {
            let state = DashboardState::new(self.library.clone());
            let token = shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(dashboard.listen_addr, state, token).await;
            })
        });

        shutdown.cancelled().await;
        tracing::info!("Shutdown signal received");

        self.manager.shutdown(self.config.manager.shutdown_mode).await;

        if let Some(handle) = dashboard {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dashboard task exited abnormally");
            }
        }
    }
}
