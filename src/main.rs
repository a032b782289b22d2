use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use media_jobs::app::App;
use media_jobs::config::{
    AppConfig, DashboardConfig, LibraryConfig, LibraryPath, ManagerConfig, ShutdownMode,
};
use media_jobs::error::JobError;
use media_jobs::library::{FsScanner, MediaKind, ScanInput, ScannedFile};
use media_jobs::scheduler::JobStatus;
use media_jobs::shutdown::install_shutdown_handler;
use media_jobs::worker::FanOut;

#[derive(Parser, Debug)]
#[command(name = "media-jobs")]
#[command(version)]
#[command(about = "Background job runner for a media library")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the job manager with the status dashboard until SIGINT/SIGTERM
    Serve(ServeArgs),

    /// Scan the library once and print the media files found
    Scan(ScanArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct LibraryArgs {
    /// Library root directory (repeatable)
    #[arg(long = "library", short = 'l')]
    libraries: Vec<PathBuf>,

    /// Directory used for metadata import/export
    #[arg(long)]
    metadata_path: Option<PathBuf>,

    /// Units run at once inside fan-out jobs (1 = serial)
    #[arg(long, default_value = "4")]
    fan_out: usize,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    #[command(flatten)]
    library: LibraryArgs,

    /// Port for the web dashboard
    #[arg(long, default_value = "9999")]
    port: u16,

    /// Disable the web dashboard
    #[arg(long)]
    no_dashboard: bool,

    /// Jobs allowed to run at once
    #[arg(long, default_value = "1")]
    concurrency: usize,

    /// What to do with outstanding jobs on shutdown
    #[arg(long, default_value = "drain")]
    shutdown_mode: ShutdownArg,
}

#[derive(Parser, Debug)]
struct ScanArgs {
    #[command(flatten)]
    library: LibraryArgs,

    /// Paths to scan (default: every library root)
    paths: Vec<PathBuf>,

    /// Ignore files modified before this time (RFC 3339)
    #[arg(long)]
    min_mod_time: Option<DateTime<Utc>>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShutdownArg {
    Drain,
    Cancel,
}

impl From<ShutdownArg> for ShutdownMode {
    fn from(arg: ShutdownArg) -> Self {
        match arg {
            ShutdownArg::Drain => ShutdownMode::Drain,
            ShutdownArg::Cancel => ShutdownMode::Cancel,
        }
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct ScanOutput {
    job_id: u64,
    status: String,
    files: Vec<ScannedFile>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn library_config(args: LibraryArgs) -> LibraryConfig {
    let fan_out = if args.fan_out <= 1 {
        FanOut::Serial
    } else {
        FanOut::Concurrent(args.fan_out)
    };

    let mut config = args
        .libraries
        .into_iter()
        .fold(LibraryConfig::default(), |config, path| {
            config.with_library_path(LibraryPath::new(path))
        })
        .with_fan_out(fan_out);
    if let Some(metadata_path) = args.metadata_path {
        config = config.with_metadata_path(metadata_path);
    }
    config
}

fn kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "video",
        MediaKind::Image => "image",
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let dashboard = if args.no_dashboard {
        None
    } else {
        let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
        Some(DashboardConfig::new(addr))
    };

    let config = AppConfig {
        manager: ManagerConfig::default()
            .with_max_concurrency(args.concurrency)
            .with_shutdown_mode(args.shutdown_mode.into()),
        library: library_config(args.library),
        dashboard,
    };

    let libraries: Vec<String> = config
        .library
        .library_paths
        .iter()
        .map(|l| l.path.display().to_string())
        .collect();
    tracing::info!(
        max_concurrency = config.manager.max_concurrency,
        shutdown_mode = ?config.manager.shutdown_mode,
        libraries = ?libraries,
        dashboard_addr = ?config.dashboard.map(|d| d.listen_addr),
        "Starting media-jobs"
    );

    let shutdown = install_shutdown_handler();
    App::new(config).run(shutdown).await;
    Ok(())
}

async fn run_scan(args: ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = library_config(args.library);
    if library.library_paths.is_empty() {
        return Err(JobError::Config("at least one --library path is required".to_string()).into());
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let scanner = Arc::new(FsScanner::new(&library).with_sink(tx));
    let config = AppConfig {
        library,
        ..AppConfig::default()
    };
    let app = App::new(config).map_library(|tasks| tasks.with_scanner(scanner));

    let job_id = app.library.scan(ScanInput {
        paths: args.paths,
        min_mod_time: args.min_mod_time,
    })?;
    let record = app.manager.wait(job_id).await?;
    app.manager.shutdown(ShutdownMode::Drain).await;

    let mut files = Vec::new();
    while let Ok(file) = rx.try_recv() {
        files.push(file);
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    if record.status == JobStatus::Failed {
        let message = record.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(JobError::TaskFailed(message).into());
    }

    match args.output {
        OutputFormat::Json => {
            let output = ScanOutput {
                job_id: record.id.0,
                status: record.status.to_string(),
                files,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if files.is_empty() {
                println!("No media files found.");
            } else {
                println!("{:<8} PATH", "KIND");
                println!("{}", "-".repeat(78));
                for file in &files {
                    println!("{:<8} {}", kind_label(file.kind), file.path.display());
                }
                println!();
            }
            println!("Job {} {}: {} files", record.id, record.status, files.len());
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await?,
        Commands::Scan(scan_args) => run_scan(scan_args).await?,
    }

    Ok(())
}
