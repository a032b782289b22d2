use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::JobError;
use crate::library::{LibraryTasks, ScanInput};
use crate::scheduler::{JobId, JobManager, JobRecord};

#[derive(Clone)]
pub struct DashboardState {
    pub manager: JobManager,
    pub library: LibraryTasks,
    /// Parent of every event-stream subscription. Cancelling it ends the
    /// open streams so graceful shutdown is not held up by them.
    pub shutdown: CancellationToken,
}

impl DashboardState {
    pub fn new(library: LibraryTasks) -> Self {
        Self {
            manager: library.manager().clone(),
            library,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Errors surfaced by the dashboard handlers.
#[derive(Debug)]
enum ApiError {
    Job(JobError),
    BadRequest(String),
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        ApiError::Job(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Job(JobError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Job(JobError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Job(e) => {
                tracing::error!(error = %e, "Dashboard request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let error = match self {
            ApiError::Job(e) => e.to_string(),
            ApiError::BadRequest(message) => message,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs/{id}", get(job_status_handler))
        .route("/api/jobs/{id}/cancel", post(cancel_job_handler))
        .route("/api/scan", post(submit_scan_handler))
        .route("/api/scan/events", get(scan_events_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the dashboard until `shutdown` is cancelled. Open event streams
/// are closed by the same token.
pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state.with_shutdown(shutdown.clone()));

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
    tracing::info!("Dashboard server stopped");
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> Json<Vec<JobRecord>> {
    Json(state.manager.list())
}

async fn job_status_handler(
    State(state): State<DashboardState>,
    Path(id): Path<u64>,
) -> Result<Json<JobRecord>, ApiError> {
    Ok(Json(state.manager.get(JobId(id))?))
}

async fn cancel_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<u64>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.manager.cancel(JobId(id))?;
    Ok(Json(CancelResponse { cancelled }))
}

/// Body is optional; an empty body scans every library path.
async fn submit_scan_handler(
    State(state): State<DashboardState>,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        ScanInput::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid scan input: {}", e)))?
    };
    let job_id = state.library.scan(input)?;
    Ok(Json(SubmitResponse { job_id }))
}

async fn scan_events_handler(
    State(state): State<DashboardState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let token = state.shutdown.child_token();
    let rx = state.library.subscribe_scan(token.clone());
    // Dropped with the response stream when the client goes away.
    let guard = token.drop_guard();

    let stream = ReceiverStream::new(rx).map(move |_| {
        let _ = &guard;
        Ok(Event::default().event("scan-complete").data("true"))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
