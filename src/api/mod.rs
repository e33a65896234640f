//! HTTP surface of the relay.
//!
//! | Route | Caller |
//! |---|---|
//! | `POST /jobs` | client, blocks until the worker reports or the ceiling passes |
//! | `GET /jobs/next` | worker |
//! | `POST /jobs/result` | worker |
//! | `GET /jobs/:id/status` | client |
//! | `POST /worker/heartbeat` | worker |
//! | `GET /health` | anyone |

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::coordinator::{Coordinator, HealthSnapshot};
use crate::error::{RelayError, Result};
use crate::scheduler::{Job, JobId, JobResult, JobStatus, LoginRequest, ResultReport};

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
}

impl ApiState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub homeworks: Vec<Value>,
}

impl SubmitJobResponse {
    fn completed(result: JobResult) -> Self {
        Self {
            success: result.success,
            message: result.message().to_string(),
            error: result.error,
            homeworks: result.homeworks,
        }
    }

    fn failed(err: &RelayError) -> Self {
        let message = match err {
            RelayError::Validation(_) => "Invalid login request",
            RelayError::WorkerOffline => "Worker is offline",
            RelayError::RendezvousTimeout(_) => "Timed out waiting for worker",
            _ => "Login could not be processed",
        };
        Self {
            success: false,
            message: message.to_string(),
            error: Some(err.to_string()),
            homeworks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextJobResponse {
    pub job: Option<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatusResponse {
    Queued {
        message: String,
    },
    Completed {
        success: bool,
        error: Option<String>,
        homeworks: Vec<Value>,
        #[serde(rename = "completedAt")]
        completed_at: DateTime<Utc>,
    },
    Processing {
        message: String,
    },
}

impl From<JobStatus> for JobStatusResponse {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => JobStatusResponse::Queued {
                message: "Job is waiting to be processed".to_string(),
            },
            JobStatus::Completed(result) => JobStatusResponse::Completed {
                success: result.success,
                error: result.error,
                homeworks: result.homeworks,
                completed_at: result.completed_at,
            },
            JobStatus::Processing => JobStatusResponse::Processing {
                message: "Job is being processed".to_string(),
            },
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", post(submit_job_handler))
        .route("/jobs/next", get(next_job_handler))
        .route("/jobs/result", post(report_result_handler))
        .route("/jobs/:job_id/status", get(job_status_handler))
        .route("/worker/heartbeat", post(heartbeat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Starting relay API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Relay API server stopped");
    Ok(())
}

async fn submit_job_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    // An unreadable body is treated as one with no fields, so it is answered
    // like any other incomplete submission.
    let request = match payload {
        Ok(Json(body)) => LoginRequest::from_json(&body),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable submission body");
            LoginRequest::default()
        }
    };

    match state.coordinator.submit_detached(request).await {
        Ok(result) => (StatusCode::OK, Json(SubmitJobResponse::completed(result))),
        Err(e) => {
            if matches!(e, RelayError::Internal(_)) {
                tracing::error!(error = %e, "Submission failed");
            }
            (e.status_code(), Json(SubmitJobResponse::failed(&e)))
        }
    }
}

async fn next_job_handler(State(state): State<ApiState>) -> Json<NextJobResponse> {
    Json(NextJobResponse {
        job: state.coordinator.next_job().await,
    })
}

async fn report_result_handler(
    State(state): State<ApiState>,
    Json(report): Json<ResultReport>,
) -> Json<AckResponse> {
    state.coordinator.report(report).await;
    Json(AckResponse { success: true })
}

async fn job_status_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Json<JobStatusResponse> {
    let status = state.coordinator.status(&JobId::from(job_id)).await;
    Json(status.into())
}

async fn heartbeat_handler(State(state): State<ApiState>) -> Json<AckResponse> {
    state.coordinator.heartbeat().await;
    Json(AckResponse { success: true })
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.coordinator.health().await)
}
