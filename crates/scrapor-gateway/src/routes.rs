use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scrapor_core::{Job, JobStatus, ScraporError, Strategy};
use scrapor_workflow::{ExecutionMode, PlanOptions, WorkflowPlan};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Largest page size `GET /jobs` will serve.
const MAX_PAGE_SIZE: usize = 100;

/// Whether the caller waits for the terminal job or polls later.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    /// Return `202` with the pending job and run it in the background.
    #[default]
    Background,
    /// Run synchronously and return the terminal job.
    Foreground,
}

/// Which scheduling mode the job's workflow uses.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionChoice {
    /// One step at a time, declared order.
    #[default]
    Sequential,
    /// Independent steps fan out, bounded by the configured maximum.
    Parallel,
}

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Target URL or query string.
    pub target: String,
    /// Pipeline strategy name (kebab-case).
    pub strategy: String,
    /// Per-job workflow knobs.
    #[serde(default)]
    pub options: PlanOptions,
    /// Foreground or background submission.
    #[serde(default)]
    pub mode: SubmitMode,
    /// Sequential or parallel step scheduling.
    #[serde(default)]
    pub execution: ExecutionChoice,
}

/// Body of the `202` background-submission response.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    /// The new job's id.
    pub job_id: Uuid,
    /// Always `pending` at acceptance time.
    pub status: JobStatus,
}

/// Pagination parameters for the job listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Number of jobs to skip.
    #[serde(default)]
    pub skip: usize,
    /// Page size, clamped to [`MAX_PAGE_SIZE`].
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// JSON error body plus status code.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl From<ScraporError> for ApiError {
    fn from(err: ScraporError) -> Self {
        match &err {
            ScraporError::Job(msg) if msg.contains("not found") => {
                ApiError(StatusCode::NOT_FOUND, msg.clone())
            }
            ScraporError::Gateway(msg) => ApiError(StatusCode::BAD_REQUEST, msg.clone()),
            other => {
                error!(error = %other, "Request failed");
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

/// `POST /jobs` — validate, persist, and run (or spawn) a job.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Response, ApiError> {
    // Rejected at the boundary: no job is ever created for bad input.
    if req.target.trim().is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "target must not be empty".to_string(),
        ));
    }
    let strategy: Strategy = req.strategy.parse()?;

    let plan = WorkflowPlan::for_strategy(strategy, &req.options);
    let mode = match req.execution {
        ExecutionChoice::Sequential => ExecutionMode::Sequential,
        ExecutionChoice::Parallel => ExecutionMode::Parallel {
            max_fanout: state.max_fanout,
        },
    };

    let job = state.manager.submit(req.target.as_str(), strategy).await?;
    info!(job_id = %job.id, strategy = %strategy, mode = ?req.mode, "Job accepted");

    match req.mode {
        SubmitMode::Foreground => {
            let done = state.manager.run(job.id, &plan, mode).await?;
            Ok(Json(done).into_response())
        }
        SubmitMode::Background => {
            let manager = Arc::clone(&state.manager);
            let job_id = job.id;
            tokio::spawn(async move {
                if let Err(e) = manager.run(job_id, &plan, mode).await {
                    error!(job_id = %job_id, error = %e, "Background job run failed");
                }
            });
            let accepted = JobAccepted {
                job_id: job.id,
                status: job.status,
            };
            Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
        }
    }
}

/// `GET /jobs/{id}` — the stored job, verbatim.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.manager.status(id).await?))
}

/// `GET /jobs?skip&limit` — most-recent-first page.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.min(MAX_PAGE_SIZE);
    let (jobs, total) = state.manager.list(params.skip, limit).await?;
    Ok(Json(serde_json::json!({"jobs": jobs, "total": total})))
}

/// `POST /jobs/{id}/cancel` — cooperative cancellation.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.manager.cancel(id).await?))
}

/// `GET /health` — aggregate plus per-agent records.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let records = state.health.check_all().await;
    let overall = scrapor_client::HealthAggregator::overall(&records);

    let dependencies: serde_json::Map<String, serde_json::Value> = records
        .values()
        .map(|r| (r.agent.to_string(), serde_json::json!(r.reachable)))
        .collect();

    Json(serde_json::json!({
        "status": overall,
        "service": "scrapor-gateway",
        "dependencies": dependencies,
        "agents": records.values().collect::<Vec<_>>(),
    }))
}
