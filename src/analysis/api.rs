use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::job_queue::{JobQueue, SubmitJobRequest};
use super::models::{AnalysisStatus, StatusUpdate, StatusView, map_job_status, millis_to_iso};
use super::store::StatusStore;
use crate::config::{JobParameterSecrets, JobQueueConfig};
use crate::errors::AnalysisError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub job_queue: Arc<dyn JobQueue>,
    pub store: StatusStore,
    pub queue_config: JobQueueConfig,
    pub secrets: JobParameterSecrets,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnalysisRequest {
    pub repository_url: Option<String>,
    pub strategy: Option<String>,
    pub analysis_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusQuery {
    pub job_id: Option<String>,
    pub analysis_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub analysis_id: Option<String>,
}

/// Progress reported by a running analysis job.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPushRequest {
    pub analysis_id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub files_analyzed: Option<i64>,
    pub total_files: Option<i64>,
    pub current_file: Option<String>,
    pub results: Option<Vec<serde_json::Value>>,
    pub errors: Option<Vec<serde_json::Value>>,
}

// ── Response payload types ────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnalysisResponse {
    pub success: bool,
    pub job_id: String,
    pub job_name: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub job_id: String,
    pub analysis_id: String,
    pub batch_status: String,
    pub status: AnalysisStatus,
    pub progress: i64,
    pub status_reason: Option<String>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(msg) => ApiError::BadRequest(msg),
            e if e.is_not_found() => ApiError::NotFound(e.to_string()),
            e => {
                tracing::warn!(error = %e, "analysis request failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/analysis/submit", post(submit_analysis))
        .route("/api/analysis/batch-status", get(batch_status))
        .route("/api/analysis/status", get(get_status).post(push_status))
        .route("/api/analysis/{analysis_id}/status", get(get_status_by_id))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Value of a required field as sent, or `None` when missing or blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Collect every missing required field into one validation error.
fn require<'a, const N: usize>(
    fields: [(&'static str, &'a Option<String>); N],
) -> Result<[&'a str; N], AnalysisError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, v)| present(v).is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::missing_fields(&missing));
    }
    Ok(fields.map(|(_, v)| present(v).unwrap_or_default()))
}

fn read_status(state: &SharedState, analysis_id: &str) -> Result<StatusView, AnalysisError> {
    let record = state
        .store
        .get(analysis_id)?
        .ok_or_else(|| AnalysisError::AnalysisNotFound {
            analysis_id: analysis_id.to_string(),
        })?;
    Ok(record.snapshot(Utc::now()))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn submit_analysis(
    State(state): State<SharedState>,
    payload: Result<Json<SubmitAnalysisRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let [repository_url, strategy, analysis_id] = require([
        ("repositoryUrl", &req.repository_url),
        ("strategy", &req.strategy),
        ("analysisId", &req.analysis_id),
    ])?;

    let request = SubmitJobRequest::build(
        &state.queue_config,
        &state.secrets,
        repository_url,
        strategy,
        analysis_id,
        Utc::now().timestamp_millis(),
    );

    let submitted = state.job_queue.submit(&request).await?;
    tracing::info!(
        analysis_id,
        job_id = %submitted.job_id,
        job_name = %submitted.job_name,
        strategy,
        "analysis job submitted"
    );

    Ok(Json(SubmitAnalysisResponse {
        success: true,
        job_id: submitted.job_id,
        job_name: submitted.job_name,
        message: "Analysis job submitted successfully".to_string(),
    }))
}

async fn batch_status(
    State(state): State<SharedState>,
    query: Result<Query<BatchStatusQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let [job_id, analysis_id] = require([
        ("jobId", &query.job_id),
        ("analysisId", &query.analysis_id),
    ])?;

    let job = state
        .job_queue
        .describe(job_id)
        .await?
        .ok_or_else(|| AnalysisError::JobNotFound {
            job_id: job_id.to_string(),
        })?;

    let (status, progress) = map_job_status(&job.status);
    state.store.record_poll(
        analysis_id,
        status,
        progress,
        format!("Job queue status: {}", job.status),
        Utc::now(),
    )?;
    tracing::debug!(analysis_id, job_id, batch_status = %job.status, %status, progress, "polled job");

    Ok(Json(BatchStatusResponse {
        job_id: job.job_id,
        analysis_id: analysis_id.to_string(),
        batch_status: job.status,
        status,
        progress,
        status_reason: job.status_reason,
        created_at: millis_to_iso(job.created_at),
        started_at: millis_to_iso(job.started_at),
        stopped_at: millis_to_iso(job.stopped_at),
    }))
}

async fn get_status(
    State(state): State<SharedState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let [analysis_id] = require([("analysisId", &query.analysis_id)])?;
    Ok(Json(read_status(&state, analysis_id)?))
}

async fn get_status_by_id(
    State(state): State<SharedState>,
    Path(analysis_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(read_status(&state, &analysis_id)?))
}

async fn push_status(
    State(state): State<SharedState>,
    payload: Result<Json<StatusPushRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let [analysis_id] = require([("analysisId", &req.analysis_id)])?;

    let update = StatusUpdate {
        status: req.status.as_deref().map(AnalysisStatus::parse_lenient),
        progress: req.progress,
        files_analyzed: req.files_analyzed,
        total_files: req.total_files,
        current_file: req.current_file,
        results: req.results,
        errors: req.errors,
    };
    let now = Utc::now();
    let record = state.store.apply(analysis_id, update, now)?;
    tracing::debug!(analysis_id, status = %record.status, progress = record.progress, "status pushed");

    Ok(Json(record.snapshot(now)))
}
