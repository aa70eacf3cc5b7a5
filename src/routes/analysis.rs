use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::models::analysis::{
    AnalysisMode, AnalysisRequest, FinalResult, StatusResponse, SubmitResponse,
};
use crate::models::job::JobStatus;
use crate::routes::ApiError;
use crate::services::pipeline;

/// POST /v1/skin-analysis — fetch the image, create a job, and schedule the
/// pipeline as a detached background task.
///
/// Input errors (unfetchable URL, undecodable image) are rejected here with
/// 400 before any job record exists.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(body): Json<AnalysisRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mode = AnalysisMode::normalize(body.mode.as_deref());

    let image_bytes = fetch_image(&state.http, &body.image_url).await?;
    image::load_from_memory(&image_bytes)
        .map_err(|_| ApiError::BadRequest("invalid image data".to_string()))?;

    let job = state.jobs.create();
    tracing::info!(job_id = %job.id, %mode, "analysis job scheduled");
    tokio::spawn(pipeline::run(
        state.clone(),
        job.id.clone(),
        image_bytes,
        body.text,
        mode,
    ));

    Ok(Json(SubmitResponse {
        job_id: job.id,
        status: JobStatus::InProgress,
        mode,
    }))
}

async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, ApiError> {
    let fetch_err = |e: reqwest::Error| ApiError::BadRequest(format!("failed to fetch image_url: {e}"));
    let response = http.get(url).send().await.map_err(fetch_err)?;
    let response = response.error_for_status().map_err(fetch_err)?;
    let bytes = response.bytes().await.map_err(fetch_err)?;
    Ok(bytes.to_vec())
}

/// GET /v1/skin-analysis/status/{job_id} — pure read against the job store.
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job = state.jobs.get(&job_id).ok_or(ApiError::JobNotFound)?;
    Ok(Json(StatusResponse {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        error: job.error,
        updated_at: job.updated_at,
        created_at: job.created_at,
    }))
}

/// GET /v1/skin-analysis/result/{job_id} — 202 while running, 500 once
/// failed, 200 with the validated final result once done.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<ResultResponse, ApiError> {
    let job = state.jobs.get(&job_id).ok_or(ApiError::JobNotFound)?;

    match job.status {
        JobStatus::InProgress => Ok(ResultResponse::Pending {
            status: job.status,
            progress: job.progress,
        }),
        JobStatus::Failed => Ok(ResultResponse::Failed {
            status: job.status,
            error: job.error.unwrap_or_default(),
        }),
        JobStatus::Done => {
            let result = job.result.ok_or(ApiError::StoredResultSchema)?;
            // Should be unreachable given the finalizer's fallback contract.
            if let Err(e) = result.validate() {
                tracing::error!(job_id, error = %e, "stored job result schema error");
                return Err(ApiError::StoredResultSchema);
            }
            Ok(ResultResponse::Done(Box::new(result)))
        }
    }
}

/// Outcome of a result poll, mapped onto 202/500/200.
#[derive(Debug)]
pub enum ResultResponse {
    Pending {
        status: JobStatus,
        progress: Map<String, Value>,
    },
    Failed {
        status: JobStatus,
        error: String,
    },
    Done(Box<FinalResult>),
}

impl IntoResponse for ResultResponse {
    fn into_response(self) -> Response {
        match self {
            ResultResponse::Pending { status, progress } => (
                StatusCode::ACCEPTED,
                Json(json!({ "status": status, "progress": progress })),
            )
                .into_response(),
            ResultResponse::Failed { status, error } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": status, "error": error })),
            )
                .into_response(),
            ResultResponse::Done(result) => Json(*result).into_response(),
        }
    }
}
