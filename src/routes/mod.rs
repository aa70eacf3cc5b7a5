pub mod analysis;
pub mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Client-visible API errors with a JSON `detail` body.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("job_id not found")]
    JobNotFound,

    #[error("stored result schema error")]
    StoredResultSchema,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::StoredResultSchema => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}
