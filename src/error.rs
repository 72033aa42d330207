//! Error kinds callers branch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failures of an OCR job. All of them abort the request.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("submission of {filename} rejected: {source}")]
    Submission {
        filename: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("job {job_id} not completed after {attempts} polling attempts")]
    TimedOut { job_id: String, attempts: u32 },
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },
    #[error("polling job {job_id} failed: {source}")]
    Poll {
        job_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("fetching result of job {job_id} failed: {source}")]
    Fetch {
        job_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Request-level errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing files")]
    MissingFiles,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Unknown config: {name}. Available: {available:?}")]
    UnknownConfig { name: String, available: Vec<String> },
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("Failed to process files with OCR: {0}")]
    Ocr(#[from] OcrError),
    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFiles
            | ApiError::EmptyFilename
            | ApiError::UnknownConfig { .. }
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Ocr(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MissingFiles.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::EmptyFilename.status(), StatusCode::BAD_REQUEST);
        let timed_out = ApiError::from(OcrError::TimedOut {
            job_id: "job-1".into(),
            attempts: 8,
        });
        assert_eq!(timed_out.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            timed_out.to_string(),
            "Failed to process files with OCR: job job-1 not completed after 8 polling attempts"
        );
    }

    #[test]
    fn test_messages_match_upload_contract() {
        assert_eq!(ApiError::MissingFiles.to_string(), "Missing files");
        assert_eq!(ApiError::EmptyFilename.to_string(), "No selected file");
    }
}
