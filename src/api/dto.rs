//! JSON response shapes for the dashboard API.
//!
//! Kept separate from `core::case_model::Case` even though the two are
//! nearly identical: the DTO is the wire contract and is free to diverge
//! (e.g. adding `quality_aggregate`, a `queued` sub-state) without forcing
//! the in-memory model to carry API-only fields.

use crate::core::case_model::Case;
use crate::core::error::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct CasePayload {
    pub id: String,
    pub name: String,
    pub status: String,
    pub last_updated: String,
    pub files: Vec<FilePayload>,
    pub quality_aggregate: Option<f64>,
    pub hydrated_path: Option<String>,
    pub artifacts: Vec<ArtifactPayload>,
    pub error_summary: Vec<ErrorPayload>,
}

#[derive(Debug, Serialize)]
pub struct FilePayload {
    pub file_name: String,
    pub status: String,
    pub quality_score: Option<u8>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactPayload {
    pub kind: String,
    pub relative_path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub scope: String,
    pub message: String,
}

impl From<Case> for CasePayload {
    fn from(case: Case) -> Self {
        let quality_aggregate = case.quality_aggregate();
        CasePayload {
            id: case.case_id,
            name: case.name,
            status: case.status.as_manifest_token().to_string(),
            last_updated: case.last_updated_at,
            files: case
                .files
                .into_iter()
                .map(|f| FilePayload {
                    file_name: f.file_name,
                    status: format!("{:?}", f.status).to_uppercase(),
                    quality_score: f.quality_score,
                    duration_ms: f.duration_ms,
                })
                .collect(),
            quality_aggregate,
            hydrated_path: case.hydrated_path,
            artifacts: case
                .artifacts
                .into_iter()
                .map(|a| ArtifactPayload {
                    kind: a.kind,
                    relative_path: a.relative_path,
                })
                .collect(),
            error_summary: case
                .errors
                .into_iter()
                .map(|e| ErrorPayload {
                    scope: e.scope,
                    message: e.message,
                })
                .collect(),
        }
    }
}

/// `202 Accepted` body for `process`/`render` acceptance.
#[derive(Debug, Serialize)]
pub struct AcceptedPayload {
    pub case_id: String,
    pub status: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            EngineError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io"),
            EngineError::Json(_) => (StatusCode::BAD_REQUEST, "validation"),
            EngineError::WorkerFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "worker_failed"),
            EngineError::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fatal"),
        };
        let body = json!({ "error": code, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
