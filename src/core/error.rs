//! Error types for Docket engine operations.
//!
//! This module defines the canonical error type used throughout the engine.
//! Components return `Result<T, EngineError>`; the HTTP layer maps variants
//! onto response status codes (see `api::dto`).

use std::io;
use thiserror::Error;

/// Canonical error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Case or resource absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal state transition, or a lease is already held for this case.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Hydrated object failed schema/shape validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient disk/filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `serde_json` (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External extractor/renderer/PDF-converter process failed or timed out.
    ///
    /// Carries the scope (`file:<name>`, `render`, `consolidation`) the caller
    /// should attach to the manifest `ERROR|<scope>|<message>` line.
    #[error("worker failed ({scope}): {message}")]
    WorkerFailed { scope: String, message: String },

    /// Configuration invalid at startup. Callers exit the process on this variant.
    #[error("fatal configuration error: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn already_running(case_id: &str) -> Self {
        EngineError::Conflict(format!("case '{case_id}' already has an active job"))
    }

    pub fn not_found(case_id: &str) -> Self {
        EngineError::NotFound(format!("case '{case_id}' not found"))
    }
}
