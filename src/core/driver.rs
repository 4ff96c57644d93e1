//! Spawns and supervises extraction and render jobs, appending every state
//! transition to the manifest and publishing a push event afterward.
//!
//! Drives a sequence of steps, appending a durable record after each and
//! surfacing a structured result, as a long-running async job the HTTP
//! layer hands off to: the handler validates preconditions, acquires the
//! lease, and hands off to a background task rather than blocking on the
//! full run.

use crate::core::case_model::{CaseStatus, FileKind};
use crate::core::collaborators::{Collaborator, ExtractionOutcome};
use crate::core::engine::Engine;
use crate::core::error::EngineError;
use crate::core::lease::CaseLeaseGuard;
use crate::core::manifest::ManifestLine;
use crate::core::push::PushEvent;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag for one in-flight `process` job, checked
/// between files: an in-flight file is allowed to finish so cancellation
/// never leaves partial outputs on disk.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts processing `case_id`: walks every input file in deterministic
/// order, runs extraction, then consolidation. Returns the final
/// `CaseStatus` the manifest now reflects.
///
/// The caller (the HTTP handler) must acquire `lease` itself, synchronously,
/// before handing the job off to a background task — acquiring it here
/// instead would leave a window between the handler's precondition check and
/// this function actually running where two concurrent requests could both
/// pass the check. Holding `lease` for the duration of this call is what
/// keeps a second `process`/`render` call conflicting for as long as this
/// one is in flight; it releases on drop when this function returns.
pub async fn start_processing(
    engine: Engine,
    case_id: String,
    cancel: CancelFlag,
    lease: CaseLeaseGuard,
) -> Result<CaseStatus, EngineError> {
    let _lease = lease;
    let _permit = engine
        .worker_pool
        .acquire()
        .await
        .map_err(|_| EngineError::Io(std::io::Error::other("worker pool closed")))?;

    let output_dir = engine.config.case_output_dir(&case_id);
    tokio::fs::create_dir_all(&output_dir).await?;

    let mut appender = engine.manifest.appender(&case_id)?;
    appender.append(&ManifestLine::CaseStatus("PROCESSING".to_string()))?;
    engine.push.publish(PushEvent::CaseStatusChanged {
        case_id: case_id.clone(),
        status: "PROCESSING".to_string(),
    });
    tracing::info!(case_id = %case_id, "case entered PROCESSING");

    let input_dir = engine.config.case_input_dir(&case_id);
    let files = ordered_input_files(&input_dir).await?;

    let mut outcomes: Vec<ExtractionOutcome> = Vec::new();
    for file_name in &files {
        if cancel.is_cancelled() {
            break;
        }
        let file_path = input_dir.join(file_name);
        appender.append(&ManifestLine::File {
            name: file_name.clone(),
            status: "IN_PROGRESS".to_string(),
            score: None,
            duration: None,
        })?;
        engine.push.publish(PushEvent::FileStatusChanged {
            case_id: case_id.clone(),
            file_name: file_name.clone(),
            status: "IN_PROGRESS".to_string(),
        });

        let started = Instant::now();
        let result = engine
            .collaborator
            .extract(&file_path, &case_id, std::time::Duration::from_secs(engine.config.extraction_timeout_secs))
            .await;
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(outcome) => {
                appender.append(&ManifestLine::File {
                    name: file_name.clone(),
                    status: "SUCCESS".to_string(),
                    score: Some(outcome.quality_score.to_string()),
                    duration: Some(duration_ms.to_string()),
                })?;
                engine.push.publish(PushEvent::FileStatusChanged {
                    case_id: case_id.clone(),
                    file_name: file_name.clone(),
                    status: "SUCCESS".to_string(),
                });
                outcomes.push(outcome);
            }
            Err(err) => {
                appender.append(&ManifestLine::File {
                    name: file_name.clone(),
                    status: "FAILED".to_string(),
                    score: None,
                    duration: Some(duration_ms.to_string()),
                })?;
                appender.append(&ManifestLine::Error {
                    scope: format!("file:{file_name}"),
                    message: err.to_string(),
                })?;
                engine.push.publish(PushEvent::FileStatusChanged {
                    case_id: case_id.clone(),
                    file_name: file_name.clone(),
                    status: "FAILED".to_string(),
                });
                tracing::debug!(case_id = %case_id, file = %file_name, error = %err, "file extraction failed");
                // Partial success is allowed: continue with remaining files.
            }
        }
    }

    if cancel.is_cancelled() {
        appender.append(&ManifestLine::Error {
            scope: "cancelled".to_string(),
            message: "processing cancelled by operator".to_string(),
        })?;
        appender.append(&ManifestLine::CaseStatus("ERROR".to_string()))?;
        engine.push.publish(PushEvent::CaseStatusChanged {
            case_id: case_id.clone(),
            status: "ERROR".to_string(),
        });
        return Ok(CaseStatus::Error);
    }

    match engine.collaborator.consolidate(&case_id, &outcomes).await {
        Ok(hydrated) => {
            write_hydrated_atomically(&output_dir, &hydrated).await?;
            appender.append(&ManifestLine::HydratedJson("hydrated.json".to_string()))?;
            appender.append(&ManifestLine::CaseStatus("PENDING_REVIEW".to_string()))?;
            engine.push.publish(PushEvent::CaseStatusChanged {
                case_id: case_id.clone(),
                status: "PENDING_REVIEW".to_string(),
            });
            tracing::info!(case_id = %case_id, "case entered PENDING_REVIEW");
            Ok(CaseStatus::PendingReview)
        }
        Err(err) => {
            appender.append(&ManifestLine::Error {
                scope: "consolidation".to_string(),
                message: err.to_string(),
            })?;
            appender.append(&ManifestLine::CaseStatus("ERROR".to_string()))?;
            engine.push.publish(PushEvent::CaseStatusChanged {
                case_id: case_id.clone(),
                status: "ERROR".to_string(),
            });
            Ok(CaseStatus::Error)
        }
    }
}

/// Starts rendering `case_id`: invokes the renderer and PDF converter, and
/// records every produced artifact.
///
/// As with `start_processing`, `lease` must already be held by the caller
/// before this is invoked — see that function's doc comment for why.
pub async fn start_render(
    engine: Engine,
    case_id: String,
    lease: CaseLeaseGuard,
) -> Result<CaseStatus, EngineError> {
    let _lease = lease;
    let _permit = engine
        .worker_pool
        .acquire()
        .await
        .map_err(|_| EngineError::Io(std::io::Error::other("worker pool closed")))?;

    let output_dir = engine.config.case_output_dir(&case_id);
    let hydrated_path = output_dir.join("hydrated.json");
    if !hydrated_path.exists() {
        return Err(EngineError::Conflict(format!(
            "case '{case_id}' has no hydrated.json to render"
        )));
    }

    let mut appender = engine.manifest.appender(&case_id)?;
    appender.append(&ManifestLine::CaseStatus("RENDERING".to_string()))?;
    engine.push.publish(PushEvent::CaseStatusChanged {
        case_id: case_id.clone(),
        status: "RENDERING".to_string(),
    });
    tracing::info!(case_id = %case_id, "case entered RENDERING");

    let render_result = engine
        .collaborator
        .render(
            &hydrated_path,
            &output_dir,
            std::time::Duration::from_secs(engine.config.render_timeout_secs),
        )
        .await;

    let artifacts = match render_result {
        Ok(artifacts) => artifacts,
        Err(err) => {
            appender.append(&ManifestLine::Error {
                scope: "render".to_string(),
                message: err.to_string(),
            })?;
            appender.append(&ManifestLine::CaseStatus("ERROR".to_string()))?;
            engine.push.publish(PushEvent::CaseStatusChanged {
                case_id: case_id.clone(),
                status: "ERROR".to_string(),
            });
            return Ok(CaseStatus::Error);
        }
    };

    for artifact in &artifacts {
        appender.append(&ManifestLine::Artifact {
            kind: artifact.kind.clone(),
            path: artifact.relative_path.clone(),
        })?;
        if artifact.relative_path.ends_with(".html") {
            let html_path = output_dir.join(&artifact.relative_path);
            let pdf_path = html_path.with_extension("pdf");
            if let Err(err) = engine.collaborator.convert_to_pdf(&html_path, &pdf_path).await {
                appender.append(&ManifestLine::Error {
                    scope: "render".to_string(),
                    message: err.to_string(),
                })?;
                appender.append(&ManifestLine::CaseStatus("ERROR".to_string()))?;
                engine.push.publish(PushEvent::CaseStatusChanged {
                    case_id: case_id.clone(),
                    status: "ERROR".to_string(),
                });
                return Ok(CaseStatus::Error);
            }
            let pdf_kind = format!("{}_pdf", artifact.kind);
            let pdf_relative = artifact.relative_path.replace(".html", ".pdf");
            appender.append(&ManifestLine::Artifact {
                kind: pdf_kind,
                path: pdf_relative,
            })?;
        }
    }

    appender.append(&ManifestLine::CaseStatus("COMPLETE".to_string()))?;
    engine.push.publish(PushEvent::CaseStatusChanged {
        case_id: case_id.clone(),
        status: "COMPLETE".to_string(),
    });
    tracing::info!(case_id = %case_id, "case entered COMPLETE");
    Ok(CaseStatus::Complete)
}

/// Writes the hydrated object to `hydrated.json.tmp` then renames over
/// `hydrated.json`, so readers only ever observe a fully-formed prior or new
/// version.
async fn write_hydrated_atomically(
    output_dir: &Path,
    value: &serde_json::Value,
) -> Result<(), EngineError> {
    let tmp_path = output_dir.join("hydrated.json.tmp");
    let final_path = output_dir.join("hydrated.json");
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(())
}

/// Lexicographic by filename, then by size as a tiebreak. Files are
/// enumerated once at the start of the job — a file dropped in mid-run is
/// not picked up until the next `process` invocation.
async fn ordered_input_files(input_dir: &Path) -> Result<Vec<String>, EngineError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(input_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        if !crate::core::case_model::is_recognized_extension(&ext) {
            continue;
        }
        let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
        entries.push((name, size));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    Ok(entries.into_iter().map(|(name, _)| name).collect())
}

/// Startup reconciliation: a case whose last-known status is a transient
/// one (`PROCESSING`/`RENDERING`) but which has no live lease —
/// true of every case immediately after a restart, since leases are
/// in-memory only — had its job die with the previous process. Appending
/// `CASE_STATUS|ERROR|stale_job` before serving the first request lets the
/// client observe `ERROR` and retry, rather than a hung transient state.
pub async fn reconcile_stale_jobs(engine: &Engine) -> Result<Vec<String>, EngineError> {
    let model = engine.case_model();
    let mut reconciled = Vec::new();
    for case in model.list()? {
        let is_transient = matches!(case.status, CaseStatus::Processing | CaseStatus::Rendering);
        if is_transient && !engine.leases.is_held(&case.case_id) {
            let mut appender = engine.manifest.appender(&case.case_id)?;
            appender.append(&ManifestLine::Error {
                scope: "stale_job".to_string(),
                message: "no active lease on startup; prior job did not complete".to_string(),
            })?;
            appender.append(&ManifestLine::CaseStatus("ERROR".to_string()))?;
            engine.push.publish(PushEvent::CaseStatusChanged {
                case_id: case.case_id.clone(),
                status: "ERROR".to_string(),
            });
            tracing::warn!(case_id = %case.case_id, "reconciled stale transient status on startup");
            reconciled.push(case.case_id);
        }
    }
    Ok(reconciled)
}

/// Refines a `.pdf` file's classification from `TextPdf` to
/// `ScannedImagePdf` once the extractor reports which it was; exposed for
/// callers (e.g. a future richer Case Model) that want to persist the
/// refined kind. Not currently written back to the manifest — the grammar
/// has no slot for file kind, only status/score/duration — so this is
/// informational, derived fresh each time from the collaborator's report
/// rather than persisted.
pub fn refine_file_kind(kind: FileKind, outcome: &ExtractionOutcome) -> FileKind {
    if outcome.scanned_image {
        kind.mark_scanned_image()
    } else {
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::FakeCollaborator;
    use crate::core::config::{ConfigOverrides, EngineConfig};
    use tempfile::tempdir;

    fn make_engine(root: &Path, collaborator: FakeCollaborator) -> Engine {
        unsafe {
            std::env::set_var("EXTRACTOR_CMD", "true");
            std::env::set_var("RENDERER_CMD", "true");
            std::env::set_var("PDF_CMD", "true");
        }
        let config = EngineConfig::from_env(ConfigOverrides {
            input_root: Some(root.join("in")),
            output_root: Some(root.join("out")),
            max_workers: Some(2),
            listen_addr: None,
        })
        .unwrap();
        Engine::new(config, Arc::new(collaborator))
    }

    #[tokio::test]
    async fn happy_path_reaches_pending_review() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::write(root.path().join("in/alpha/complaint.pdf"), b"x").unwrap();
        std::fs::write(root.path().join("in/alpha/notes.docx"), b"y").unwrap();

        let engine = make_engine(root.path(), FakeCollaborator::default());
        let lease = engine.leases.acquire("alpha").unwrap();
        let status = start_processing(engine.clone(), "alpha".to_string(), CancelFlag::new(), lease)
            .await
            .unwrap();
        assert_eq!(status, CaseStatus::PendingReview);

        let case = engine.case_model().get("alpha").unwrap();
        assert_eq!(case.status, CaseStatus::PendingReview);
        assert!(case.files.iter().all(|f| f.status == crate::core::case_model::FileStatus::Success));
        assert!(root.path().join("out/alpha/hydrated.json").exists());
    }

    #[tokio::test]
    async fn partial_failure_still_reaches_pending_review_if_consolidation_succeeds() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::write(root.path().join("in/alpha/complaint.pdf"), b"x").unwrap();
        std::fs::write(root.path().join("in/alpha/notes.docx"), b"y").unwrap();

        let collaborator = FakeCollaborator {
            fail_files: vec!["notes.docx".to_string()],
            ..Default::default()
        };
        let engine = make_engine(root.path(), collaborator);
        let lease = engine.leases.acquire("alpha").unwrap();
        let status = start_processing(engine.clone(), "alpha".to_string(), CancelFlag::new(), lease)
            .await
            .unwrap();
        assert_eq!(status, CaseStatus::PendingReview);

        let case = engine.case_model().get("alpha").unwrap();
        let notes = case.files.iter().find(|f| f.file_name == "notes.docx").unwrap();
        assert_eq!(notes.status, crate::core::case_model::FileStatus::Failed);
        assert_eq!(case.errors.len(), 1);
        assert_eq!(case.errors[0].scope, "file:notes.docx");
    }

    #[tokio::test]
    async fn consolidation_failure_marks_case_error() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::write(root.path().join("in/alpha/complaint.pdf"), b"x").unwrap();

        let collaborator = FakeCollaborator {
            fail_consolidation: true,
            ..Default::default()
        };
        let engine = make_engine(root.path(), collaborator);
        let lease = engine.leases.acquire("alpha").unwrap();
        let status = start_processing(engine.clone(), "alpha".to_string(), CancelFlag::new(), lease)
            .await
            .unwrap();
        assert_eq!(status, CaseStatus::Error);
    }

    #[tokio::test]
    async fn render_requires_hydrated_json() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::create_dir_all(root.path().join("out/alpha")).unwrap();

        let engine = make_engine(root.path(), FakeCollaborator::default());
        let lease = engine.leases.acquire("alpha").unwrap();
        let err = start_render(engine, "alpha".to_string(), lease).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn render_produces_artifacts_and_completes() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::create_dir_all(root.path().join("out/alpha")).unwrap();
        std::fs::write(root.path().join("out/alpha/hydrated.json"), "{}").unwrap();

        let engine = make_engine(root.path(), FakeCollaborator::default());
        let lease = engine.leases.acquire("alpha").unwrap();
        let status = start_render(engine.clone(), "alpha".to_string(), lease).await.unwrap();
        assert_eq!(status, CaseStatus::Complete);

        let case = engine.case_model().get("alpha").unwrap();
        assert_eq!(case.status, CaseStatus::Complete);
        assert!(case.artifacts.iter().any(|a| a.kind == "complaint"));
        assert!(case.artifacts.iter().any(|a| a.kind == "complaint_pdf"));
    }

    #[tokio::test]
    async fn stale_processing_status_is_reconciled_to_error_on_startup() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::create_dir_all(root.path().join("out/alpha")).unwrap();

        let engine = make_engine(root.path(), FakeCollaborator::default());
        engine
            .manifest
            .append("alpha", &ManifestLine::CaseStatus("PROCESSING".to_string()))
            .unwrap();

        // No lease is held (simulating a restart after a crash).
        let reconciled = reconcile_stale_jobs(&engine).await.unwrap();
        assert_eq!(reconciled, vec!["alpha".to_string()]);

        let case = engine.case_model().get("alpha").unwrap();
        assert_eq!(case.status, CaseStatus::Error);
        assert_eq!(case.errors.last().unwrap().scope, "stale_job");
    }

    #[tokio::test]
    async fn live_lease_is_not_reconciled() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in/alpha")).unwrap();
        std::fs::create_dir_all(root.path().join("out/alpha")).unwrap();

        let engine = make_engine(root.path(), FakeCollaborator::default());
        engine
            .manifest
            .append("alpha", &ManifestLine::CaseStatus("PROCESSING".to_string()))
            .unwrap();
        let _guard = engine.leases.acquire("alpha").unwrap();

        let reconciled = reconcile_stale_jobs(&engine).await.unwrap();
        assert!(reconciled.is_empty());
    }
}
