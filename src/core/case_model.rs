//! Read-only snapshot of every case's status, built from the input
//! directory, the output directory, and the manifest.
//!
//! `Case::from_parts` is a pure function over already-read filesystem facts
//! (directory listing, manifest lines, output-dir/hydrated-json existence) —
//! no I/O happens inside the fold itself, so the construction algorithm is
//! unit-testable without a filesystem.

use crate::core::manifest::{ManifestLine, ManifestStore};
use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    New,
    Processing,
    PendingReview,
    Rendering,
    Complete,
    Error,
}

impl CaseStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "NEW" => Some(CaseStatus::New),
            "PROCESSING" => Some(CaseStatus::Processing),
            "PENDING_REVIEW" => Some(CaseStatus::PendingReview),
            "RENDERING" => Some(CaseStatus::Rendering),
            "COMPLETE" => Some(CaseStatus::Complete),
            "ERROR" => Some(CaseStatus::Error),
            _ => None,
        }
    }

    pub fn as_manifest_token(&self) -> &'static str {
        match self {
            CaseStatus::New => "NEW",
            CaseStatus::Processing => "PROCESSING",
            CaseStatus::PendingReview => "PENDING_REVIEW",
            CaseStatus::Rendering => "RENDERING",
            CaseStatus::Complete => "COMPLETE",
            CaseStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Missing,
}

impl FileStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(FileStatus::Pending),
            "IN_PROGRESS" => Some(FileStatus::InProgress),
            "SUCCESS" => Some(FileStatus::Success),
            "FAILED" => Some(FileStatus::Failed),
            "MISSING" => Some(FileStatus::Missing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    ScannedImagePdf,
    TextPdf,
    WordProcessor,
    PlainText,
    Other,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            // Extension alone cannot distinguish scanned-image from
            // text-layer PDFs; the extractor collaborator makes that call
            // per-file. The engine classifies every `.pdf` as `TextPdf`
            // until the extraction result says otherwise.
            "pdf" => FileKind::TextPdf,
            "docx" | "doc" | "rtf" => FileKind::WordProcessor,
            "txt" => FileKind::PlainText,
            _ => FileKind::Other,
        }
    }

    pub fn mark_scanned_image(self) -> Self {
        match self {
            FileKind::TextPdf => FileKind::ScannedImagePdf,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub file_name: String,
    pub kind: FileKind,
    pub status: FileStatus,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub duration_ms: Option<u64>,
    pub quality_score: Option<u8>,
    pub error_message: Option<String>,
}

impl FileProcessingResult {
    fn pending(file_name: String, kind: FileKind) -> Self {
        Self {
            file_name,
            kind,
            status: FileStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            quality_score: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub scope: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    pub name: String,
    pub created_at: String,
    pub last_updated_at: String,
    pub status: CaseStatus,
    pub files: Vec<FileProcessingResult>,
    pub hydrated_path: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub errors: Vec<ErrorSummary>,
}

impl Case {
    /// Average quality score across files that succeeded, or `None` if none
    /// have. Matches the API's "overall quality aggregate" field.
    pub fn quality_aggregate(&self) -> Option<f64> {
        let scores: Vec<u8> = self
            .files
            .iter()
            .filter_map(|f| f.quality_score)
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
    }
}

pub struct CaseModel {
    input_root: PathBuf,
    output_root: PathBuf,
    manifest: ManifestStore,
}

impl CaseModel {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        let output_root = output_root.into();
        Self {
            input_root: input_root.into(),
            manifest: ManifestStore::new(&output_root),
            output_root,
        }
    }

    /// Scans the input root one level deep; builds a `Case` for each
    /// subdirectory.
    pub fn list(&self) -> Result<Vec<Case>, EngineError> {
        let mut cases = Vec::new();
        if !self.input_root.exists() {
            return Ok(cases);
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.input_root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            let case_id = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            cases.push(self.get(&case_id)?);
        }
        Ok(cases)
    }

    pub fn get(&self, case_id: &str) -> Result<Case, EngineError> {
        let input_dir = self.input_root.join(case_id);
        if !input_dir.exists() {
            return Err(EngineError::not_found(case_id));
        }

        let mut files: Vec<(String, FileProcessingResult)> = Vec::new();
        let mut entries: Vec<std::fs::DirEntry> = std::fs::read_dir(&input_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in &entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let ext = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            if !is_recognized_extension(&ext) {
                tracing::warn!(case_id, file = %name, "ignoring file with unrecognized extension");
                continue;
            }
            files.push((
                name.clone(),
                FileProcessingResult::pending(name, FileKind::from_extension(&ext)),
            ));
        }

        let output_dir = self.output_root.join(case_id);
        let created_at = crate::core::time::now_iso();
        if !output_dir.exists() {
            return Ok(Case {
                case_id: case_id.to_string(),
                name: case_id.to_string(),
                created_at: created_at.clone(),
                last_updated_at: created_at,
                status: CaseStatus::New,
                files: files.into_iter().map(|(_, f)| f).collect(),
                hydrated_path: None,
                artifacts: Vec::new(),
                errors: Vec::new(),
            });
        }

        let lines = self.manifest.read(case_id)?;
        let hydrated_on_disk = output_dir.join("hydrated.json").exists();
        Ok(self.fold(case_id, files, lines, hydrated_on_disk))
    }

    /// Pure fold over manifest lines onto the file list seeded from disk.
    /// No I/O: `files` and `lines` are already-read facts, `hydrated_on_disk`
    /// is a pre-computed existence check. Kept as an inherent method (rather
    /// than a free function) so it stays next to the struct it serves, but
    /// it touches no engine state beyond its arguments.
    fn fold(
        &self,
        case_id: &str,
        seed_files: Vec<(String, FileProcessingResult)>,
        lines: Vec<ManifestLine>,
        hydrated_on_disk: bool,
    ) -> Case {
        let mut by_name: HashMap<String, FileProcessingResult> = seed_files.into_iter().collect();
        let mut seen_order: Vec<String> = by_name.keys().cloned().collect();
        seen_order.sort();

        let mut status: Option<CaseStatus> = None;
        let mut hydrated_path: Option<String> = None;
        let mut artifacts = Vec::new();
        let mut errors = Vec::new();
        let mut case_status_seen = false;

        for line in &lines {
            match line {
                ManifestLine::File {
                    name,
                    status: raw_status,
                    score,
                    duration,
                } => {
                    let Some(parsed_status) = FileStatus::parse(raw_status) else {
                        tracing::warn!(case_id, name, raw_status, "unknown file status token");
                        continue;
                    };
                    if !seen_order.contains(name) {
                        seen_order.push(name.clone());
                    }
                    let entry = by_name.entry(name.clone()).or_insert_with(|| {
                        let ext = Path::new(name)
                            .extension()
                            .map(|e| e.to_string_lossy().to_string())
                            .unwrap_or_default();
                        FileProcessingResult::pending(
                            name.clone(),
                            FileKind::from_extension(&ext),
                        )
                    });
                    entry.status = parsed_status;
                    entry.quality_score = score.as_ref().and_then(|s| s.parse::<u8>().ok());
                    entry.duration_ms = duration.as_ref().and_then(|s| s.parse::<u64>().ok());
                }
                ManifestLine::CaseStatus(raw) => {
                    case_status_seen = true;
                    if let Some(parsed) = CaseStatus::parse(raw) {
                        status = Some(parsed);
                    } else {
                        tracing::warn!(case_id, raw, "unknown CASE_STATUS token, ignoring");
                    }
                }
                ManifestLine::HydratedJson(path) => hydrated_path = Some(path.clone()),
                ManifestLine::Artifact { kind, path } => artifacts.push(Artifact {
                    kind: kind.clone(),
                    relative_path: path.clone(),
                }),
                ManifestLine::Error { scope, message } => errors.push(ErrorSummary {
                    scope: scope.clone(),
                    message: message.clone(),
                }),
            }
        }

        // Files that exist in the manifest's history but not on the current
        // disk listing are retained (history) and marked MISSING. This
        // overrides whatever status was last recorded, including terminal
        // ones: MISSING describes the file's presence on disk right now, not
        // the outcome of its last processing attempt.
        for name in &seen_order {
            if let Some(result) = by_name.get_mut(name) {
                if !input_file_still_present(&self.input_root, case_id, name) {
                    result.status = FileStatus::Missing;
                }
            }
        }

        let status = match status {
            Some(s) => s,
            None if hydrated_path.is_some() || hydrated_on_disk => {
                // No CASE_STATUS lines but hydrated.json exists: either a
                // legacy manifest (treat all files SUCCESS) or a fresh
                // manifest mid-consolidation.
                if !case_status_seen {
                    for result in by_name.values_mut() {
                        result.status = FileStatus::Success;
                    }
                }
                CaseStatus::PendingReview
            }
            None => CaseStatus::New,
        };

        let mut files: Vec<FileProcessingResult> = seen_order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let now = crate::core::time::now_iso();
        Case {
            case_id: case_id.to_string(),
            name: case_id.to_string(),
            created_at: now.clone(),
            last_updated_at: now,
            status,
            files,
            hydrated_path,
            artifacts,
            errors,
        }
    }
}

fn input_file_still_present(input_root: &Path, case_id: &str, file_name: &str) -> bool {
    input_root.join(case_id).join(file_name).is_file()
}

pub fn is_recognized_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "pdf" | "docx" | "doc" | "txt" | "rtf"
    )
}
