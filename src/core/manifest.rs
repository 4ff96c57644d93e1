//! Durable, crash-safe per-case log of processing progress.
//!
//! The manifest (`processing_manifest.txt`) is the sole persistent state of
//! record for a case. It is append-only text: every append is a single
//! `write` followed by an `fsync` of one newline-terminated line, so a crash
//! mid-append leaves the file truncated cleanly at the prior newline on next
//! read. Later lines win on conflict; nothing is ever edited in place.
//!
//! Single-writer access to one case's manifest is enforced above this
//! module by the lease table (`core::lease`), not by this module itself.

use crate::core::error::EngineError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "processing_manifest.txt";

/// One parsed manifest line. Unknown status tokens are represented as `None`
/// by the caller (case_model), never coerced to a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    File {
        name: String,
        status: String,
        score: Option<String>,
        duration: Option<String>,
    },
    CaseStatus(String),
    HydratedJson(String),
    Artifact { kind: String, path: String },
    Error { scope: String, message: String },
}

pub struct ManifestStore {
    output_root: PathBuf,
}

impl ManifestStore {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn manifest_path(&self, case_id: &str) -> PathBuf {
        self.output_root.join(case_id).join(MANIFEST_FILE_NAME)
    }

    /// Append one grammar-valid line, fsyncing before returning.
    pub fn append(&self, case_id: &str, line: &ManifestLine) -> Result<(), EngineError> {
        let path = self.manifest_path(case_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        write_line(&mut file, line)
    }

    /// Append a batch of lines through one open file handle, each
    /// individually fsynced, for callers that know several lines will be
    /// written back-to-back (e.g. `FILE|IN_PROGRESS` immediately followed by
    /// `FILE|SUCCESS` is still two independent appends, but opening once
    /// avoids repeated path joins).
    pub fn appender(&self, case_id: &str) -> Result<ManifestAppender, EngineError> {
        let path = self.manifest_path(case_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ManifestAppender { file })
    }

    /// Returns the ordered raw lines, or an empty vec if the manifest is
    /// absent. Malformed lines are dropped by the caller (case_model), not
    /// here — this layer only trims trailing partial lines from a crash.
    pub fn read_raw(&self, case_id: &str) -> Result<Vec<String>, EngineError> {
        let path = self.manifest_path(case_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read(&path)?;
        // `BufRead::lines()` can't distinguish a crash-truncated final line
        // from a complete one, since it yields `Ok(buf)` either way whether
        // or not the buffer ended in `\n`. Trim at the byte level instead:
        // a file not ending in `\n` had its last write interrupted, so drop
        // everything after the final newline before splitting into lines.
        let complete = match raw.iter().rposition(|&b| b == b'\n') {
            Some(pos) => &raw[..=pos],
            None => &raw[..0],
        };
        let text = String::from_utf8_lossy(complete);
        let lines = text
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        Ok(lines)
    }

    /// Parses raw lines into `ManifestLine`s, logging and skipping any line
    /// that doesn't match the grammar: unknown tokens are logged and
    /// treated as if the line did not exist.
    pub fn read(&self, case_id: &str) -> Result<Vec<ManifestLine>, EngineError> {
        let raw = self.read_raw(case_id)?;
        Ok(raw
            .iter()
            .filter_map(|line| match parse_line(line) {
                Ok(parsed) => Some(parsed),
                Err(reason) => {
                    tracing::warn!(case_id, line, reason, "skipping malformed manifest line");
                    None
                }
            })
            .collect())
    }

    /// One-shot migration hook: rewrites the manifest wholesale. Used only
    /// once per case, at startup, if an old format is detected; normal
    /// operation never calls this.
    pub fn rewrite(&self, case_id: &str, lines: &[ManifestLine]) -> Result<(), EngineError> {
        let path = self.manifest_path(case_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path)?;
        for line in lines {
            write_line(&mut tmp, line)?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// A manifest file handle kept open across several appends within one
/// driver job, so the caller pays one `open()` instead of one per line.
pub struct ManifestAppender {
    file: File,
}

impl ManifestAppender {
    pub fn append(&mut self, line: &ManifestLine) -> Result<(), EngineError> {
        write_line(&mut self.file, line)
    }
}

fn write_line(file: &mut File, line: &ManifestLine) -> Result<(), EngineError> {
    let rendered = render_line(line);
    file.write_all(rendered.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(())
}

pub fn render_line(line: &ManifestLine) -> String {
    match line {
        ManifestLine::File {
            name,
            status,
            score,
            duration,
        } => format!(
            "FILE|{name}|{status}|{}|{}",
            score.as_deref().unwrap_or(""),
            duration.as_deref().unwrap_or("")
        ),
        ManifestLine::CaseStatus(status) => format!("CASE_STATUS|{status}"),
        ManifestLine::HydratedJson(path) => format!("HYDRATED_JSON|{path}"),
        ManifestLine::Artifact { kind, path } => format!("ARTIFACT|{kind}|{path}"),
        ManifestLine::Error { scope, message } => format!("ERROR|{scope}|{message}"),
    }
}

fn parse_line(raw: &str) -> Result<ManifestLine, String> {
    let mut parts = raw.splitn(5, '|');
    let tag = parts.next().unwrap_or("");
    match tag {
        "FILE" => {
            let name = parts.next().ok_or("missing file name")?.to_string();
            let status = parts.next().ok_or("missing file status")?.to_string();
            let score = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            let duration = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            Ok(ManifestLine::File {
                name,
                status,
                score,
                duration,
            })
        }
        "CASE_STATUS" => {
            let status = parts.next().ok_or("missing case status")?.to_string();
            Ok(ManifestLine::CaseStatus(status))
        }
        "HYDRATED_JSON" => {
            let path = parts.next().ok_or("missing hydrated path")?.to_string();
            Ok(ManifestLine::HydratedJson(path))
        }
        "ARTIFACT" => {
            let kind = parts.next().ok_or("missing artifact kind")?.to_string();
            let path = parts.next().ok_or("missing artifact path")?.to_string();
            Ok(ManifestLine::Artifact { kind, path })
        }
        "ERROR" => {
            let scope = parts.next().ok_or("missing error scope")?.to_string();
            let message = parts.next().ok_or("missing error message")?.to_string();
            Ok(ManifestLine::Error { scope, message })
        }
        other => Err(format!("unknown manifest tag '{other}'")),
    }
}

/// True if `raw` is absent from disk-level parsing, used by the output dir
/// existence check in case_model (kept here since it's the same path).
pub fn manifest_exists(output_root: &Path, case_id: &str) -> bool {
    ManifestStore::new(output_root)
        .manifest_path(case_id)
        .exists()
}
