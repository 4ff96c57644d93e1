//! Environment-driven configuration.
//!
//! Centralizes the engine's env-var surface (`INPUT_ROOT`, `OUTPUT_ROOT`,
//! `MAX_WORKERS`, `EXTRACTOR_CMD`, `RENDERER_CMD`, `PDF_CMD`, `LISTEN_ADDR`).
//! No other hidden configuration exists; anything the engine needs at
//! runtime is either here or derived from it.

use crate::core::error::EngineError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub max_workers: usize,
    pub extractor_cmd: String,
    pub renderer_cmd: String,
    pub pdf_cmd: String,
    pub listen_addr: String,
    pub extraction_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub debounce_ms: u64,
}

impl EngineConfig {
    /// Build from environment variables, applying CLI overrides where given.
    ///
    /// Returns `EngineError::Fatal` on anything that should map to exit code
    /// 1 (missing roots, unparsable `MAX_WORKERS`); the caller is
    /// responsible for creating `output_root` and treating that failure as
    /// exit code 2.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, EngineError> {
        let input_root = overrides
            .input_root
            .or_else(|| std::env::var("INPUT_ROOT").ok().map(PathBuf::from))
            .ok_or_else(|| EngineError::Fatal("INPUT_ROOT is not set".to_string()))?;

        let output_root = overrides
            .output_root
            .or_else(|| std::env::var("OUTPUT_ROOT").ok().map(PathBuf::from))
            .ok_or_else(|| EngineError::Fatal("OUTPUT_ROOT is not set".to_string()))?;

        let max_workers = match overrides.max_workers {
            Some(n) => n,
            None => match std::env::var("MAX_WORKERS") {
                Ok(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| EngineError::Fatal(format!("MAX_WORKERS is not an integer: {raw}")))?,
                Err(_) => default_worker_count(),
            },
        };
        if max_workers == 0 {
            return Err(EngineError::Fatal(
                "MAX_WORKERS must be at least 1".to_string(),
            ));
        }

        let extractor_cmd = std::env::var("EXTRACTOR_CMD")
            .map_err(|_| EngineError::Fatal("EXTRACTOR_CMD is not set".to_string()))?;
        let renderer_cmd = std::env::var("RENDERER_CMD")
            .map_err(|_| EngineError::Fatal("RENDERER_CMD is not set".to_string()))?;
        let pdf_cmd = std::env::var("PDF_CMD")
            .map_err(|_| EngineError::Fatal("PDF_CMD is not set".to_string()))?;

        let listen_addr = overrides
            .listen_addr
            .or_else(|| std::env::var("LISTEN_ADDR").ok())
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());

        Ok(EngineConfig {
            input_root,
            output_root,
            max_workers,
            extractor_cmd,
            renderer_cmd,
            pdf_cmd,
            listen_addr,
            extraction_timeout_secs: 600,
            render_timeout_secs: 300,
            debounce_ms: 250,
        })
    }

    pub fn case_input_dir(&self, case_id: &str) -> PathBuf {
        self.input_root.join(case_id)
    }

    pub fn case_output_dir(&self, case_id: &str) -> PathBuf {
        self.output_root.join(case_id)
    }

    /// Bounded queue depth past which `process` requests are rejected (503).
    pub fn queue_capacity(&self) -> usize {
        self.max_workers * 4
    }
}

/// CLI-supplied overrides layered on top of the environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub input_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub listen_addr: Option<String>,
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}
