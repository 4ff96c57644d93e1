//! Command-line surface: a small `clap` derive dispatch over this engine's
//! two concerns, running the server and a read-only debugging view over
//! case state.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docket", version, about = "Case orchestration engine for a legal-document processing pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Override INPUT_ROOT.
    #[arg(long, global = true)]
    pub input_root: Option<PathBuf>,

    /// Override OUTPUT_ROOT.
    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    /// Override MAX_WORKERS.
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Override LISTEN_ADDR.
    #[arg(long, global = true)]
    pub listen_addr: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the orchestration engine: HTTP API, file watcher, background
    /// driver. This is the default when no subcommand is given.
    Serve,

    /// Read-only case inspection, for debugging without the HTTP API.
    Cases {
        /// Show one case by id instead of listing all cases.
        case_id: Option<String>,
    },
}
