//! Binary entrypoint: parses the CLI, loads configuration, and either runs
//! the server (`serve`, the default) or a read-only case inspection command.
//!
//! Exit codes: `0` clean shutdown, `1` configuration error (missing/invalid
//! env vars), `2` failure to create `OUTPUT_ROOT`.

use clap::Parser;
use docket::cli::{Cli, Command};
use docket::core::collaborators::ProcessCollaborator;
use docket::core::config::{ConfigOverrides, EngineConfig};
use docket::core::driver;
use docket::core::engine::Engine;
use docket::core::watcher;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        input_root: cli.input_root.clone(),
        output_root: cli.output_root.clone(),
        max_workers: cli.max_workers,
        listen_addr: cli.listen_addr.clone(),
    };

    let config = match EngineConfig::from_env(overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("docket: {err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = std::fs::create_dir_all(&config.output_root) {
        eprintln!(
            "docket: could not create output root {}: {err}",
            config.output_root.display()
        );
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("docket: failed to start async runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(serve(config)),
        Command::Cases { case_id } => runtime.block_on(show_cases(config, case_id)),
    }
}

async fn serve(config: EngineConfig) -> ExitCode {
    let listen_addr = config.listen_addr.clone();
    let collaborator = Arc::new(ProcessCollaborator {
        extractor_cmd: config.extractor_cmd.clone(),
        renderer_cmd: config.renderer_cmd.clone(),
        pdf_cmd: config.pdf_cmd.clone(),
    });
    let engine = Engine::new(config, collaborator);

    match driver::reconcile_stale_jobs(&engine).await {
        Ok(reconciled) if !reconciled.is_empty() => {
            tracing::info!(count = reconciled.len(), "reconciled stale jobs on startup");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::error!(error = %err, "startup reconciliation failed");
        }
    }

    let watcher_engine = engine.clone();
    let watcher_handle = tokio::spawn(async move {
        watcher::run(watcher_engine).await;
    });

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("docket: failed to bind {listen_addr}: {err}");
            watcher_handle.abort();
            return ExitCode::from(1);
        }
    };
    tracing::info!(addr = %listen_addr, "docket listening");

    let router = docket::api::router(engine).layer(
        tower_http::trace::TraceLayer::new_for_http(),
    );

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    watcher_handle.abort();
    match serve_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("docket: server error: {err}");
            ExitCode::from(1)
        }
    }
}

async fn show_cases(config: EngineConfig, case_id: Option<String>) -> ExitCode {
    use colored::Colorize;
    use docket::core::case_model::CaseStatus;

    let model = docket::core::case_model::CaseModel::new(&config.input_root, &config.output_root);
    let result = match case_id {
        Some(id) => model.get(&id).map(|c| vec![c]),
        None => model.list(),
    };
    match result {
        Ok(cases) => {
            for case in &cases {
                let status = case.status.as_manifest_token();
                let status = match case.status {
                    CaseStatus::Error => status.red(),
                    CaseStatus::Complete => status.green(),
                    CaseStatus::Processing | CaseStatus::Rendering => status.yellow(),
                    _ => status.normal(),
                };
                println!("{}\t{}\t{} file(s)", case.case_id, status, case.files.len());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("docket: {err}");
            ExitCode::from(1)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
