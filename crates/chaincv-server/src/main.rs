//! chaincv worker process.
//!
//! Leases `fetch_file_path` and `process_document` tasks and runs the
//! analysis pipeline until interrupted.

use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chaincv_jobs::{WorkerConfig, WorkerEvent};
use chaincv_server::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, daily rotation)
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - env filter (default: "chaincv_server=debug,chaincv_jobs=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chaincv_server=debug,chaincv_jobs=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("chaincv-worker.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));

        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
        None
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let app = App::from_env().await?;

    // Documents whose analysis landed before a crash never got their status flip.
    match app.document_service().reconcile().await {
        Ok(0) => {}
        Ok(n) => info!(updated = n, "Startup reconciliation promoted documents"),
        Err(e) => warn!(error = %e, "Startup reconciliation failed"),
    }

    let worker_config = WorkerConfig::from_env();
    info!(
        worker_id = %worker_config.worker_id,
        max_concurrent = worker_config.max_concurrent_tasks,
        enabled = worker_config.enabled,
        "Starting task worker"
    );
    let handle = app.start_worker(worker_config);

    let mut events = handle.events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let WorkerEvent::TaskFailed {
                task_id,
                task_type,
                error,
            } = event
            {
                warn!(%task_id, %task_type, %error, "Task did not complete");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining in-flight tasks");
    handle.shutdown().await?;
    event_log.abort();
    info!("Worker stopped");
    Ok(())
}
