use std::sync::Arc;

use anyhow::Context as _;

mod config;
mod routes;
mod sink;
mod startup;
mod supervisor;

use config::AgentConfig;
use routes::AppState;
use startup::StartupController;
use supervisor::CommandSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AgentConfig::from_env();

    std::fs::create_dir_all(&cfg.scratch_dir)
        .with_context(|| format!("create scratch dir {}", cfg.scratch_dir.display()))?;
    let swept = sink::sweep_stale(&cfg.scratch_dir);
    if swept > 0 {
        tracing::info!(swept, "removed stale output files from a previous run");
    }

    let supervisor = CommandSupervisor::new(cfg.scratch_dir);
    let startup = Arc::new(StartupController::new(
        cfg.startup_pid_file,
        cfg.startup_unit,
    ));
    let app = routes::router(AppState {
        supervisor: supervisor.clone(),
        startup,
    });

    let addr = cfg.listen;
    tracing::info!(%addr, "plinth-agent HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Connections are drained; now drain the children before exiting so no
    // command subtree or sink file outlives the agent.
    let drained = supervisor.drain_all().await;
    if drained > 0 {
        tracing::info!(drained, "commands drained at shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
