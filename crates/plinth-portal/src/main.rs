use std::sync::Arc;

use anyhow::Context as _;

mod classify;
mod config;
mod edge;
mod forward;
mod probe;

use config::PortalConfig;
use edge::EdgeState;
use forward::Forwarder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = PortalConfig::from_env();

    // Advisory only: the edge serves even if the backend never shows up, so
    // probe answers and 502s are still possible during backend restarts.
    if !probe::wait_for_backend(&cfg.target, cfg.probe).await {
        tracing::warn!(target = %cfg.target, attempts = cfg.probe.attempts, "backend not reachable, serving anyway");
    }

    let forwarder = Forwarder::new(cfg.target.clone())?;
    let app = edge::router(EdgeState {
        forwarder: Arc::new(forwarder),
    });

    let addr = cfg.listen;
    tracing::info!(%addr, backend = %cfg.target, "plinth-portal HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
