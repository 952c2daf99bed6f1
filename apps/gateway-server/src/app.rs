//! Wires the proxy router into an HTTP server.

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;

use vaultdeck_gateway::{ProxyConfig, ProxyState, router};

use crate::config::GatewayConfig;

/// Proxy routes plus the health probe.
pub fn build(proxy: ProxyConfig) -> anyhow::Result<Router> {
    let state = ProxyState::new(proxy)?;
    Ok(Router::new()
        .route("/healthz", get(healthz))
        .merge(router(state)))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serves until Ctrl-C, then drains in-flight requests.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let proxy = config.proxy_config()?;
    tracing::info!(
        backend = %proxy.backend_url,
        mount = %proxy.mount_prefix,
        timeout_secs = proxy.timeout.as_secs(),
        "proxy configured"
    );
    let app = build(proxy)?;

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
