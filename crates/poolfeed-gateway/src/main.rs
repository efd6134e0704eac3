use poolfeed_core::config::LogFeedConfig;
use poolfeed_hub::HubRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod app;
mod http;
mod ws;

const DEFAULT_LOG_FILTER: &str =
    "poolfeed_gateway=info,poolfeed_hub=info,poolfeed_tail=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    // load config: POOLFEED_CONFIG env > ~/.poolfeed/poolfeed.toml
    let config_path = std::env::var("POOLFEED_CONFIG").ok();
    let config = LogFeedConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        LogFeedConfig::default()
    });
    config.validate()?;

    let files = config.tail.resolved_files();
    for file in &files {
        info!(
            path = %file.path.display(),
            category = %file.default_category,
            "log file configured"
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let hubs = HubRegistry::new(config.hub.clone());
    let state = Arc::new(app::AppState::new(config, hubs));
    let router = app::build_router(state);

    info!("poolfeed gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("poolfeed gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
