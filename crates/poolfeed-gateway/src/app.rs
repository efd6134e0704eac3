use axum::{routing::get, Router};
use poolfeed_core::config::LogFeedConfig;
use poolfeed_hub::{BroadcastHub, HubRegistry};
use std::sync::Arc;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: LogFeedConfig,
    /// One hub per log-source set; this gateway only ever asks for one.
    pub hubs: HubRegistry,
}

impl AppState {
    pub fn new(config: LogFeedConfig, hubs: HubRegistry) -> Self {
        Self { config, hubs }
    }

    /// The hub fed by the configured log files, created on first use.
    pub fn hub(&self) -> BroadcastHub {
        self.hubs.hub_for(&self.config.tail)
    }

    /// Whether any directory holding a followed file currently exists.
    pub async fn log_source_present(&self) -> bool {
        for file in self.config.tail.resolved_files() {
            let Some(dir) = file.path.parent() else {
                continue;
            };
            if tokio::fs::try_exists(dir).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws/logs", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use poolfeed_core::config::{HubConfig, LogFileConfig, TailConfig};
    use std::path::Path;

    /// State following `main.log.json` and `partial.log.json` under `dir`,
    /// polled fast enough for tests.
    pub(crate) fn test_state(dir: &Path) -> Arc<AppState> {
        let tail = TailConfig {
            poll_interval_ms: 20,
            quiescence_ms: 50,
            ..TailConfig::for_files(vec![
                LogFileConfig {
                    path: dir.join("main.log.json"),
                    default_category: "main".into(),
                },
                LogFileConfig {
                    path: dir.join("partial.log.json"),
                    default_category: "partials".into(),
                },
            ])
        };
        let config = LogFeedConfig {
            tail,
            ..LogFeedConfig::default()
        };
        let hubs = HubRegistry::new(HubConfig::default());
        Arc::new(AppState::new(config, hubs))
    }

    #[tokio::test]
    async fn hub_is_shared_across_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.hub();
        state.hub();
        assert_eq!(state.hubs.len(), 1);
    }

    #[tokio::test]
    async fn log_source_presence_follows_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();
        let state = test_state(&logs);
        assert!(state.log_source_present().await);

        std::fs::remove_dir(&logs).unwrap();
        assert!(!state.log_source_present().await);
    }
}
