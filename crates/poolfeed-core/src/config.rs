use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FeedError, Result};
use crate::types::CategoryFilter;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_BACKSCAN_BYTES: u64 = 2000;
pub const DEFAULT_BATCH_SIZE: usize = 10; // flush once this many records are pending
pub const DEFAULT_QUIESCENCE_MS: u64 = 1000; // flush a partial batch after 1s of silence
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_REPLAY_CAPACITY: usize = 15;
pub const DEFAULT_SESSION_QUEUE: usize = 32;
pub const DEFAULT_CATEGORY_FIELD: &str = "category";

/// Legacy deployments only export the log directory through this variable.
pub const LEGACY_LOG_DIR_ENV: &str = "POOL_LOG_DIR";

/// File pair written by the pool inside the log directory, with the category
/// each one falls back to.
pub const LEGACY_LOG_FILES: [(&str, &str); 2] = [
    ("main.log.json", "main"),
    ("partial.log.json", "partials"),
];

/// Top-level config (poolfeed.toml + POOLFEED_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFeedConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub tail: TailConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// One followed log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Absolute path of the file. It does not need to exist yet.
    pub path: PathBuf,
    /// Category for lines that carry none of their own.
    pub default_category: String,
}

/// Tail source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailConfig {
    /// Directory holding `main.log.json` / `partial.log.json`.
    /// Only consulted when `files` is empty. Falls back to `$POOL_LOG_DIR`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<LogFileConfig>,
    #[serde(default = "default_backscan_bytes")]
    pub backscan_bytes: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// JSON field carrying a record's category.
    #[serde(default = "default_category_field")]
    pub category_field: String,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            files: Vec::new(),
            backscan_bytes: DEFAULT_BACKSCAN_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            quiescence_ms: DEFAULT_QUIESCENCE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            category_field: DEFAULT_CATEGORY_FIELD.to_string(),
        }
    }
}

impl TailConfig {
    /// Build a config for an explicit file list with default tuning.
    pub fn for_files(files: Vec<LogFileConfig>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Files to follow: the explicit list, or the legacy pair inside the log
    /// directory when the list is empty.
    pub fn resolved_files(&self) -> Vec<LogFileConfig> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        let Some(dir) = self.effective_log_dir() else {
            return Vec::new();
        };
        LEGACY_LOG_FILES
            .iter()
            .map(|(name, category)| LogFileConfig {
                path: dir.join(name),
                default_category: (*category).to_string(),
            })
            .collect()
    }

    /// `log_dir`, or `$POOL_LOG_DIR` when unset.
    pub fn effective_log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .clone()
            .or_else(|| std::env::var_os(LEGACY_LOG_DIR_ENV).map(PathBuf::from))
    }

    /// Stable identity of this log-source set: sorted, de-duplicated paths.
    pub fn source_key(&self) -> String {
        let mut paths: Vec<String> = self
            .resolved_files()
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();
        paths.sort();
        paths.dedup();
        paths.join("\n")
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FeedError::Config("tail.batch_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(FeedError::Config(
                "tail.poll_interval_ms must be at least 1".into(),
            ));
        }
        let files = self.resolved_files();
        if files.is_empty() {
            return Err(FeedError::Config(format!(
                "no log files configured (set tail.files, tail.log_dir or {LEGACY_LOG_DIR_ENV})"
            )));
        }
        if let Some(f) = files.iter().find(|f| !f.path.is_absolute()) {
            return Err(FeedError::Config(format!(
                "log file path must be absolute: {}",
                f.path.display()
            )));
        }
        Ok(())
    }
}

/// Broadcast hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Records kept for replay to new subscribers (N).
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
    /// Deliveries a session may have queued before it is dropped.
    #[serde(default = "default_session_queue")]
    pub session_queue: usize,
    /// Categories a fresh session starts with. Empty means every category.
    #[serde(default = "default_filter")]
    pub default_filter: Vec<String>,
    /// Category names honoured in control messages. Empty accepts any name.
    #[serde(default)]
    pub known_categories: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            session_queue: DEFAULT_SESSION_QUEUE,
            default_filter: default_filter(),
            known_categories: Vec::new(),
        }
    }
}

impl HubConfig {
    pub fn initial_filter(&self) -> CategoryFilter {
        if self.default_filter.is_empty() {
            CategoryFilter::All
        } else {
            CategoryFilter::only(self.default_filter.iter().cloned())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.replay_capacity == 0 {
            return Err(FeedError::Config("hub.replay_capacity must be at least 1".into()));
        }
        if self.session_queue == 0 {
            return Err(FeedError::Config("hub.session_queue must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_backscan_bytes() -> u64 {
    DEFAULT_BACKSCAN_BYTES
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_quiescence_ms() -> u64 {
    DEFAULT_QUIESCENCE_MS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_category_field() -> String {
    DEFAULT_CATEGORY_FIELD.to_string()
}
fn default_replay_capacity() -> usize {
    DEFAULT_REPLAY_CAPACITY
}
fn default_session_queue() -> usize {
    DEFAULT_SESSION_QUEUE
}
fn default_filter() -> Vec<String> {
    vec!["main".to_string()]
}

impl LogFeedConfig {
    /// Load config from a TOML file with POOLFEED_* env var overrides.
    ///
    /// Nested keys use a double underscore: `POOLFEED_TAIL__BATCH_SIZE=20`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("POOLFEED_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: LogFeedConfig = figment
            .extract()
            .map_err(|e| FeedError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tail.validate()?;
        self.hub.validate()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.poolfeed/poolfeed.toml", home)
}
