use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Config could not be loaded, or loaded but failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            FeedError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
