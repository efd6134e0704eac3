//! poolfeed-core: shared data model, configuration and errors for the
//! pool log feed.

pub mod config;
pub mod error;
pub mod types;

pub use error::{FeedError, Result};
pub use types::{Batch, CategoryFilter, LogRecord, Payload, SessionId};
