//! poolfeed-tail: follows growing pool log files and turns new lines into
//! batches of decoded records.
//!
//! The pipeline, leaves first:
//! - [`follow::FollowedFile`]: reads appended bytes from one path, survives
//!   rotation and truncation, yields whole lines only
//! - [`decoder::RecordDecoder`]: one line → one [`LogRecord`](poolfeed_core::LogRecord)
//! - [`batcher::Batcher`]: groups records by count or quiescence
//! - [`source::FileTail`]: ties the three together as a lazy stream
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use poolfeed_core::config::TailConfig;
//! use poolfeed_tail::{FileTail, TailEvent, TailSource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tail = FileTail::new(TailConfig::default());
//!     let mut events = tail.open();
//!     while let Some(TailEvent::Batch(batch)) = events.next().await {
//!         println!("{} new records", batch.len());
//!     }
//! }
//! ```

pub mod batcher;
pub mod decoder;
pub mod error;
pub mod follow;
pub mod source;

pub use decoder::RecordDecoder;
pub use error::{Result, TailError};
pub use source::{FileTail, TailEvent, TailSource};
