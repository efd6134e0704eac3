//! Line → record decoding.
//!
//! A line that parses as a JSON object becomes a structured record; anything
//! else is kept as raw text so operators still see tracebacks and other
//! malformed output.

use poolfeed_core::config::DEFAULT_CATEGORY_FIELD;
use poolfeed_core::types::{LogRecord, Payload};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Arrival counter shared by every decoder in the process.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct RecordDecoder {
    category_field: String,
}

impl RecordDecoder {
    pub fn new(category_field: impl Into<String>) -> Self {
        Self {
            category_field: category_field.into(),
        }
    }

    /// Decode one line. Returns `None` only for blank lines.
    pub fn decode(&self, line: &str, default_category: &str) -> Option<LogRecord> {
        if line.trim().is_empty() {
            return None;
        }

        let (category, payload) = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => {
                let category = map
                    .get(&self.category_field)
                    .and_then(Value::as_str)
                    .unwrap_or(default_category)
                    .to_string();
                (category, Payload::Structured(Value::Object(map)))
            }
            // leading whitespace is kept: traceback frames are indented
            _ => (
                default_category.to_string(),
                Payload::Raw(line.trim_end().to_string()),
            ),
        };

        Some(LogRecord {
            category,
            payload,
            sequence: next_sequence(),
        })
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORY_FIELD)
    }
}
