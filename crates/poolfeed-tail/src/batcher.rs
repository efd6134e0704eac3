use poolfeed_core::types::{Batch, LogRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Groups decoded records into batches.
///
/// A batch is emitted as soon as `max` records are pending, or by the caller
/// via [`Batcher::flush_if_quiet`] once no record has arrived for the
/// quiescence timeout.
#[derive(Debug)]
pub struct Batcher {
    max: usize,
    pending: Vec<Arc<LogRecord>>,
    last_push: Option<Instant>,
}

impl Batcher {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            pending: Vec::with_capacity(max),
            last_push: None,
        }
    }

    /// Add a record; returns a full batch when `max` is reached.
    pub fn push(&mut self, record: Arc<LogRecord>) -> Option<Batch> {
        self.pending.push(record);
        self.last_push = Some(Instant::now());
        if self.pending.len() >= self.max {
            self.flush()
        } else {
            None
        }
    }

    /// Emit whatever is pending.
    pub fn flush(&mut self) -> Option<Batch> {
        let records = std::mem::replace(&mut self.pending, Vec::with_capacity(self.max));
        Batch::new(records)
    }

    /// Emit pending records if the last one arrived at least `quiescence` ago.
    pub fn flush_if_quiet(&mut self, now: Instant, quiescence: Duration) -> Option<Batch> {
        match self.last_push {
            Some(at) if !self.pending.is_empty() && now.duration_since(at) >= quiescence => {
                self.flush()
            }
            _ => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
