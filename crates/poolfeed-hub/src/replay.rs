use poolfeed_core::types::{CategoryFilter, LogRecord};
use std::collections::VecDeque;
use std::sync::Arc;

/// Fixed-capacity window of the most recent records, oldest first.
///
/// Not synchronized on its own: the hub only touches it under its state
/// mutex, so a snapshot always sees a whole append or none of it.
#[derive(Debug)]
pub struct ReplayBuffer {
    records: VecDeque<Arc<LogRecord>>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append in order, then evict from the front down to capacity.
    pub fn append(&mut self, records: &[Arc<LogRecord>]) {
        // Only the tail end of an oversized append can survive eviction.
        let skip = records.len().saturating_sub(self.capacity);
        self.records.extend(records[skip..].iter().cloned());
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Buffered records accepted by `filter`, in arrival order.
    pub fn snapshot(&self, filter: &CategoryFilter) -> Vec<Arc<LogRecord>> {
        self.records
            .iter()
            .filter(|r| filter.accepts(&r.category))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolfeed_core::types::Payload;

    fn record(category: &str, sequence: u64) -> Arc<LogRecord> {
        Arc::new(LogRecord {
            category: category.to_string(),
            payload: Payload::Raw(sequence.to_string()),
            sequence,
        })
    }

    fn sequences(records: &[Arc<LogRecord>]) -> Vec<u64> {
        records.iter().map(|r| r.sequence).collect()
    }

    #[test]
    fn keeps_last_n_in_arrival_order() {
        let mut buffer = ReplayBuffer::new(15);
        let mut total = 0u64;
        // uneven batch sizes, including one larger than the capacity
        for size in [3usize, 1, 7, 20, 2, 9, 4] {
            let batch: Vec<_> = (0..size)
                .map(|_| {
                    total += 1;
                    record("main", total)
                })
                .collect();
            buffer.append(&batch);
            assert!(buffer.len() <= buffer.capacity());

            let expected: Vec<u64> = ((total.saturating_sub(15) + 1)..=total).collect();
            assert_eq!(sequences(&buffer.snapshot(&CategoryFilter::All)), expected);
        }
    }

    #[test]
    fn snapshot_filters_by_category() {
        let mut buffer = ReplayBuffer::new(15);
        buffer.append(&[
            record("partials", 1),
            record("payments", 2),
            record("partials", 3),
        ]);

        let partials = buffer.snapshot(&CategoryFilter::only(["partials"]));
        assert_eq!(sequences(&partials), vec![1, 3]);
        assert!(buffer.snapshot(&CategoryFilter::none()).is_empty());
    }

    #[test]
    fn eviction_is_category_agnostic() {
        let mut buffer = ReplayBuffer::new(2);
        buffer.append(&[record("payments", 1)]);
        buffer.append(&[record("partials", 2), record("partials", 3)]);

        assert!(buffer
            .snapshot(&CategoryFilter::only(["payments"]))
            .is_empty());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buffer = ReplayBuffer::new(3);
        buffer.append(&[record("main", 1)]);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
