use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier for one subscriber session (UUIDv7, so ids sort by connect time
/// in the logs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// LogRecord / Payload
// ---------------------------------------------------------------------------

/// Body of a decoded log line.
///
/// Serializes untagged: a structured payload goes out as the parsed JSON value
/// itself, a raw payload as a plain JSON string. `Raw` is listed first so a
/// JSON string reads back as raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Raw(String),
    Structured(serde_json::Value),
}

/// One decoded line of a pool log. Immutable once built; shared behind `Arc`
/// between the replay buffer and in-flight deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub category: String,
    pub payload: Payload,
    /// Process-wide arrival order. Not part of the wire format.
    pub sequence: u64,
}

impl LogRecord {
    pub fn is_raw(&self) -> bool {
        matches!(self.payload, Payload::Raw(_))
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Ordered, non-empty group of records produced by one tail read cycle.
#[derive(Debug, Clone)]
pub struct Batch(Vec<Arc<LogRecord>>);

impl Batch {
    /// Returns `None` for an empty record list; a batch is never empty.
    pub fn new(records: Vec<Arc<LogRecord>>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self(records))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[Arc<LogRecord>] {
        &self.0
    }

    /// Records accepted by `filter`, in batch order.
    pub fn filtered(&self, filter: &CategoryFilter) -> Vec<Arc<LogRecord>> {
        self.0
            .iter()
            .filter(|r| filter.accepts(&r.category))
            .cloned()
            .collect()
    }

    pub fn into_records(self) -> Vec<Arc<LogRecord>> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// CategoryFilter
// ---------------------------------------------------------------------------

/// Set of categories a subscriber wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    /// Accepts every category.
    All,
    /// Accepts exactly the listed categories. An empty set accepts nothing.
    Only(BTreeSet<String>),
}

impl CategoryFilter {
    pub fn none() -> Self {
        CategoryFilter::Only(BTreeSet::new())
    }

    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryFilter::Only(categories.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(set) => set.contains(category),
        }
    }

    pub fn accepts_nothing(&self) -> bool {
        matches!(self, CategoryFilter::Only(set) if set.is_empty())
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter::All
    }
}
