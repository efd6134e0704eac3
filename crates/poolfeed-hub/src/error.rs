use thiserror::Error;

/// Errors surfaced by hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The session's outbound queue is full; it is not keeping up.
    #[error("Subscriber queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The receiving half of the session was dropped.
    #[error("Subscriber connection closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, HubError>;
