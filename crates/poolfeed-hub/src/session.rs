use poolfeed_core::types::{CategoryFilter, LogRecord, SessionId};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};

/// Whether a delivery is the one-off replay or a live batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Replay,
    Live,
}

/// Records handed to one session in one go, already filtered for it.
///
/// A replay may be empty; a live delivery never is.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub kind: DeliveryKind,
    pub records: Vec<Arc<LogRecord>>,
}

impl Delivery {
    pub fn replay(records: Vec<Arc<LogRecord>>) -> Self {
        Self {
            kind: DeliveryKind::Replay,
            records,
        }
    }

    pub fn live(records: Vec<Arc<LogRecord>>) -> Self {
        Self {
            kind: DeliveryKind::Live,
            records,
        }
    }
}

/// The part of a session the hub can reach through its weak registry entry.
#[derive(Debug)]
pub(crate) struct SessionShared {
    id: SessionId,
    filter: RwLock<CategoryFilter>,
    tx: mpsc::Sender<Delivery>,
    evicted: CancellationToken,
}

impl SessionShared {
    pub(crate) fn id(&self) -> &SessionId {
        &self.id
    }

    pub(crate) fn filter(&self) -> CategoryFilter {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queue a delivery without waiting.
    pub(crate) fn offer(&self, delivery: Delivery) -> Result<()> {
        self.tx.try_send(delivery).map_err(|e| match e {
            TrySendError::Full(_) => HubError::QueueFull {
                capacity: self.tx.max_capacity(),
            },
            TrySendError::Closed(_) => HubError::SessionClosed,
        })
    }

    /// Mark the session as dropped by the hub.
    pub(crate) fn evict(&self) {
        self.evicted.cancel();
    }
}

/// One subscriber's handle: its id, its current filter and the sending side
/// of its outbound queue.
///
/// The connection owns this value. The hub only keeps a weak reference, so
/// dropping the session is enough to take it out of the fan-out.
#[derive(Debug)]
pub struct SubscriberSession {
    shared: Arc<SessionShared>,
}

impl SubscriberSession {
    /// Create a session and the receiver its connection drains.
    ///
    /// `queue` bounds how many deliveries may wait before the session is
    /// considered too slow.
    pub fn new(filter: CategoryFilter, queue: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let shared = Arc::new(SessionShared {
            id: SessionId::new(),
            filter: RwLock::new(filter),
            tx,
            evicted: CancellationToken::new(),
        });
        (Self { shared }, rx)
    }

    pub fn id(&self) -> &SessionId {
        self.shared.id()
    }

    pub fn filter(&self) -> CategoryFilter {
        self.shared.filter()
    }

    /// Replace the filter. Takes effect from the next live batch.
    pub fn set_filter(&self, filter: CategoryFilter) {
        *self
            .shared
            .filter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = filter;
    }

    /// Resolves once the hub has dropped this session for falling behind.
    /// Nothing more will be delivered after that.
    pub async fn evicted(&self) {
        self.shared.evicted.cancelled().await
    }

    pub fn is_evicted(&self) -> bool {
        self.shared.evicted.is_cancelled()
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionShared> {
        Arc::downgrade(&self.shared)
    }
}
