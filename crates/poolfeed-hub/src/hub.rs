use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use poolfeed_core::config::HubConfig;
use poolfeed_core::types::{Batch, SessionId};
use poolfeed_tail::{TailError, TailEvent, TailSource};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::replay::ReplayBuffer;
use crate::session::{Delivery, SessionShared, SubscriberSession};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubLifecycle {
    Stopped,
    Running,
}

/// Point-in-time view of a hub, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub state: HubLifecycle,
    pub subscribers: usize,
    pub buffered: usize,
    /// Generation of the current (or last) tail source run.
    pub epoch: u64,
    pub batches_delivered: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

enum Lifecycle {
    Stopped,
    Running {
        epoch: u64,
        cancel: CancellationToken,
    },
}

/// Everything guarded by the hub mutex. Registration, fan-out and the replay
/// buffer change together, so a new session sees each batch exactly once:
/// either in its replay or as a live delivery.
struct HubState {
    lifecycle: Lifecycle,
    sessions: HashMap<SessionId, Weak<SessionShared>>,
    buffer: ReplayBuffer,
    epoch: u64,
    batches_delivered: u64,
    last_batch_at: Option<DateTime<Utc>>,
}

impl HubState {
    fn running_epoch(&self) -> Option<u64> {
        match self.lifecycle {
            Lifecycle::Running { epoch, .. } => Some(epoch),
            Lifecycle::Stopped => None,
        }
    }

    /// Cancel the running source (if any) and forget its records. A restarted
    /// source backscans again, so keeping them would replay duplicates.
    fn stop(&mut self, reason: &str) {
        if let Lifecycle::Running { epoch, cancel } =
            std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
        {
            cancel.cancel();
            self.buffer.clear();
            info!(epoch, reason, "hub stopped");
        }
    }

    fn live_sessions(&self) -> usize {
        self.sessions
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Drop entries whose session no longer exists.
    fn prune(&mut self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, weak| weak.strong_count() > 0);
        let pruned = before - self.sessions.len();
        if pruned > 0 {
            debug!(pruned, "pruned dropped subscribers");
            if self.sessions.is_empty() {
                self.stop("all subscribers dropped");
            }
        }
    }
}

struct HubInner {
    source: Arc<dyn TailSource>,
    state: Mutex<HubState>,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_batch(&self, epoch: u64, batch: Batch) {
        let mut state = self.lock();
        if state.running_epoch() != Some(epoch) {
            debug!(epoch, records = batch.len(), "discarding batch from stale tail");
            return;
        }

        state.buffer.append(batch.records());
        state.batches_delivered += 1;
        state.last_batch_at = Some(Utc::now());

        let mut dropped = Vec::new();
        for (id, weak) in &state.sessions {
            let Some(session) = weak.upgrade() else {
                dropped.push(id.clone());
                continue;
            };
            let records = batch.filtered(&session.filter());
            if records.is_empty() {
                continue;
            }
            if let Err(e) = session.offer(Delivery::live(records)) {
                warn!(session_id = %id, error = %e, "dropping subscriber");
                session.evict();
                dropped.push(id.clone());
            }
        }

        for id in &dropped {
            state.sessions.remove(id);
        }
        if !dropped.is_empty() && state.sessions.is_empty() {
            state.stop("last subscriber dropped");
        }
    }

    fn halt(&self, epoch: u64, reason: &str) {
        let mut state = self.lock();
        if state.running_epoch() != Some(epoch) {
            debug!(epoch, reason, "ignoring failure from stale tail");
            return;
        }
        error!(
            epoch,
            reason,
            subscribers = state.sessions.len(),
            "tail source failed, hub stopping until the next registration"
        );
        state.stop(reason);
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        self.lock().stop("hub dropped");
    }
}

/// Fans batches from one tail source out to every registered session.
///
/// The source is opened on the first registration and cancelled when the last
/// session leaves. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(source: Arc<dyn TailSource>, config: &HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                source,
                state: Mutex::new(HubState {
                    lifecycle: Lifecycle::Stopped,
                    sessions: HashMap::new(),
                    buffer: ReplayBuffer::new(config.replay_capacity),
                    epoch: 0,
                    batches_delivered: 0,
                    last_batch_at: None,
                }),
            }),
        }
    }

    /// Add a session, starting the source if the hub is stopped.
    ///
    /// The session is sent its replay (possibly empty) before any live batch.
    /// Registering a session that is already registered does nothing.
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, session: &SubscriberSession) -> Result<()> {
        let mut state = self.inner.lock();
        state.prune();
        if state.sessions.contains_key(session.id()) {
            debug!(session_id = %session.id(), "session already registered");
            return Ok(());
        }

        let replay = state.buffer.snapshot(&session.filter());
        let replayed = replay.len();
        session.shared().offer(Delivery::replay(replay))?;

        state
            .sessions
            .insert(session.id().clone(), session.downgrade());
        if state.running_epoch().is_none() {
            self.start(&mut state);
        }

        info!(
            session_id = %session.id(),
            replayed,
            subscribers = state.sessions.len(),
            "subscriber registered"
        );
        Ok(())
    }

    /// Remove a session. Returns whether it was registered; removing an
    /// unknown id is a no-op.
    pub fn deregister(&self, id: &SessionId) -> bool {
        let mut state = self.inner.lock();
        let removed = state.sessions.remove(id).is_some();
        state.prune();
        if !removed {
            return false;
        }
        info!(session_id = %id, subscribers = state.sessions.len(), "subscriber deregistered");
        if state.sessions.is_empty() {
            state.stop("last subscriber left");
        }
        true
    }

    /// Deliver a batch from the source run identified by `epoch`.
    pub fn on_batch(&self, epoch: u64, batch: Batch) {
        self.inner.on_batch(epoch, batch);
    }

    /// Stop after an unrecoverable source failure. Registered sessions stay
    /// registered but receive nothing until a new registration restarts the
    /// source.
    pub fn on_fatal(&self, epoch: u64, error: TailError) {
        self.inner.halt(epoch, &error.to_string());
    }

    pub fn status(&self) -> HubStatus {
        let state = self.inner.lock();
        HubStatus {
            state: match state.lifecycle {
                Lifecycle::Running { .. } => HubLifecycle::Running,
                Lifecycle::Stopped => HubLifecycle::Stopped,
            },
            subscribers: state.live_sessions(),
            buffered: state.buffer.len(),
            epoch: state.epoch,
            batches_delivered: state.batches_delivered,
            last_batch_at: state.last_batch_at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running_epoch().is_some()
    }

    /// Registered sessions that are still alive.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().live_sessions()
    }

    fn start(&self, state: &mut HubState) {
        state.epoch += 1;
        let epoch = state.epoch;
        let cancel = CancellationToken::new();
        state.lifecycle = Lifecycle::Running {
            epoch,
            cancel: cancel.clone(),
        };

        let events = self.inner.source.open();
        tokio::spawn(pump(Arc::downgrade(&self.inner), events, epoch, cancel));
        info!(epoch, "hub started");
    }
}

/// Drive one source run until it ends, fails, or is cancelled.
async fn pump(
    hub: Weak<HubInner>,
    mut events: BoxStream<'static, TailEvent>,
    epoch: u64,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        let Some(inner) = hub.upgrade() else {
            break;
        };
        match event {
            Some(TailEvent::Batch(batch)) => inner.on_batch(epoch, batch),
            Some(TailEvent::Fatal(e)) => {
                inner.halt(epoch, &e.to_string());
                break;
            }
            None => {
                inner.halt(epoch, "tail stream ended");
                break;
            }
        }
    }
    debug!(epoch, "tail pump exited");
}
