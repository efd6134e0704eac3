//! poolfeed-hub: fans tailed log batches out to connected subscribers.
//!
//! # Overview
//!
//! A [`BroadcastHub`] owns one tail source, a small [`ReplayBuffer`] of the
//! most recent records, and the set of registered [`SubscriberSession`]s.
//! The source runs only while at least one session is registered:
//!
//! | Transition          | Trigger                                        |
//! |---------------------|------------------------------------------------|
//! | `Stopped → Running` | first `register`                               |
//! | `Running → Stopped` | last `deregister`, or the tail source fails    |
//!
//! Every new session first receives the buffered records its filter accepts,
//! then each live batch filtered the same way. Delivery never blocks: a
//! session whose queue is full or closed is dropped.
//!
//! [`HubRegistry`] hands out exactly one hub per log-source configuration.

pub mod error;
pub mod hub;
pub mod registry;
pub mod replay;
pub mod session;

pub use error::{HubError, Result};
pub use hub::{BroadcastHub, HubLifecycle, HubStatus};
pub use registry::HubRegistry;
pub use replay::ReplayBuffer;
pub use session::{Delivery, DeliveryKind, SubscriberSession};
