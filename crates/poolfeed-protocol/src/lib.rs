//! Wire format between the feed and its WebSocket clients.
//!
//! Outbound: one envelope shape, `{"data": [...]}`, used for both the initial
//! replay and live batches. Inbound: a control message naming the categories
//! the client wants.

pub mod control;
pub mod envelope;

pub use control::parse_control;
pub use envelope::Envelope;
