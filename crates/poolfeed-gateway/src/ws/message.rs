use poolfeed_hub::SubscriberSession;
use poolfeed_protocol::parse_control;
use tracing::{debug, info};

/// Process one inbound WS text frame: it replaces the session's subscription.
pub fn handle(conn_id: &str, text: &str, session: &SubscriberSession, known: &[String]) {
    let filter = parse_control(text, known);
    if filter.accepts_nothing() {
        info!(conn_id, "subscription cleared");
    } else {
        debug!(conn_id, ?filter, "subscription updated");
    }
    session.set_filter(filter);
}
