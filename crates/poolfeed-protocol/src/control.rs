//! Subscription control messages.
//!
//! Wire: `{ "partials": true, "payments": 1 }`. Every key present names a
//! category the client wants, whatever its value. The message replaces the
//! session's filter outright; anything that is not a JSON object selects
//! nothing.

use poolfeed_core::types::CategoryFilter;
use serde_json::Value;

/// Parse one inbound control message into the filter it selects.
///
/// `known` restricts which keys count as categories; an empty slice accepts
/// any key. Never fails: malformed input is "subscribe to nothing".
pub fn parse_control(text: &str, known: &[String]) -> CategoryFilter {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
        return CategoryFilter::none();
    };

    CategoryFilter::only(
        map.into_iter()
            .filter(|(key, _)| known.is_empty() || known.iter().any(|k| k == key))
            .map(|(key, _)| key),
    )
}
