use poolfeed_core::types::{LogRecord, Payload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Server → Client delivery.
/// Wire: `{ "data": [ {...structured record...}, "raw line", ... ] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Vec<Payload>,
}

impl Envelope {
    pub fn from_records(records: &[Arc<LogRecord>]) -> Self {
        Self {
            data: records.iter().map(|r| r.payload.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_json(&self) -> String {
        // Payload values are already valid JSON; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"data":[]}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_envelope_is_empty_array() {
        assert_eq!(Envelope::default().to_json(), r#"{"data":[]}"#);
    }

    #[test]
    fn mixes_structured_and_raw_in_order() {
        let records = vec![
            Arc::new(LogRecord {
                category: "partials".into(),
                payload: Payload::Structured(serde_json::json!({"category": "partials"})),
                sequence: 7,
            }),
            Arc::new(LogRecord {
                category: "main".into(),
                payload: Payload::Raw("Traceback (most recent call last):".into()),
                sequence: 8,
            }),
        ];
        let json = Envelope::from_records(&records).to_json();
        assert_eq!(
            json,
            r#"{"data":[{"category":"partials"},"Traceback (most recent call last):"]}"#
        );
        // sequence numbers never leak onto the wire
        assert!(!json.contains("sequence"));
    }
}
