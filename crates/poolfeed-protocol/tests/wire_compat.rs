// Verify the wire format matches what existing pool dashboard clients parse.
// Replay and live deliveries share one envelope, so one parser is enough.

use poolfeed_core::types::{CategoryFilter, LogRecord, Payload};
use poolfeed_protocol::{parse_control, Envelope};
use std::sync::Arc;

fn structured(category: &str, sequence: u64) -> Arc<LogRecord> {
    Arc::new(LogRecord {
        category: category.to_string(),
        payload: Payload::Structured(serde_json::json!({
            "category": category,
            "launcher_id": "0xabc",
        })),
        sequence,
    })
}

#[test]
fn envelope_has_single_data_key() {
    let json = Envelope::from_records(&[structured("partials", 1)]).to_json();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let obj = value.as_object().unwrap();
    assert_eq!(obj.len(), 1);
    assert!(obj["data"].is_array());
    assert_eq!(obj["data"][0]["launcher_id"], "0xabc");
}

#[test]
fn initial_replay_of_empty_buffer() {
    let json = Envelope::from_records(&[]).to_json();
    assert_eq!(json, r#"{"data":[]}"#);
}

#[test]
fn envelope_parses_back() {
    let records = vec![
        structured("payments", 1),
        Arc::new(LogRecord {
            category: "main".to_string(),
            payload: Payload::Raw("2021-12-20 12:44 pool restarted".to_string()),
            sequence: 2,
        }),
    ];
    let json = Envelope::from_records(&records).to_json();
    let back: Envelope = serde_json::from_str(&json).unwrap();

    assert_eq!(back.data.len(), 2);
    assert!(matches!(back.data[0], Payload::Structured(_)));
    assert_eq!(
        back.data[1],
        Payload::Raw("2021-12-20 12:44 pool restarted".to_string())
    );
}

#[test]
fn control_message_replaces_not_merges() {
    // Each message stands alone: the second one fully determines the filter.
    let first = parse_control(r#"{"payments": true}"#, &[]);
    let second = parse_control(r#"{"partials": true}"#, &[]);

    assert!(first.accepts("payments"));
    assert!(second.accepts("partials"));
    assert!(!second.accepts("payments"));
}

#[test]
fn control_message_with_both_categories() {
    let filter = parse_control(r#"{"partials": true, "payments": true}"#, &[]);
    assert_eq!(filter, CategoryFilter::only(["partials", "payments"]));
}
