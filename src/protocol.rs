//! Connector Protocol Messages
//!
//! Typed view over the line-delimited JSON a connector writes to stdout.
//! Only RECORD messages carry data the diff engine inspects; every other
//! message type is reduced to its kind tag so the pairing loop can still
//! check that both runs emit the same message sequence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Which of the two compared runs a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLabel {
    Left,
    Right,
}

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Record,
    State,
    Log,
    Trace,
    Catalog,
    Spec,
    ConnectionStatus,
    Control,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "RECORD",
            Self::State => "STATE",
            Self::Log => "LOG",
            Self::Trace => "TRACE",
            Self::Catalog => "CATALOG",
            Self::Spec => "SPEC",
            Self::ConnectionStatus => "CONNECTION_STATUS",
            Self::Control => "CONTROL",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row emitted by a connector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    #[serde(rename = "stream")]
    pub stream_name: String,
    #[serde(rename = "data", default)]
    pub fields: Map<String, Value>,
    /// Emission time in epoch milliseconds. Carried through, never compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitted_at: Option<i64>,
}

impl RecordEvent {
    pub fn new(stream_name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            stream_name: stream_name.into(),
            fields,
            emitted_at: None,
        }
    }

    /// Build a record from a JSON object literal. Non-object values yield an
    /// empty field mapping.
    pub fn from_value(stream_name: impl Into<String>, data: Value) -> Self {
        let fields = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(stream_name, fields)
    }

    /// True when both records carry structurally equal field mappings.
    pub fn same_data(&self, other: &RecordEvent) -> bool {
        maps_equal(&self.fields, &other.fields)
    }
}

/// Parsed protocol event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Record(RecordEvent),
    Control(MessageKind),
}

impl Event {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Record(_) => MessageKind::Record,
            Self::Control(kind) => *kind,
        }
    }
}

/// A parsed event tagged with the run it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source_label: SourceLabel,
    pub event: Event,
}

impl Message {
    pub fn new(source_label: SourceLabel, event: Event) -> Self {
        Self {
            source_label,
            event,
        }
    }
}

// =============================================================================
// DECODING
// =============================================================================

#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    record: Option<RecordEvent>,
}

/// Errors while decoding a protocol line
#[derive(Debug)]
pub enum ProtocolError {
    /// The line is not JSON at all.
    Json(serde_json::Error),
    /// Valid JSON, but not an object.
    NotAnObject,
    /// A JSON object that does not fit the message schema.
    Schema(serde_json::Error),
    MissingRecord,
}

impl ProtocolError {
    /// True for lines that are plain output rather than a malformed message.
    pub fn is_noise(&self) -> bool {
        matches!(self, Self::Json(_) | Self::NotAnObject)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid protocol message: {}", e),
            Self::NotAnObject => write!(f, "invalid protocol message: not a JSON object"),
            Self::Schema(e) => write!(f, "malformed protocol message: {}", e),
            Self::MissingRecord => write!(f, "RECORD message without a record payload"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Decode one line of connector output into an [`Event`].
pub fn decode_event(line: &str) -> Result<Event, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::Json)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    let wire: WireMessage = serde_json::from_value(value).map_err(ProtocolError::Schema)?;
    match wire.kind {
        MessageKind::Record => wire
            .record
            .map(Event::Record)
            .ok_or(ProtocolError::MissingRecord),
        other => Ok(Event::Control(other)),
    }
}

// =============================================================================
// STRUCTURAL EQUALITY
// =============================================================================

/// Recursive structural equality over JSON values.
///
/// Numbers compare by numeric value, so `1` and `1.0` are equal. Arrays are
/// order-sensitive, objects are not.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => numbers_equal(l, r),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(l), Value::Object(r)) => maps_equal(l, r),
        _ => left == right,
    }
}

fn maps_equal(left: &Map<String, Value>, right: &Map<String, Value>) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(key, value)| right.get(key).is_some_and(|other| values_equal(value, other)))
}

fn numbers_equal(left: &Number, right: &Number) -> bool {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (left.as_u64(), right.as_u64()) {
        return a == b;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_record() {
        let line = r#"{"type":"RECORD","record":{"stream":"customers","data":{"id":"cus_1","balance":0},"emitted_at":1700000000000}}"#;
        let event = decode_event(line).unwrap();
        match event {
            Event::Record(record) => {
                assert_eq!(record.stream_name, "customers");
                assert_eq!(record.fields.get("id"), Some(&json!("cus_1")));
                assert_eq!(record.emitted_at, Some(1700000000000));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_messages() {
        let log = r#"{"type":"LOG","log":{"level":"INFO","message":"Starting syncing"}}"#;
        assert_eq!(decode_event(log).unwrap(), Event::Control(MessageKind::Log));

        let state = r#"{"type":"STATE","state":{"data":{"cursor":"2024-01-01"}}}"#;
        assert_eq!(decode_event(state).unwrap().kind(), MessageKind::State);

        let status = r#"{"type":"CONNECTION_STATUS","connectionStatus":{"status":"SUCCEEDED"}}"#;
        assert_eq!(decode_event(status).unwrap().kind(), MessageKind::ConnectionStatus);
    }

    #[test]
    fn test_decode_rejects_bad_lines() {
        assert!(matches!(
            decode_event("Starting connector..."),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_event(r#"{"type":"RECORD"}"#),
            Err(ProtocolError::MissingRecord)
        ));
        assert!(matches!(
            decode_event(r#"{"type":"UNKNOWN"}"#),
            Err(ProtocolError::Schema(_))
        ));
    }

    #[test]
    fn test_noise_versus_malformed_messages() {
        assert!(decode_event("Starting connector...").unwrap_err().is_noise());
        assert!(decode_event("42").unwrap_err().is_noise());
        assert!(decode_event(r#""banner""#).unwrap_err().is_noise());

        let null_data = r#"{"type":"RECORD","record":{"stream":"s","data":null}}"#;
        assert!(!decode_event(null_data).unwrap_err().is_noise());
        assert!(!decode_event(r#"{"type":"RECORD"}"#).unwrap_err().is_noise());
        assert!(!decode_event(r#"{"type":"UNKNOWN"}"#).unwrap_err().is_noise());
        assert!(!decode_event(r#"{"level":"INFO"}"#).unwrap_err().is_noise());
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(-3), &json!(-3.0)));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
    }

    #[test]
    fn test_nested_structural_equality() {
        let a = json!({"address": {"city": "Paris", "zip": 75001}, "tags": ["a", "b"]});
        let b = json!({"tags": ["a", "b"], "address": {"zip": 75001.0, "city": "Paris"}});
        assert!(values_equal(&a, &b));

        let reordered = json!({"address": {"city": "Paris", "zip": 75001}, "tags": ["b", "a"]});
        assert!(!values_equal(&a, &reordered));

        let extra = json!({"address": {"city": "Paris", "zip": 75001, "x": null}, "tags": ["a", "b"]});
        assert!(!values_equal(&a, &extra));
    }

    #[test]
    fn test_null_is_not_missing() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &json!(0)));
    }
}
