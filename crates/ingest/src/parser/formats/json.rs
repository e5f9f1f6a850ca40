use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::parser::model::TAG_CLOCK_UNRELIABLE;
use crate::parser::normalize::{
    from_epoch, from_epoch_f64, normalize_severity, parse_timestamp, resolve_timestamp,
    severity_from_number,
};
use crate::parser::synonyms::{fill, rank_pairs, Slot, GENERIC_KEYS};
use crate::parser::traits::*;
use super::check_line_size;

/// JSON parser
///
/// Maps well-known keys onto canonical slots via [`GENERIC_KEYS`]; every
/// other key, and every synonym that lost its slot, is preserved in
/// `fields`, nested values as compact JSON.
pub struct JsonParser;

impl LogParser for JsonParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;

        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| ParseError::ParseFailed(format!("Invalid JSON: {}", e)))?;

        let obj = value
            .as_object()
            .ok_or_else(|| ParseError::InvalidFormat("JSON is not an object".to_string()))?;

        Ok(build_event(obj, raw, received_at))
    }

    fn format(&self) -> LogFormat {
        LogFormat::Json
    }
}

fn build_event(obj: &Map<String, Value>, raw: &str, received_at: DateTime<Utc>) -> NormalizedEvent {
    let mut event = NormalizedEvent::new(received_at, Severity::Info, "", raw, LogFormat::Json);
    let mut timestamp = None;
    let mut level = None;
    let mut message = None;

    let (candidates, unmapped) = rank_pairs(GENERIC_KEYS, obj);
    for (key, value) in unmapped {
        event.fields.push((key.clone(), field_text(value)));
    }

    for (slot, key, value) in candidates {
        let handled = match slot {
            Slot::Timestamp => fill(&mut timestamp, || extract_timestamp(value, received_at)),
            Slot::Level => fill(&mut level, || extract_level(value)),
            Slot::Message => fill(&mut message, || scalar_text(value)),
            slot => scalar_text(value)
                .map(|text| slot.assign(&mut event, &text))
                .unwrap_or(false),
        };

        if !handled {
            event.fields.push((key.clone(), field_text(value)));
        }
    }

    let (ts, reliable) = resolve_timestamp(timestamp, received_at);
    event.timestamp = ts;
    if !reliable {
        event.add_tag(TAG_CLOCK_UNRELIABLE);
    }
    event.level = level.unwrap_or(Severity::Info);
    event.message = message.unwrap_or_else(|| raw.trim().to_string());
    event
}

/// String form of a scalar; objects, arrays and null have none.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn extract_timestamp(value: &Value, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(from_epoch)
            .or_else(|| n.as_f64().and_then(from_epoch_f64)),
        Value::String(s) => parse_timestamp(s, received_at),
        _ => None,
    }
}

fn extract_level(value: &Value) -> Option<Severity> {
    match value {
        Value::Number(n) => n.as_u64().map(severity_from_number),
        Value::String(s) => Some(normalize_severity(s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_basic_json() {
        let raw = r#"{"level":"warn","msg":"Disk almost full","timestamp":"2025-01-01T10:00:00Z","host":"db-1"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.level, Severity::Warning);
        assert_eq!(event.message, "Disk almost full");
        assert_eq!(event.hostname.as_deref(), Some("db-1"));
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        assert!(event.fields.is_empty());
    }

    #[test]
    fn test_at_timestamp_synonym() {
        let raw = r#"{"@timestamp":"2025-02-03T04:05:06.789Z","message":"ok"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.timestamp.timestamp_subsec_millis(), 789);
        assert!(!event.clock_unreliable());
    }

    #[test]
    fn test_epoch_timestamps() {
        let secs = JsonParser.parse(r#"{"ts":1700000000,"msg":"a"}"#, now()).unwrap();
        assert_eq!(secs.timestamp.timestamp(), 1_700_000_000);
        let millis = JsonParser.parse(r#"{"time":1700000000123,"msg":"a"}"#, now()).unwrap();
        assert_eq!(millis.timestamp.timestamp_millis(), 1_700_000_000_123);
        let float = JsonParser.parse(r#"{"ts":1700000000.25,"msg":"a"}"#, now()).unwrap();
        assert_eq!(float.timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_unmapped_keys_preserved() {
        let raw = r#"{"msg":"login","tenant":"acme","attempts":3,"ctx":{"region":"eu"}}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.field("tenant"), Some("acme"));
        assert_eq!(event.field("attempts"), Some("3"));
        assert_eq!(event.field("ctx"), Some(r#"{"region":"eu"}"#));
    }

    #[test]
    fn test_semantic_fields() {
        let raw = r#"{"msg":"req","method":"POST","status":503,"url":"/api","src_ip":"10.0.0.1","user":"alice","pid":"77","dst_port":443}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.http_method.as_deref(), Some("POST"));
        assert_eq!(event.http_status, Some(503));
        assert_eq!(event.url.as_deref(), Some("/api"));
        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.user_name.as_deref(), Some("alice"));
        assert_eq!(event.pid, Some(77));
        assert_eq!(event.dest_port, Some(443));
    }

    #[test]
    fn test_numeric_level() {
        let event = JsonParser.parse(r#"{"severity":3,"msg":"x"}"#, now()).unwrap();
        assert_eq!(event.level, Severity::Error);
    }

    #[test]
    fn test_missing_message_and_time() {
        let raw = r#"{"tenant":"acme"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.message, raw);
        assert_eq!(event.level, Severity::Info);
        assert_eq!(event.timestamp, now());
        assert!(event.clock_unreliable());
    }

    #[test]
    fn test_uncoercible_value_kept_as_field() {
        let event = JsonParser.parse(r#"{"msg":"x","status":"teapot"}"#, now()).unwrap();
        assert_eq!(event.http_status, None);
        assert_eq!(event.field("status"), Some("teapot"));
    }

    #[test]
    fn test_preferred_synonym_wins_regardless_of_key_order() {
        let raw = r#"{"message":"disk full","description":"storage alert"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.message, "disk full");
        assert_eq!(event.field("description"), Some("storage alert"));

        let raw = r#"{"client_ip":"192.0.2.7","src_ip":"10.0.0.1","msg":"x"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.field("client_ip"), Some("192.0.2.7"));
    }

    #[test]
    fn test_timestamp_preferred_over_at_timestamp() {
        let raw = r#"{"@timestamp":"2025-01-01T00:00:00Z","timestamp":"2025-02-02T00:00:00Z","msg":"x"}"#;
        let event = JsonParser.parse(raw, now()).unwrap();
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap());
        assert_eq!(event.field("@timestamp"), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_invalid_json() {
        let result = JsonParser.parse("not-json{{{", now());
        assert!(matches!(result, Err(ParseError::ParseFailed(_))));
    }

    #[test]
    fn test_non_object_json() {
        let result = JsonParser.parse("[1,2,3]", now());
        assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
    }
}
