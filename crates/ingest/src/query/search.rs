use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::parser::normalize::{severity_from_name, severity_from_number};
use crate::parser::NormalizedEvent;
use crate::store::EventStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown search field: {0}")]
    UnknownField(String),
}

/// Exact-match test of one canonical field against a predicate value.
pub type FieldMatcher = fn(&NormalizedEvent, &str) -> bool;

/// Prefix addressing unmapped keys kept in `fields` (`labels.tenant`).
pub const LABEL_PREFIX: &str = "labels.";

/// Predicate key → typed field matcher.
pub const FIELD_ACCESSORS: &[(&str, FieldMatcher)] = &[
    ("level", |e: &NormalizedEvent, v: &str| severity_query(v) == Some(e.level)),
    ("message", |e: &NormalizedEvent, v: &str| e.message == v),
    ("format", |e: &NormalizedEvent, v: &str| e.format.as_str() == v),
    ("tag", |e: &NormalizedEvent, v: &str| e.has_tag(v)),
    ("source_ip", |e: &NormalizedEvent, v: &str| text(&e.source_ip, v)),
    ("source_port", |e: &NormalizedEvent, v: &str| number(e.source_port, v)),
    ("hostname", |e: &NormalizedEvent, v: &str| text(&e.hostname, v)),
    ("service", |e: &NormalizedEvent, v: &str| text(&e.service, v)),
    ("dest_ip", |e: &NormalizedEvent, v: &str| text(&e.dest_ip, v)),
    ("dest_port", |e: &NormalizedEvent, v: &str| number(e.dest_port, v)),
    ("category", |e: &NormalizedEvent, v: &str| text(&e.category, v)),
    ("action", |e: &NormalizedEvent, v: &str| text(&e.action, v)),
    ("outcome", |e: &NormalizedEvent, v: &str| text(&e.outcome, v)),
    ("user_id", |e: &NormalizedEvent, v: &str| text(&e.user_id, v)),
    ("user_name", |e: &NormalizedEvent, v: &str| text(&e.user_name, v)),
    ("protocol", |e: &NormalizedEvent, v: &str| text(&e.protocol, v)),
    ("bytes_in", |e: &NormalizedEvent, v: &str| number(e.bytes_in, v)),
    ("bytes_out", |e: &NormalizedEvent, v: &str| number(e.bytes_out, v)),
    ("http_method", |e: &NormalizedEvent, v: &str| text(&e.http_method, v)),
    ("http_status", |e: &NormalizedEvent, v: &str| number(e.http_status, v)),
    ("url", |e: &NormalizedEvent, v: &str| text(&e.url, v)),
    ("user_agent", |e: &NormalizedEvent, v: &str| text(&e.user_agent, v)),
    ("file_path", |e: &NormalizedEvent, v: &str| text(&e.file_path, v)),
    ("file_hash", |e: &NormalizedEvent, v: &str| text(&e.file_hash, v)),
    ("process_name", |e: &NormalizedEvent, v: &str| text(&e.process_name, v)),
    ("pid", |e: &NormalizedEvent, v: &str| number(e.pid, v)),
    ("facility", |e: &NormalizedEvent, v: &str| text(&e.facility, v)),
];

fn text(field: &Option<String>, value: &str) -> bool {
    field.as_deref() == Some(value)
}

fn number<T: FromStr + PartialEq>(field: Option<T>, value: &str) -> bool {
    match (field, value.trim().parse::<T>()) {
        (Some(actual), Ok(wanted)) => actual == wanted,
        _ => false,
    }
}

fn severity_query(value: &str) -> Option<crate::parser::Severity> {
    match value.trim().parse::<u64>() {
        Ok(n) => Some(severity_from_number(n)),
        Err(_) => severity_from_name(value),
    }
}

enum Predicate<'a> {
    Field(FieldMatcher, &'a str),
    Label(&'a str, &'a str),
}

impl Predicate<'_> {
    fn matches(&self, event: &NormalizedEvent) -> bool {
        match self {
            Predicate::Field(matcher, value) => matcher(event, *value),
            Predicate::Label(key, value) => event.field(key) == Some(*value),
        }
    }
}

fn compile(predicates: &HashMap<String, String>) -> Result<Vec<Predicate<'_>>, QueryError> {
    predicates
        .iter()
        .map(|(key, value)| {
            if let Some(label) = key.strip_prefix(LABEL_PREFIX) {
                return Ok(Predicate::Label(label, value.as_str()));
            }
            FIELD_ACCESSORS
                .iter()
                .find(|(name, _)| *name == key.as_str())
                .map(|(_, matcher)| Predicate::Field(*matcher, value.as_str()))
                .ok_or_else(|| QueryError::UnknownField(key.clone()))
        })
        .collect()
}

/// Events matching every predicate, most recent first.
///
/// Only the newest `window` stored events are scanned. An empty predicate
/// map matches everything.
pub fn search(
    store: &EventStore,
    predicates: &HashMap<String, String>,
    window: usize,
    limit: usize,
) -> Result<Vec<Arc<NormalizedEvent>>, QueryError> {
    let compiled = compile(predicates)?;
    if limit == 0 {
        return Ok(Vec::new());
    }
    Ok(store.scan_recent(window, limit, |event| {
        compiled.iter().all(|predicate| predicate.matches(event))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{LogFormat, Severity};
    use chrono::Utc;

    fn store() -> EventStore {
        let store = EventStore::new(100);
        for (i, (ip, status)) in [("10.0.0.1", 200), ("10.0.0.2", 404), ("10.0.0.1", 404)]
            .into_iter()
            .enumerate()
        {
            let mut event = NormalizedEvent::new(
                Utc::now(),
                if status >= 400 { Severity::Warning } else { Severity::Info },
                format!("req {}", i),
                "raw",
                LogFormat::HttpLog,
            );
            event.source_ip = Some(ip.to_string());
            event.http_status = Some(status);
            event.fields.push(("tenant".to_string(), format!("t{}", i)));
            store.push(Arc::new(event));
        }
        store
    }

    fn predicates(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_conjunction_most_recent_first() {
        let store = store();
        let hits = search(&store, &predicates(&[("source_ip", "10.0.0.1")]), 100, 10).unwrap();
        let messages: Vec<_> = hits.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["req 2", "req 0"]);

        let hits = search(
            &store,
            &predicates(&[("source_ip", "10.0.0.1"), ("http_status", "404")]),
            100,
            10,
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "req 2");
    }

    #[test]
    fn test_level_and_label_predicates() {
        let store = store();
        let hits = search(&store, &predicates(&[("level", "WARN")]), 100, 10).unwrap();
        assert_eq!(hits.len(), 2);
        let hits = search(&store, &predicates(&[("labels.tenant", "t1")]), 100, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "req 1");
    }

    #[test]
    fn test_limit_and_window() {
        let store = store();
        assert_eq!(search(&store, &HashMap::new(), 100, 2).unwrap().len(), 2);
        assert_eq!(search(&store, &HashMap::new(), 1, 10).unwrap().len(), 1);
        assert!(search(&store, &HashMap::new(), 100, 0).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let store = store();
        let err = search(&store, &predicates(&[("colour", "red")]), 100, 10).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("colour".into()));
    }

    #[test]
    fn test_numeric_predicate_needs_number() {
        let store = store();
        let hits = search(&store, &predicates(&[("http_status", "four")]), 100, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_accessor_keys_unique() {
        let mut names: Vec<_> = FIELD_ACCESSORS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FIELD_ACCESSORS.len());
    }
}
