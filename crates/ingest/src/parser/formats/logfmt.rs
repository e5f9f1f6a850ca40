use chrono::{DateTime, Utc};

use crate::parser::model::TAG_CLOCK_UNRELIABLE;
use crate::parser::normalize::{
    normalize_severity, parse_timestamp, resolve_timestamp, severity_from_name,
};
use crate::parser::synonyms::{fill, rank_pairs, Slot, GENERIC_KEYS};
use crate::parser::traits::*;
use super::check_line_size;

/// Logfmt parser (`key=value key2="quoted value"`).
///
/// Also accepts the `tracing` fmt layout (`TIMESTAMP LEVEL target: message`)
/// that Rust services write by default.
pub struct LogfmtParser;

impl LogParser for LogfmtParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;
        let text = raw.trim();

        if let Some(event) = parse_tracing_format(text, raw, received_at) {
            return Ok(event);
        }

        let mut event = NormalizedEvent::new(received_at, Severity::Info, "", raw, LogFormat::Logfmt);
        let mut timestamp = None;
        let mut level = None;
        let mut message = None;

        let pairs: Vec<(String, String)> = parse_logfmt_iter(text).collect();
        if pairs.is_empty() {
            return Err(ParseError::ParseFailed("No valid key=value pairs found".to_string()));
        }

        let (candidates, unmapped) = rank_pairs(GENERIC_KEYS, pairs);
        event.fields.extend(unmapped);
        for (slot, key, value) in candidates {
            let handled = match slot {
                Slot::Timestamp => fill(&mut timestamp, || parse_timestamp(&value, received_at)),
                Slot::Level => fill(&mut level, || Some(normalize_severity(&value))),
                Slot::Message => fill(&mut message, || Some(value.clone())),
                slot => slot.assign(&mut event, &value),
            };
            if !handled {
                event.fields.push((key, value));
            }
        }

        event.level = level.unwrap_or(Severity::Info);
        event.message = message.unwrap_or_else(|| text.to_string());
        let (ts, reliable) = resolve_timestamp(timestamp, received_at);
        event.timestamp = ts;
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }
        Ok(event)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Logfmt
    }
}

fn parse_logfmt_iter(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    let mut chars = text.chars().peekable();

    std::iter::from_fn(move || loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        chars.peek()?;

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }

        if chars.peek() != Some(&'=') || key.is_empty() {
            // Bare word or stray '=': skip the token and keep scanning
            while chars.peek().is_some_and(|c| !c.is_whitespace()) {
                chars.next();
            }
            continue;
        }
        chars.next();

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    value.push(c);
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        return Some((key, value));
    })
}

/// `2026-01-30T03:18:50.827498Z  INFO cluster: Starting up`
fn parse_tracing_format(text: &str, raw: &str, received_at: DateTime<Utc>) -> Option<NormalizedEvent> {
    let mut parts = text.split_whitespace();

    let ts = parts.next()?;
    if !ts.contains('T') || !ts.contains(':') {
        return None;
    }
    let level = severity_from_name(parts.next()?)?;
    let target = parts.next()?.strip_suffix(':')?;
    let timestamp = parse_timestamp(ts, received_at)?;

    let message = parts.collect::<Vec<_>>().join(" ");
    let mut event = NormalizedEvent::new(timestamp, level, message, raw, LogFormat::Logfmt);
    if !target.is_empty() {
        event.service = Some(target.to_string());
    }
    Some(event)
}
