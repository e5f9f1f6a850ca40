use chrono::{DateTime, Utc};

use crate::parser::model::TAG_CLOCK_UNRELIABLE;
use crate::parser::normalize::{resolve_timestamp, severity_from_name};
use crate::parser::synonyms::{fill, rank_pairs, Slot};
use crate::parser::traits::*;
use super::{check_line_size, parse_device_time};

/// Attribute dictionary (LEEF predefined key → canonical slot).
const LEEF_KEYS: &[(&str, Slot)] = &[
    ("src", Slot::SourceIp),
    ("srcPort", Slot::SourcePort),
    ("dst", Slot::DestIp),
    ("dstPort", Slot::DestPort),
    ("usrName", Slot::UserName),
    ("accountName", Slot::UserName),
    ("identHostName", Slot::Hostname),
    ("proto", Slot::Protocol),
    ("cat", Slot::Category),
    ("action", Slot::Action),
    ("act", Slot::Action),
    ("outcome", Slot::Outcome),
    ("url", Slot::Url),
    ("method", Slot::HttpMethod),
    ("userAgent", Slot::UserAgent),
    ("srcBytes", Slot::BytesOut),
    ("dstBytes", Slot::BytesIn),
    ("fileName", Slot::FilePath),
    ("fileHash", Slot::FileHash),
    ("devTime", Slot::Timestamp),
    ("sev", Slot::Level),
    ("msg", Slot::Message),
];

/// Parser for IBM Log Event Extended Format.
///
/// LEEF 1.0: `LEEF:1.0|Vendor|Product|Version|EventID|k=v<TAB>k=v`
/// LEEF 2.0 adds a delimiter field after the event id (a character or its
/// hex code, `^` / `0x5E` / `x5E`).
pub struct LeefParser;

impl LogParser for LeefParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;
        let text = raw.trim_end_matches(['\r', '\n']);

        let start = text
            .find("LEEF:")
            .ok_or_else(|| ParseError::InvalidFormat("Not LEEF format".into()))?;
        let body = &text[start + 5..];

        let is_v2 = body.starts_with('2');
        let header_len = if is_v2 { 6 } else { 5 };
        let parts: Vec<&str> = body.splitn(header_len + 1, '|').collect();
        if parts.len() < header_len {
            return Err(ParseError::InvalidFormat(format!(
                "LEEF header needs {} fields, found {}",
                header_len,
                parts.len()
            )));
        }

        let (version, vendor, product, device_version, event_id) =
            (parts[0], parts[1], parts[2], parts[3], parts[4]);
        let delimiter = if is_v2 {
            parse_delimiter(parts[5]).ok_or_else(|| {
                ParseError::ParseFailed(format!("Invalid LEEF delimiter: {}", parts[5]))
            })?
        } else {
            '\t'
        };
        let attributes = parts.get(header_len).copied().unwrap_or("");

        let mut event = NormalizedEvent::new(received_at, Severity::Info, "", raw, LogFormat::Leef);
        let service = format!("{} {}", vendor.trim(), product.trim());
        if !service.trim().is_empty() {
            event.service = Some(service.trim().to_string());
        }
        event.fields.push(("leef_version".to_string(), version.trim().to_string()));
        event.fields.push(("device_version".to_string(), device_version.to_string()));
        event.fields.push(("event_id".to_string(), event_id.to_string()));

        let mut timestamp = None;
        let mut level = None;
        let mut message = None;
        let (candidates, unmapped) = rank_pairs(LEEF_KEYS, split_attributes(attributes, delimiter));
        for (key, value) in unmapped {
            event.fields.push((key.to_string(), value.to_string()));
        }
        for (slot, key, value) in candidates {
            let handled = match slot {
                Slot::Timestamp => fill(&mut timestamp, || parse_device_time(value, received_at)),
                Slot::Level => fill(&mut level, || leef_severity(value)),
                Slot::Message => fill(&mut message, || Some(value.to_string())),
                slot => slot.assign(&mut event, value),
            };
            if !handled {
                event.fields.push((key.to_string(), value.to_string()));
            }
        }

        event.level = level.unwrap_or(Severity::Info);
        event.message = message.unwrap_or_else(|| event_id.to_string());

        let (ts, reliable) = resolve_timestamp(timestamp, received_at);
        event.timestamp = ts;
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }
        Ok(event)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Leef
    }
}

/// Decode the LEEF 2.0 delimiter field. Empty means tab.
fn parse_delimiter(field: &str) -> Option<char> {
    let field = field.trim_matches([' ', '\r', '\n']);
    if field.is_empty() {
        return Some('\t');
    }
    let hex = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .or_else(|| field.strip_prefix('x'))
        .or_else(|| field.strip_prefix('X'));
    match hex {
        Some(code) if !code.is_empty() => u32::from_str_radix(code, 16).ok().and_then(char::from_u32),
        _ => {
            let mut chars = field.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    }
}

fn split_attributes(attributes: &str, delimiter: char) -> impl Iterator<Item = (&str, &str)> {
    attributes
        .split(delimiter)
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
}

/// `sev` is 1-10 on the vendor scale; some devices send a level name.
fn leef_severity(value: &str) -> Option<Severity> {
    match value.trim().parse::<u8>() {
        Ok(score) => Some(Severity::from_vendor_scale(score.min(10))),
        Err(_) => severity_from_name(value),
    }
}
