use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::TAG_CLOCK_UNRELIABLE;
use crate::parser::normalize::{resolve_timestamp, severity_from_name};
use crate::parser::synonyms::{fill, rank_pairs, Slot};
use crate::parser::traits::*;
use super::{check_line_size, parse_device_time};

/// Header fields after `CEF:` (version .. severity).
const HEADER_FIELDS: usize = 7;

/// Extension dictionary (ArcSight key → canonical slot). Source-side keys
/// come first; a destination key whose slot is taken stays in `fields`.
const CEF_KEYS: &[(&str, Slot)] = &[
    ("src", Slot::SourceIp),
    ("spt", Slot::SourcePort),
    ("dst", Slot::DestIp),
    ("dpt", Slot::DestPort),
    ("suser", Slot::UserName),
    ("suid", Slot::UserId),
    ("duser", Slot::UserName),
    ("duid", Slot::UserId),
    ("shost", Slot::Hostname),
    ("dvchost", Slot::Hostname),
    ("proto", Slot::Protocol),
    ("act", Slot::Action),
    ("outcome", Slot::Outcome),
    ("cat", Slot::Category),
    ("request", Slot::Url),
    ("requestMethod", Slot::HttpMethod),
    ("requestClientApplication", Slot::UserAgent),
    ("fname", Slot::FilePath),
    ("filePath", Slot::FilePath),
    ("fileHash", Slot::FileHash),
    ("sproc", Slot::ProcessName),
    ("spid", Slot::Pid),
    ("dproc", Slot::ProcessName),
    ("dpid", Slot::Pid),
    ("in", Slot::BytesIn),
    ("out", Slot::BytesOut),
    ("msg", Slot::Message),
    ("rt", Slot::Timestamp),
    ("end", Slot::Timestamp),
    ("start", Slot::Timestamp),
];

// A key starts the string or follows a space and is directly followed by '='.
static EXTENSION_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)([A-Za-z0-9_.\-\[\]]+)=").expect("cef extension key pattern")
});

/// Parser for ArcSight Common Event Format.
///
/// `CEF:Version|Vendor|Product|Version|SignatureID|Name|Severity|Extension`,
/// optionally preceded by a syslog header.
pub struct CefParser;

impl LogParser for CefParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;
        let text = raw.trim();

        let start = text
            .find("CEF:")
            .ok_or_else(|| ParseError::InvalidFormat("Not CEF format".into()))?;

        let (header, extension) = split_header(&text[start + 4..], HEADER_FIELDS)
            .ok_or_else(|| ParseError::InvalidFormat("Invalid CEF header".into()))?;

        let [version, vendor, product, device_version, signature_id, name, severity] =
            <[String; HEADER_FIELDS]>::try_from(header)
                .map_err(|_| ParseError::InvalidFormat("Invalid CEF header".into()))?;

        let mut event = NormalizedEvent::new(
            received_at,
            cef_severity(&severity),
            "",
            raw,
            LogFormat::Cef,
        );
        let service = format!("{} {}", vendor, product);
        if !service.trim().is_empty() {
            event.service = Some(service.trim().to_string());
        }
        event.fields.push(("cef_version".to_string(), version));
        event.fields.push(("device_version".to_string(), device_version));
        event.fields.push(("signature_id".to_string(), signature_id));
        event.fields.push(("cef_severity".to_string(), severity));

        let mut timestamp = None;
        let mut message = None;
        let (candidates, unmapped) = rank_pairs(CEF_KEYS, parse_extension(extension));
        event.fields.extend(unmapped);
        for (slot, key, value) in candidates {
            let handled = match slot {
                Slot::Timestamp => fill(&mut timestamp, || parse_device_time(&value, received_at)),
                Slot::Message => fill(&mut message, || Some(value.clone())),
                slot => slot.assign(&mut event, &value),
            };
            if !handled {
                event.fields.push((key, value));
            }
        }

        match message {
            Some(msg) => {
                event.message = msg;
                event.fields.push(("name".to_string(), name));
            }
            None => event.message = name,
        }

        let (ts, reliable) = resolve_timestamp(timestamp, received_at);
        event.timestamp = ts;
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }
        Ok(event)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Cef
    }
}

/// Split `count` pipe-delimited header fields (honouring `\|` and `\\`)
/// and return them with the remaining extension text.
///
/// A header whose last field is not followed by a pipe is accepted with an
/// empty extension.
fn split_header(body: &str, count: usize) -> Option<(Vec<String>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut current = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, next @ ('|' | '\\'))) => current.push(next),
                Some((_, other)) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '|' => {
                fields.push(std::mem::take(&mut current));
                if fields.len() == count {
                    return Some((fields, &body[i + 1..]));
                }
            }
            _ => current.push(c),
        }
    }

    if fields.len() == count - 1 && !current.is_empty() {
        fields.push(current);
        return Some((fields, ""));
    }
    None
}

/// Split the extension into key/value pairs. Values run until the next key
/// and may contain spaces; `\=`, `\\`, `\n` and `\r` are unescaped.
fn parse_extension(extension: &str) -> Vec<(String, String)> {
    let keys: Vec<_> = EXTENSION_KEY.captures_iter(extension).collect();
    let mut pairs = Vec::with_capacity(keys.len());

    for (idx, caps) in keys.iter().enumerate() {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value_start = whole.end();
        let value_end = keys
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(extension.len());
        let value = unescape_value(extension[value_start..value_end].trim());
        pairs.push((key.as_str().to_string(), value));
    }
    pairs
}

fn unescape_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Header severity: 0-10 integer or one of the textual CEF levels.
fn cef_severity(value: &str) -> Severity {
    let value = value.trim();
    if let Ok(score) = value.parse::<u8>() {
        return Severity::from_vendor_scale(score.min(10));
    }
    let score = match value.to_ascii_lowercase().as_str() {
        "low" => 3,
        "medium" => 6,
        "high" => 8,
        "very-high" | "very high" | "veryhigh" => 10,
        other => return severity_from_name(other).unwrap_or(Severity::Info),
    };
    Severity::from_vendor_scale(score)
}
