use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::parser::normalize::{parse_timestamp, resolve_timestamp};
use crate::parser::traits::{LogFormat, LogParser, NormalizedEvent, ParseError, Severity};
use crate::parser::model::{TAG_AUTHENTICATION, TAG_CLOCK_UNRELIABLE};
use super::check_line_size;

/// Syslog facility names (RFC 5424 §6.2.1)
const SYSLOG_FACILITIES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news",
    "uucp", "cron", "authpriv", "ftp", "ntp", "audit", "alert", "clock",
    "local0", "local1", "local2", "local3", "local4", "local5", "local6", "local7",
];

/// Highest valid priority: facility 23, severity 7.
const MAX_PRIORITY: u32 = 191;

// <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID [SD] MSG
static RFC5424: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^1 (?P<ts>\S+) (?P<host>\S+) (?P<app>\S+) (?P<procid>\S+) (?P<msgid>\S+)(?: (?P<rest>.*))?$")
        .expect("rfc5424 pattern")
});

// <PRI>Mmm dd hh:mm:ss HOSTNAME TAG[PID]: MSG
static RFC3164: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<ts>[A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2}|\d{4}-\d{2}-\d{2}T\S+) )?(?P<host>[^\s:]+) (?:(?P<tag>[^:\[\s]+)(?:\[(?P<pid>\d+)\])?: ?)?(?P<msg>.*)$",
    )
    .expect("rfc3164 pattern")
});

static SD_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s=\]]+)="((?:[^"\\]|\\.)*)""#).expect("structured data param pattern")
});

/// Authentication sub-pattern run over the message body.
struct AuthPattern {
    regex: Regex,
    action: &'static str,
    outcome: &'static str,
}

static AUTH_PATTERNS: Lazy<Vec<AuthPattern>> = Lazy::new(|| {
    let build = |pattern: &str, action, outcome| AuthPattern {
        regex: Regex::new(pattern).expect("auth pattern"),
        action,
        outcome,
    };
    vec![
        build(
            r"Failed (?:password|publickey|keyboard-interactive/pam|none) for (?:invalid user )?(?P<user>\S+) from (?P<ip>[0-9A-Fa-f:.]+)(?: port (?P<port>\d+))?",
            "ssh_login",
            "failure",
        ),
        build(
            r"Accepted (?:password|publickey|keyboard-interactive/pam) for (?P<user>\S+) from (?P<ip>[0-9A-Fa-f:.]+)(?: port (?P<port>\d+))?",
            "ssh_login",
            "success",
        ),
        build(
            r"Invalid user (?P<user>\S*) from (?P<ip>[0-9A-Fa-f:.]+)(?: port (?P<port>\d+))?",
            "ssh_login",
            "failure",
        ),
        build(
            r"authentication failure;.*?rhost=(?P<ip>[0-9A-Fa-f:.]*)(?:\s+user=(?P<user>\S+))?",
            "pam_auth",
            "failure",
        ),
        build(
            r"session opened for user (?P<user>[^\s(]+)",
            "session_open",
            "success",
        ),
    ]
});

/// Parser for syslog messages (RFC 3164 and RFC 5424).
///
/// Decodes the priority into facility and severity, extracts host, app-name
/// and message, then classifies authentication events found in the body.
pub struct SyslogParser;

/// Decode a priority value into (facility, severity).
pub fn decode_priority(pri: u32) -> Option<(u8, Severity)> {
    if pri > MAX_PRIORITY {
        return None;
    }
    let facility = (pri / 8) as u8;
    let severity = Severity::from_syslog((pri % 8) as u8)?;
    Some((facility, severity))
}

pub fn facility_name(facility: u8) -> Option<&'static str> {
    SYSLOG_FACILITIES.get(facility as usize).copied()
}

impl LogParser for SyslogParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;
        let text = raw.trim();

        if !text.starts_with('<') {
            return Err(ParseError::InvalidFormat("Missing syslog priority".into()));
        }

        let pri_end = text
            .char_indices()
            .take(5)
            .find(|(_, c)| *c == '>')
            .map(|(i, _)| i)
            .ok_or_else(|| ParseError::InvalidFormat("Unterminated priority".into()))?;

        let pri_val: u32 = text[1..pri_end]
            .parse()
            .map_err(|_| ParseError::InvalidFormat("Invalid priority value".into()))?;

        let (facility, severity) = decode_priority(pri_val)
            .ok_or_else(|| ParseError::InvalidFormat(format!("Priority {} out of range", pri_val)))?;

        let remainder = &text[pri_end + 1..];

        let mut event = NormalizedEvent::new(received_at, severity, "", raw, LogFormat::Syslog);
        event.facility = facility_name(facility).map(str::to_string);
        event.fields.push(("priority".to_string(), pri_val.to_string()));

        let ts = if let Some(caps) = RFC5424.captures(remainder) {
            parse_rfc5424(&caps, &mut event)
        } else if let Some(caps) = RFC3164.captures(remainder) {
            parse_rfc3164(&caps, &mut event)
        } else {
            return Err(ParseError::InvalidFormat("Unrecognized syslog header".into()));
        };

        let (timestamp, reliable) =
            resolve_timestamp(ts.and_then(|s| parse_timestamp(&s, received_at)), received_at);
        event.timestamp = timestamp;
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }

        classify_authentication(&mut event);
        Ok(event)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Syslog
    }
}

fn nil_value(s: &str) -> Option<String> {
    (s != "-").then(|| s.to_string())
}

/// Fill the event from an RFC 5424 header. Returns the raw timestamp text.
fn parse_rfc5424(caps: &Captures<'_>, event: &mut NormalizedEvent) -> Option<String> {
    event.hostname = nil_value(&caps["host"]);
    event.service = nil_value(&caps["app"]);
    event.pid = caps["procid"].parse().ok();
    if let Some(msgid) = nil_value(&caps["msgid"]) {
        event.fields.push(("msgid".to_string(), msgid));
    }

    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
    let (sd, msg) = split_structured_data(rest);
    for param in SD_PARAM.captures_iter(sd) {
        event.fields.push((param[1].to_string(), param[2].replace("\\\"", "\"")));
    }
    event.message = msg.trim_start_matches('\u{feff}').to_string();

    nil_value(&caps["ts"])
}

fn parse_rfc3164(caps: &Captures<'_>, event: &mut NormalizedEvent) -> Option<String> {
    event.hostname = Some(caps["host"].to_string());
    event.service = caps.name("tag").map(|m| m.as_str().to_string());
    event.pid = caps.name("pid").and_then(|m| m.as_str().parse().ok());
    event.message = caps["msg"].to_string();
    caps.name("ts").map(|m| m.as_str().to_string())
}

/// Split `[id k="v"][id2 ...] msg` (or `- msg`) into the SD block and message.
fn split_structured_data(rest: &str) -> (&str, &str) {
    if let Some(msg) = rest.strip_prefix('-') {
        return ("", msg.trim_start());
    }
    if !rest.starts_with('[') {
        return ("", rest);
    }

    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => {
                depth = depth.saturating_sub(1);
                let next = rest[i + 1..].chars().next();
                if depth == 0 && next != Some('[') {
                    return (&rest[..=i], rest[i + 1..].trim_start());
                }
            }
            _ => {}
        }
    }
    // Unterminated SD: treat everything as message
    ("", rest)
}

fn classify_authentication(event: &mut NormalizedEvent) {
    let Some((pattern, caps)) = AUTH_PATTERNS
        .iter()
        .find_map(|p| p.regex.captures(&event.message).map(|c| (p, c)))
    else {
        return;
    };

    let user = caps.name("user").map(|m| m.as_str().to_string()).filter(|u| !u.is_empty());
    let ip = caps.name("ip").map(|m| m.as_str().to_string()).filter(|ip| !ip.is_empty());
    let port = caps.name("port").and_then(|m| m.as_str().parse().ok());

    event.user_name = user;
    event.source_ip = ip;
    event.source_port = port;
    event.category = Some(TAG_AUTHENTICATION.to_string());
    event.action = Some(pattern.action.to_string());
    event.outcome = Some(pattern.outcome.to_string());
    event.add_tag(TAG_AUTHENTICATION);
}
