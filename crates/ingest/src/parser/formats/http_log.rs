use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::TAG_CLOCK_UNRELIABLE;
use crate::parser::normalize::{find_timestamp, resolve_timestamp};
use crate::parser::synonyms::Slot;
use crate::parser::traits::*;
use super::check_line_size;

// host ident authuser [date] "request" status bytes ["referrer" "user-agent"]
static ACCESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<client>\S+) (?P<ident>\S+) (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<request>(?:[^"\\]|\\.)*)" (?P<status>\d{3}) (?P<bytes>\d+|-)(?: "(?P<referrer>(?:[^"\\]|\\.)*)" "(?P<agent>(?:[^"\\]|\\.)*)")?"#,
    )
    .expect("access log pattern")
});

/// HTTP access log parser (Apache/Nginx)
///
/// Handles Common Log Format (CLF) and Combined Log Format: client ip,
/// ident and auth user, timestamp, request line, status, response size and
/// optionally referrer and user-agent.
pub struct HttpLogParser;

impl LogParser for HttpLogParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        check_line_size(raw)?;
        let text = raw.trim();

        // Example: 127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326
        let caps = ACCESS_LINE.captures(text).ok_or_else(|| {
            ParseError::ParseFailed("Line does not match common/combined access log format".into())
        })?;

        let status: u16 = caps["status"]
            .parse()
            .map_err(|_| ParseError::ParseFailed(format!("Invalid status: {}", &caps["status"])))?;
        let request = &caps["request"];

        let mut event = NormalizedEvent::new(
            received_at,
            status_severity(status),
            request,
            raw,
            LogFormat::HttpLog,
        );
        event.category = Some("web".to_string());
        event.http_status = Some(status);
        event.outcome = Some(if status < 400 { "success" } else { "failure" }.to_string());
        Slot::SourceIp.assign(&mut event, &caps["client"]);
        Slot::UserName.assign(&mut event, &caps["user"]);
        Slot::BytesOut.assign(&mut event, &caps["bytes"]);

        // Request line: "METHOD /path PROTO"; a bare "-" carries nothing.
        let mut parts = request.split_whitespace();
        if let (Some(method), Some(url)) = (parts.next(), parts.next()) {
            event.http_method = Some(method.to_string());
            event.action = Some(method.to_string());
            event.url = Some(url.to_string());
            if let Some(protocol) = parts.next() {
                event.protocol = Some(protocol.to_string());
            }
        }

        if let Some(agent) = caps.name("agent") {
            Slot::UserAgent.assign(&mut event, agent.as_str());
        }
        if let Some(referrer) = caps.name("referrer").map(|m| m.as_str()) {
            if !referrer.is_empty() && referrer != "-" {
                event.fields.push(("referrer".to_string(), referrer.to_string()));
            }
        }
        let ident = &caps["ident"];
        if ident != "-" {
            event.fields.push(("ident".to_string(), ident.to_string()));
        }

        let (ts, reliable) = resolve_timestamp(find_timestamp(&caps["time"], received_at), received_at);
        event.timestamp = ts;
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }
        Ok(event)
    }

    fn format(&self) -> LogFormat {
        LogFormat::HttpLog
    }
}

fn status_severity(status: u16) -> Severity {
    if status >= 500 {
        Severity::Error
    } else if status >= 400 {
        Severity::Warning
    } else {
        Severity::Info
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
    fn test_parse_common_log_format() {
        let raw = r#"10.0.0.5 - - [01/Jan/2025:00:00:00 +0000] "GET /x HTTP/1.1" 404 512"#;
        let event = HttpLogParser.parse(raw, now()).unwrap();
        assert_eq!(event.level, Severity::Warning);
        assert_eq!(event.http_status, Some(404));
        assert_eq!(event.http_method.as_deref(), Some("GET"));
        assert_eq!(event.url.as_deref(), Some("/x"));
        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(event.bytes_out, Some(512));
        assert_eq!(event.outcome.as_deref(), Some("failure"));
        assert_eq!(event.category.as_deref(), Some("web"));
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(event.user_name, None);
    }

    #[test]
    fn test_parse_combined_log_format() {
        let raw = r#"192.168.1.1 - frank [10/Oct/2000:13:55:36 -0700] "POST /login HTTP/1.1" 200 2326 "http://example.com/" "Mozilla/5.0 (X11)""#;
        let event = HttpLogParser.parse(raw, now()).unwrap();
        assert_eq!(event.level, Severity::Info);
        assert_eq!(event.user_name.as_deref(), Some("frank"));
        assert_eq!(event.user_agent.as_deref(), Some("Mozilla/5.0 (X11)"));
        assert_eq!(event.field("referrer"), Some("http://example.com/"));
        assert_eq!(event.protocol.as_deref(), Some("HTTP/1.1"));
        assert_eq!(event.outcome.as_deref(), Some("success"));
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2000, 10, 10, 20, 55, 36).unwrap());
    }

    #[test]
    fn test_server_error_status() {
        let raw = r#"10.0.0.1 - - [01/Jan/2025:00:00:00 +0000] "GET /api HTTP/1.1" 503 -"#;
        let event = HttpLogParser.parse(raw, now()).unwrap();
        assert_eq!(event.level, Severity::Error);
        assert_eq!(event.bytes_out, None);
    }

    #[test]
    fn test_malformed_request_line() {
        let raw = r#"10.0.0.1 - - [01/Jan/2025:00:00:00 +0000] "-" 400 0"#;
        let event = HttpLogParser.parse(raw, now()).unwrap();
        assert_eq!(event.http_method, None);
        assert_eq!(event.http_status, Some(400));
    }

    #[test]
    fn test_rejects_non_access_line() {
        let result = HttpLogParser.parse("10.0.0.1 GET /index.html 200", now());
        assert!(matches!(result, Err(ParseError::ParseFailed(_))));
    }
}
