//! Shared timestamp and severity normalization.
//!
//! Every parser funnels its time and level encodings through here so that the
//! canonical event always carries a UTC timestamp and one of the eight
//! standard severities, whatever the wire format looked like.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::model::Severity;

type TimestampFn = fn(&str, DateTime<Utc>) -> Option<DateTime<Utc>>;

/// One entry of the ordered timestamp pattern list.
struct TimestampPattern {
    regex: Regex,
    parse: TimestampFn,
}

/// Ordered list, first match wins.
static TIMESTAMP_PATTERNS: Lazy<Vec<TimestampPattern>> = Lazy::new(|| {
    vec![
        // 2025-01-01T00:00:00.123Z / 2025-01-01T00:00:00+02:00
        TimestampPattern {
            regex: Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
                .expect("iso8601 pattern"),
            parse: parse_iso8601,
        },
        // 2025-01-01 00:00:00,123 / 2025-01-01 14:00:00+02:00
        TimestampPattern {
            regex: Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z| ?[+-]\d{2}:?\d{2})?")
                .expect("date-time pattern"),
            parse: parse_space_separated,
        },
        // 01/Jan/2025:00:00:00 +0000
        TimestampPattern {
            regex: Regex::new(r"\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2}(?: [+-]\d{4})?")
                .expect("clf pattern"),
            parse: parse_clf,
        },
        // Jan  1 00:00:00
        TimestampPattern {
            regex: Regex::new(r"\b[A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2}\b")
                .expect("bsd pattern"),
            parse: parse_bsd,
        },
    ]
});

static LEVEL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(EMERGENCY|EMERG|ALERT|CRITICAL|CRIT|FATAL|PANIC|ERROR|ERR|WARNING|WARN|NOTICE|INFO|DEBUG|TRACE)\b")
        .expect("level keyword pattern")
});

fn parse_iso8601(s: &str, _reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if s.ends_with('Z') {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .ok()
}

/// UTC is assumed only when the value carries no zone.
fn parse_space_separated(s: &str, _reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = s.replace(',', ".");
    match split_zone(&s) {
        (stamp, Some(offset)) => {
            DateTime::parse_from_str(&format!("{}{}", stamp, offset), "%Y-%m-%d %H:%M:%S%.f%z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        (stamp, None) => NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc()),
    }
}

/// Split `YYYY-MM-DD HH:MM:SS[.f]` from a trailing `Z` or numeric offset.
fn split_zone(s: &str) -> (&str, Option<&str>) {
    if let Some(stamp) = s.strip_suffix('Z') {
        return (stamp, None);
    }
    // The sign of an offset can only appear after the seconds
    let offset_at = s
        .get(19..)
        .and_then(|tail| tail.find(['+', '-']))
        .map(|idx| idx + 19);
    match offset_at {
        Some(idx) => (s[..idx].trim_end(), Some(&s[idx..])),
        None => (s, None),
    }
}

fn parse_clf(s: &str, _reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if s.contains(' ') {
        DateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S %z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    } else {
        NaiveDateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// BSD syslog timestamps carry no year: take the reference year, rolling
/// back one year when that would put the event more than a day ahead.
fn parse_bsd(s: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{} {}", year, collapsed), "%Y %b %d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    };
    let candidate = with_year(reference.year())?;
    if candidate > reference + Duration::days(1) {
        return with_year(reference.year() - 1);
    }
    Some(candidate)
}

/// Scan `text` with the ordered pattern list and return the first
/// timestamp that both matches and parses.
pub fn find_timestamp(text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TIMESTAMP_PATTERNS.iter().find_map(|pattern| {
        pattern
            .regex
            .find(text)
            .and_then(|m| (pattern.parse)(m.as_str(), reference))
    })
}

/// Parse a dedicated timestamp value: epoch seconds/millis or any of the
/// textual patterns.
pub fn parse_timestamp(value: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<i64>().ok().and_then(from_epoch);
    }
    if let Ok(secs) = value.parse::<f64>() {
        return from_epoch_f64(secs);
    }
    find_timestamp(value, reference)
}

/// Epoch seconds, or milliseconds when the value is too large to be seconds.
pub fn from_epoch(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }
}

pub fn from_epoch_f64(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    if secs > 1_000_000_000_000.0 {
        return DateTime::from_timestamp_millis(secs as i64);
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole, nanos)
}

/// Returns the timestamp to store and whether it came from the text.
/// When nothing was recovered the ingestion time is used and the caller must
/// tag the event `clock_unreliable`.
pub fn resolve_timestamp(found: Option<DateTime<Utc>>, received_at: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    match found {
        Some(ts) => (ts, true),
        None => (received_at, false),
    }
}

/// Resolve a textual level name (case-insensitive, common abbreviations).
pub fn severity_from_name(name: &str) -> Option<Severity> {
    let lower = name.trim().to_ascii_lowercase();
    let severity = match lower.as_str() {
        "emerg" | "emergency" | "panic" => Severity::Emergency,
        "alert" => Severity::Alert,
        "crit" | "critical" | "fatal" => Severity::Critical,
        "err" | "error" | "severe" => Severity::Error,
        "warn" | "warning" => Severity::Warning,
        "notice" => Severity::Notice,
        "info" | "inf" | "information" | "informational" => Severity::Info,
        "debug" | "dbg" | "trace" | "verbose" => Severity::Debug,
        _ => return None,
    };
    Some(severity)
}

/// Numbers 0-7 are syslog severities, 8-10 the vendor scale.
pub fn severity_from_number(n: u64) -> Severity {
    match n {
        0..=7 => Severity::from_syslog(n as u8).unwrap_or(Severity::Info),
        8..=10 => Severity::from_vendor_scale(n as u8),
        _ => Severity::Info,
    }
}

/// Normalize any level encoding. Never fails; unrecognized text is `Info`.
pub fn normalize_severity(value: &str) -> Severity {
    let value = value.trim();
    if let Ok(n) = value.parse::<u64>() {
        return severity_from_number(n);
    }
    severity_from_name(value).unwrap_or(Severity::Info)
}

/// Find an upper-case level keyword in free text.
pub fn sniff_level(text: &str) -> Option<Severity> {
    LEVEL_KEYWORD
        .find(text)
        .and_then(|m| severity_from_name(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_iso8601_with_fraction_and_zulu() {
        let ts = find_timestamp("at 2025-01-01T10:20:30.250Z something", reference()).unwrap();
        assert_eq!(ts.timestamp_millis(), Utc.with_ymd_and_hms(2025, 1, 1, 10, 20, 30).unwrap().timestamp_millis() + 250);
    }

    #[test]
    fn test_iso8601_with_offset() {
        let ts = find_timestamp("2025-01-01T10:00:00+02:00", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap());
        let compact = find_timestamp("2025-01-01T10:00:00-0100", reference()).unwrap();
        assert_eq!(compact, Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_iso8601_without_zone_is_utc() {
        let ts = find_timestamp("2025-03-04T05:06:07", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap());
    }

    #[test]
    fn test_space_separated_with_comma_fraction() {
        let ts = find_timestamp("2025-03-04 05:06:07,500 ERROR boom", reference()).unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 500);
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap().timestamp());
    }

    #[test]
    fn test_space_separated_with_zone() {
        let offset = find_timestamp("2025-03-01 14:00:00+02:00", reference()).unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let spaced = find_timestamp("2025-03-01 14:00:00.250 -0130 worker up", reference()).unwrap();
        assert_eq!(spaced.timestamp(), Utc.with_ymd_and_hms(2025, 3, 1, 15, 30, 0).unwrap().timestamp());
        assert_eq!(spaced.timestamp_subsec_millis(), 250);
        let zulu = find_timestamp("2025-03-01 14:00:00Z", reference()).unwrap();
        assert_eq!(zulu, Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_clf_with_offset() {
        let ts = find_timestamp("[10/Oct/2000:13:55:36 -0700]", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2000, 10, 10, 20, 55, 36).unwrap());
    }

    #[test]
    fn test_bsd_uses_reference_year() {
        let ts = find_timestamp("Jan  5 01:02:03 host sshd", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 5, 1, 2, 3).unwrap());
    }

    #[test]
    fn test_bsd_rolls_back_future_dates() {
        let ts = find_timestamp("Dec 31 23:59:59", reference()).unwrap();
        assert_eq!(ts.year(), 2024);
    }

    #[test]
    fn test_first_pattern_wins() {
        let text = "Jan  5 01:02:03 2025-02-02T00:00:00Z";
        let ts = find_timestamp(text, reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_no_timestamp() {
        assert!(find_timestamp("nothing to see", reference()).is_none());
        let (ts, reliable) = resolve_timestamp(None, reference());
        assert_eq!(ts, reference());
        assert!(!reliable);
    }

    #[test]
    fn test_parse_timestamp_epoch() {
        let secs = parse_timestamp("1700000000", reference()).unwrap();
        let millis = parse_timestamp("1700000000123", reference()).unwrap();
        assert_eq!(secs.timestamp(), 1_700_000_000);
        assert_eq!(millis.timestamp_millis(), 1_700_000_000_123);
        let fractional = parse_timestamp("1700000000.5", reference()).unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(normalize_severity("WARN"), Severity::Warning);
        assert_eq!(normalize_severity("err"), Severity::Error);
        assert_eq!(normalize_severity("Informational"), Severity::Info);
        assert_eq!(normalize_severity("FATAL"), Severity::Critical);
        assert_eq!(normalize_severity("trace"), Severity::Debug);
        assert_eq!(normalize_severity("banana"), Severity::Info);
    }

    #[test]
    fn test_severity_numbers() {
        assert_eq!(normalize_severity("3"), Severity::Error);
        assert_eq!(normalize_severity("7"), Severity::Debug);
        assert_eq!(normalize_severity("9"), Severity::Emergency);
        assert_eq!(normalize_severity("42"), Severity::Info);
    }

    #[test]
    fn test_sniff_level() {
        assert_eq!(sniff_level("2025-01-01 ERROR disk full"), Some(Severity::Error));
        assert_eq!(sniff_level("[WARN] slow query"), Some(Severity::Warning));
        assert_eq!(sniff_level("an error in lower case"), None);
    }
}
