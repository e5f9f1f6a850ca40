/// Individual log format parsers

pub mod cef;
pub mod http_log;
pub mod json;
pub mod leef;
pub mod logfmt;
pub mod plain;
pub mod syslog;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::parser::normalize::parse_timestamp;
use crate::parser::traits::ParseError;
use crate::parser::MAX_LINE_SIZE;

// Re-export parser implementations
pub use cef::CefParser;
pub use http_log::HttpLogParser;
pub use json::JsonParser;
pub use leef::LeefParser;
pub use logfmt::LogfmtParser;
pub use plain::PlainTextParser;
pub use syslog::SyslogParser;

/// Reject lines larger than [`MAX_LINE_SIZE`].
pub(crate) fn check_line_size(raw: &str) -> Result<(), ParseError> {
    if raw.len() > MAX_LINE_SIZE {
        return Err(ParseError::LineTooLarge(raw.len(), MAX_LINE_SIZE));
    }
    Ok(())
}

/// Vendor device time: epoch (s/ms), any shared pattern, or the
/// `Mmm dd yyyy HH:mm:ss[.SSS]` form CEF and LEEF devices commonly emit.
pub(crate) fn parse_device_time(value: &str, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_timestamp(value, received_at).or_else(|| {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, "%b %d %Y %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%b %d %Y %H:%M:%S"))
            .ok()
            .map(|naive| naive.and_utc())
    })
}
