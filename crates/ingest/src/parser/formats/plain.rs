use chrono::{DateTime, Utc};

use crate::parser::model::{TAG_CLOCK_UNRELIABLE, TAG_UNPARSED};
use crate::parser::normalize::{find_timestamp, resolve_timestamp, sniff_level};
use crate::parser::traits::*;

/// Default message cap for the fallback parser, in characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1000;

/// Generic fallback for declared formats with no dedicated parser.
///
/// Recovers what it can from free text (first timestamp pattern that
/// matches, an upper-case level keyword) and tags the event `unparsed`.
/// Never fails.
pub struct PlainTextParser {
    max_message_len: usize,
}

impl PlainTextParser {
    pub fn new(max_message_len: usize) -> Self {
        Self { max_message_len }
    }

    /// Infallible form of [`LogParser::parse`] for callers holding the
    /// concrete fallback.
    pub fn parse_lenient(&self, raw: &str, received_at: DateTime<Utc>, format: LogFormat) -> NormalizedEvent {
        let text = raw.trim();
        let message = truncate_chars(text, self.max_message_len);
        let level = sniff_level(text).unwrap_or(Severity::Info);

        let (ts, reliable) = resolve_timestamp(find_timestamp(text, received_at), received_at);
        let mut event = NormalizedEvent::new(ts, level, message, raw, format);
        event.add_tag(TAG_UNPARSED);
        if !reliable {
            event.add_tag(TAG_CLOCK_UNRELIABLE);
        }
        event
    }
}

impl Default for PlainTextParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl LogParser for PlainTextParser {
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
        Ok(self.parse_lenient(raw, received_at, LogFormat::Other("plain".to_string())))
    }

    fn format(&self) -> LogFormat {
        LogFormat::Other("plain".to_string())
    }
}

/// Cut `text` to at most `max` characters, never splitting a code point.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
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
    fn test_plain_text_parser() {
        let parser = PlainTextParser::default();
        let event = parser
            .parse("2025-03-04 05:06:07 ERROR disk on fire", now())
            .unwrap();
        assert_eq!(event.level, Severity::Error);
        assert_eq!(event.message, "2025-03-04 05:06:07 ERROR disk on fire");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap());
        assert!(event.has_tag(TAG_UNPARSED));
        assert!(!event.clock_unreliable());
    }

    #[test]
    fn test_no_timestamp_uses_received_at() {
        let event = PlainTextParser::default()
            .parse_lenient("not-json{{{", now(), LogFormat::Other("custom".into()));
        assert_eq!(event.timestamp, now());
        assert_eq!(event.level, Severity::Info);
        assert_eq!(event.format, LogFormat::Other("custom".into()));
        assert!(event.clock_unreliable());
        assert!(event.has_tag(TAG_UNPARSED));
    }

    #[test]
    fn test_message_truncated_on_char_boundary() {
        let parser = PlainTextParser::new(3);
        let event = parser.parse("héllo wörld", now()).unwrap();
        assert_eq!(event.message, "hél");
        assert_eq!(event.raw, "héllo wörld");
    }

    #[test]
    fn test_oversized_line_still_succeeds() {
        let huge = "X".repeat(crate::parser::MAX_LINE_SIZE + 1);
        let event = PlainTextParser::default().parse(&huge, now()).unwrap();
        assert_eq!(event.message.len(), DEFAULT_MAX_MESSAGE_LEN);
    }
}
