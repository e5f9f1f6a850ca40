use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::ansi::strip_ansi_codes;
use super::formats::plain::DEFAULT_MAX_MESSAGE_LEN;
use super::formats::{
    CefParser, HttpLogParser, JsonParser, LeefParser, LogfmtParser, PlainTextParser, SyslogParser,
};
use super::traits::*;

/// How a line was handled.
#[derive(Debug)]
pub enum Dispatch {
    /// The declared format's dedicated parser produced the event
    Parsed(NormalizedEvent),
    /// No dedicated parser exists; the generic fallback produced the event
    Fallback(NormalizedEvent),
    /// The dedicated parser rejected the line
    Failed(ParseError),
}

/// Declared format → parser map.
///
/// Populated once at startup; adding a format means registering another
/// [`LogParser`] implementation. Formats without a parser go to the generic
/// fallback. A dedicated parser's failure is never retried by the fallback.
pub struct ParserRegistry {
    parsers: HashMap<LogFormat, Arc<dyn LogParser>>,
    fallback: PlainTextParser,
}

impl ParserRegistry {
    /// Empty registry: every format goes to the fallback.
    pub fn new(max_message_len: usize) -> Self {
        Self {
            parsers: HashMap::new(),
            fallback: PlainTextParser::new(max_message_len),
        }
    }

    /// Registry with every built-in parser.
    pub fn with_defaults(max_message_len: usize) -> Self {
        let mut registry = Self::new(max_message_len);
        registry.register(Arc::new(SyslogParser));
        registry.register(Arc::new(JsonParser));
        registry.register(Arc::new(CefParser));
        registry.register(Arc::new(LeefParser));
        registry.register(Arc::new(HttpLogParser));
        registry.register(Arc::new(LogfmtParser));
        registry
    }

    /// Register `parser` under its own format, returning the one it replaced.
    pub fn register(&mut self, parser: Arc<dyn LogParser>) -> Option<Arc<dyn LogParser>> {
        let format = parser.format();
        debug!(format = %format, "Registered parser");
        self.parsers.insert(format, parser)
    }

    pub fn get(&self, format: &LogFormat) -> Option<&Arc<dyn LogParser>> {
        self.parsers.get(format)
    }

    pub fn has_parser(&self, format: &LogFormat) -> bool {
        self.parsers.contains_key(format)
    }

    pub fn formats(&self) -> Vec<LogFormat> {
        let mut formats: Vec<_> = self.parsers.keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Parse `raw` as `format`.
    ///
    /// ANSI escape codes are stripped before parsing; the event keeps the
    /// original line in `raw`. A panicking parser is reported as a failure.
    pub fn dispatch(&self, format: &LogFormat, raw: &str, received_at: DateTime<Utc>) -> Dispatch {
        let clean = strip_ansi_codes(raw);

        let Some(parser) = self.parsers.get(format) else {
            let mut event = self.fallback.parse_lenient(&clean, received_at, format.clone());
            restore_raw(&mut event, raw, &clean);
            return Dispatch::Fallback(event);
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| parser.parse(&clean, received_at)));
        match outcome {
            Ok(Ok(mut event)) => {
                restore_raw(&mut event, raw, &clean);
                Dispatch::Parsed(event)
            }
            Ok(Err(e)) => Dispatch::Failed(e),
            Err(_) => {
                error!(format = %format, "Parser panicked");
                Dispatch::Failed(ParseError::Panicked)
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_MAX_MESSAGE_LEN)
    }
}

fn restore_raw(event: &mut NormalizedEvent, raw: &str, clean: &Cow<'_, str>) {
    if matches!(clean, Cow::Owned(_)) {
        event.raw = raw.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::model::TAG_UNPARSED;

    struct Exploding;

    impl LogParser for Exploding {
        fn parse(&self, _raw: &str, _received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
            panic!("boom");
        }

        fn format(&self) -> LogFormat {
            LogFormat::Other("exploding".into())
        }
    }

    #[test]
    fn test_defaults_cover_builtin_formats() {
        let registry = ParserRegistry::default();
        for format in [
            LogFormat::Syslog,
            LogFormat::Json,
            LogFormat::Cef,
            LogFormat::Leef,
            LogFormat::HttpLog,
            LogFormat::Logfmt,
        ] {
            assert!(registry.has_parser(&format), "missing {}", format);
        }
        assert!(!registry.has_parser(&LogFormat::Other("windows_evtx".into())));
    }

    #[test]
    fn test_declared_failure_is_not_retried() {
        let registry = ParserRegistry::default();
        let outcome = registry.dispatch(&LogFormat::Json, "not-json{{{", Utc::now());
        assert!(matches!(outcome, Dispatch::Failed(ParseError::ParseFailed(_))));
    }

    #[test]
    fn test_unknown_format_uses_fallback() {
        let registry = ParserRegistry::default();
        let format = LogFormat::Other("custom".into());
        match registry.dispatch(&format, "not-json{{{", Utc::now()) {
            Dispatch::Fallback(event) => {
                assert!(event.has_tag(TAG_UNPARSED));
                assert_eq!(event.format, format);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_ansi_stripped_raw_preserved() {
        let registry = ParserRegistry::default();
        let raw = "\u{1b}[32m{\"msg\":\"green\"}\u{1b}[0m";
        match registry.dispatch(&LogFormat::Json, raw, Utc::now()) {
            Dispatch::Parsed(event) => {
                assert_eq!(event.message, "green");
                assert_eq!(event.raw, raw);
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_panicking_parser_is_contained() {
        let mut registry = ParserRegistry::new(100);
        registry.register(Arc::new(Exploding));
        let outcome = registry.dispatch(&LogFormat::Other("exploding".into()), "x", Utc::now());
        assert!(matches!(outcome, Dispatch::Failed(ParseError::Panicked)));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ParserRegistry::new(100);
        assert!(registry.register(Arc::new(JsonParser)).is_none());
        assert!(registry.register(Arc::new(JsonParser)).is_some());
        assert_eq!(registry.formats(), vec![LogFormat::Json]);
    }
}
