use chrono::{DateTime, Utc};

pub use super::model::{LogFormat, NormalizedEvent, ParseError, Severity};

/// A parser for one wire format.
///
/// Implementations are pure: no I/O, no shared state. `received_at` is the
/// ingestion wall-clock, used only when the text carries no timestamp.
pub trait LogParser: Send + Sync {
    /// parse a raw log line into a canonical event
    fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<NormalizedEvent, ParseError>;
    fn format(&self) -> LogFormat;
}
