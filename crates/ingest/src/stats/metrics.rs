use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::parser::{LogFormat, ParseError};

/// A wrapper that forces the wrapped data onto its own cache line(s).
///
/// Different tasks bump different counter groups on every line; keeping the
/// groups 64 bytes apart stops cores from invalidating each other's L1
/// lines.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Ingestion outcome counters (updated once per call)
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub received: AtomicU64,
    pub parsed: AtomicU64,
    pub errors: AtomicU64,
    pub filtered: AtomicU64,
    /// Unknown or disabled source
    pub dropped: AtomicU64,
}

/// Successful parses by format
#[derive(Debug, Default)]
pub struct FormatMetrics {
    pub syslog: AtomicU64,
    pub json: AtomicU64,
    pub cef: AtomicU64,
    pub leef: AtomicU64,
    pub http: AtomicU64,
    pub logfmt: AtomicU64,
    /// Formats with no dedicated parser (generic fallback)
    pub fallback: AtomicU64,
}

/// Aggregate parse timing
#[derive(Debug, Default)]
pub struct TotalMetrics {
    pub time_nanos: AtomicU64,
    pub count: AtomicU64,
}

/// Parse failures by reason
#[derive(Debug, Default)]
pub struct ErrorMetrics {
    pub invalid_format: AtomicU64,
    pub too_large: AtomicU64,
    pub parse_failed: AtomicU64,
    pub panic: AtomicU64,
}

/// Process-wide ingestion metrics.
///
/// All operations use `Ordering::Relaxed`; `snapshot()` reads are not
/// transactional across groups, which is fine for observability.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub ingest: CacheAligned<IngestCounters>,
    pub formats: CacheAligned<FormatMetrics>,
    pub totals: CacheAligned<TotalMetrics>,
    pub errors: CacheAligned<ErrorMetrics>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exactly once per ingestion attempt.
    #[inline]
    pub fn record_received(&self) {
        self.ingest.0.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.ingest.0.filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.ingest.0.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful parse.
    ///
    /// Hottest path in the metrics system - called once per stored event.
    #[inline]
    pub fn record_parse(&self, format: &LogFormat, fallback: bool, time_nanos: u64) {
        self.ingest.0.parsed.fetch_add(1, Ordering::Relaxed);
        self.totals.0.count.fetch_add(1, Ordering::Relaxed);
        self.totals.0.time_nanos.fetch_add(time_nanos, Ordering::Relaxed);

        let formats = &self.formats.0;
        let counter = match format {
            _ if fallback => &formats.fallback,
            LogFormat::Syslog => &formats.syslog,
            LogFormat::Json => &formats.json,
            LogFormat::Cef => &formats.cef,
            LogFormat::Leef => &formats.leef,
            LogFormat::HttpLog => &formats.http,
            LogFormat::Logfmt => &formats.logfmt,
            LogFormat::Other(_) => &formats.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a parse failure.
    #[inline]
    pub fn record_error(&self, error: &ParseError) {
        self.ingest.0.errors.fetch_add(1, Ordering::Relaxed);
        let errors = &self.errors.0;
        let counter = match error {
            ParseError::InvalidFormat(_) => &errors.invalid_format,
            ParseError::LineTooLarge(_, _) => &errors.too_large,
            ParseError::ParseFailed(_) => &errors.parse_failed,
            ParseError::Panicked => &errors.panic,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let ingest = &self.ingest.0;
        let formats = &self.formats.0;
        let errors = &self.errors.0;

        let parsed = ingest.parsed.load(Ordering::Relaxed);
        let failed = ingest.errors.load(Ordering::Relaxed);
        let total_count = self.totals.0.count.load(Ordering::Relaxed);
        let total_time_ns = self.totals.0.time_nanos.load(Ordering::Relaxed);
        let attempts = parsed + failed;

        let per_format = [
            ("syslog", &formats.syslog),
            ("json", &formats.json),
            ("cef", &formats.cef),
            ("leef", &formats.leef),
            ("http_log", &formats.http),
            ("logfmt", &formats.logfmt),
            ("fallback", &formats.fallback),
        ]
        .into_iter()
        .map(|(name, counter)| (name.to_string(), counter.load(Ordering::Relaxed)))
        .filter(|(_, count)| *count > 0)
        .collect();

        MetricsSnapshot {
            received: ingest.received.load(Ordering::Relaxed),
            parsed,
            errors: failed,
            filtered: ingest.filtered.load(Ordering::Relaxed),
            dropped: ingest.dropped.load(Ordering::Relaxed),
            success_rate: if attempts > 0 {
                parsed as f64 / attempts as f64
            } else {
                1.0
            },
            per_format,
            avg_parse_time_us: if total_count > 0 {
                (total_time_ns as f64 / total_count as f64) / 1000.0
            } else {
                0.0
            },
            invalid_format: errors.invalid_format.load(Ordering::Relaxed),
            lines_too_large: errors.too_large.load(Ordering::Relaxed),
            parse_failed: errors.parse_failed.load(Ordering::Relaxed),
            parse_panics: errors.panic.load(Ordering::Relaxed),
        }
    }
}

/// A read-only snapshot of ingestion metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub parsed: u64,
    pub errors: u64,
    pub filtered: u64,
    pub dropped: u64,
    /// parsed / (parsed + errors); 1.0 before any attempt
    pub success_rate: f64,
    pub per_format: BTreeMap<String, u64>,
    pub avg_parse_time_us: f64,

    // Errors by reason
    pub invalid_format: u64,
    pub lines_too_large: u64,
    pub parse_failed: u64,
    pub parse_panics: u64,
}
