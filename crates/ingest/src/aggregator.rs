//! Aggregator - the ingest pipeline and the shared engine state.
//!
//! Every line goes through the same steps: source lookup, enable check,
//! exclusion filters, parse by declared format, then store or error ring.
//! All outcomes are values; nothing escapes as a panic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::conf::EngineConfig;
use crate::parser::registry::Dispatch;
use crate::parser::{NormalizedEvent, ParseError, ParserRegistry};
use crate::query::{self, CommonSchemaEvent, QueryError};
use crate::source::{LogSource, RegistryError, SourceConfig, SourceRegistry};
use crate::stats::{HealthStatus, HealthThresholds, IngestMetrics, MetricsSnapshot, Statistics};
use crate::store::{ErrorRing, EventStore, ParseErrorRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Source is disabled: {0}")]
    SourceDisabled(String),

    #[error("Line excluded by a filter on source {0}")]
    FilteredOut(String),

    #[error("Failed to parse line from source {source_id}: {error}")]
    ParseFailure {
        source_id: String,
        #[source]
        error: ParseError,
    },
}

impl IngestError {
    /// False for expected drops (exclusion filters).
    pub fn is_error(&self) -> bool {
        !matches!(self, IngestError::FilteredOut(_))
    }
}

/// Per-batch tally. Filtered and dropped items count as failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failure: usize,
}

pub struct Aggregator {
    sources: SourceRegistry,
    parsers: Arc<ParserRegistry>,
    store: EventStore,
    errors: ErrorRing,
    metrics: Arc<IngestMetrics>,
    search_window: usize,
    recent_error_window: chrono::Duration,
    thresholds: HealthThresholds,
}

pub type SharedAggregator = Arc<Aggregator>;

impl Aggregator {
    /// Engine with the built-in parsers and no sources.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_registry(config, ParserRegistry::with_defaults(config.max_message_len))
    }

    /// Engine with a caller-provided parser registry.
    pub fn with_registry(config: &EngineConfig, parsers: ParserRegistry) -> Self {
        let recent_error_window = chrono::Duration::seconds(
            i64::try_from(config.recent_error_window_secs).unwrap_or(i64::MAX / 1000),
        );
        Self {
            sources: SourceRegistry::new(),
            parsers: Arc::new(parsers),
            store: EventStore::new(config.store_capacity),
            errors: ErrorRing::new(config.error_ring_capacity, recent_error_window),
            metrics: Arc::new(IngestMetrics::new()),
            search_window: config.search_window.max(1),
            recent_error_window,
            thresholds: config.thresholds.clone(),
        }
    }

    /// Engine with every `[[sources]]` entry of `config` registered.
    pub fn from_config(config: &EngineConfig) -> Result<Self, RegistryError> {
        let aggregator = Self::new(config);
        for source in &config.sources {
            aggregator.register_source(source.clone())?;
        }
        Ok(aggregator)
    }

    pub fn register_source(&self, config: SourceConfig) -> Result<Arc<LogSource>, RegistryError> {
        let format = config.format.clone();
        let source = self.sources.register(config)?;
        if !self.parsers.has_parser(&format) {
            info!(
                "Source {} declares format '{}' with no dedicated parser; using the generic fallback",
                source.id(),
                format
            );
        }
        Ok(source)
    }

    pub fn enable_source(&self, id: &str) -> Result<(), RegistryError> {
        self.sources.enable(id)
    }

    pub fn disable_source(&self, id: &str) -> Result<(), RegistryError> {
        self.sources.disable(id)
    }

    pub fn source(&self, id: &str) -> Option<Arc<LogSource>> {
        self.sources.get(id)
    }

    pub fn sources(&self) -> Vec<Arc<LogSource>> {
        self.sources.list()
    }

    /// Ingest one raw line on behalf of `source_id`.
    pub fn ingest(&self, source_id: &str, raw: &str) -> Result<Arc<NormalizedEvent>, IngestError> {
        self.metrics.record_received();
        let received_at = Utc::now();

        let Some(source) = self.sources.get(source_id) else {
            self.metrics.record_dropped();
            debug!("Dropping line for unknown source {}", source_id);
            return Err(IngestError::SourceNotFound(source_id.to_string()));
        };
        source.record_received(received_at);

        if !source.is_enabled() {
            self.metrics.record_dropped();
            debug!("Dropping line for disabled source {}", source_id);
            return Err(IngestError::SourceDisabled(source_id.to_string()));
        }

        if source.is_excluded(raw) {
            source.record_filtered();
            self.metrics.record_filtered();
            return Err(IngestError::FilteredOut(source_id.to_string()));
        }

        // Held until the event is in the store
        let _sequence = source.lock_sequence();

        let parse_start = Instant::now();
        let dispatch = self.parsers.dispatch(source.format(), raw, received_at);
        let parse_time = u64::try_from(parse_start.elapsed().as_nanos()).unwrap_or(u64::MAX);

        match dispatch {
            Dispatch::Parsed(event) => Ok(self.accept(&source, event, false, parse_time)),
            Dispatch::Fallback(event) => Ok(self.accept(&source, event, true, parse_time)),
            Dispatch::Failed(error) => {
                source.record_error();
                self.metrics.record_error(&error);
                self.errors
                    .push(ParseErrorRecord::new(received_at, source.id(), raw, &error));
                debug!(
                    "Parse failure on source {} ({}): {}",
                    source.id(),
                    source.format(),
                    error
                );
                Err(IngestError::ParseFailure {
                    source_id: source.id().to_string(),
                    error,
                })
            }
        }
    }

    fn accept(
        &self,
        source: &LogSource,
        mut event: NormalizedEvent,
        fallback: bool,
        parse_time: u64,
    ) -> Arc<NormalizedEvent> {
        let config = source.config();
        if is_unset(&event.hostname) {
            event.hostname = config.hostname.clone();
        }
        if is_unset(&event.service) {
            event.service = config.service.clone();
        }

        let event = Arc::new(event);
        self.store.push(Arc::clone(&event));
        source.record_parsed();
        self.metrics.record_parse(source.format(), fallback, parse_time);
        event
    }

    /// Ingest every line in order; each item is handled independently.
    pub fn batch_ingest<I>(&self, source_id: &str, raws: I) -> BatchOutcome
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut outcome = BatchOutcome::default();
        for raw in raws {
            match self.ingest(source_id, raw.as_ref()) {
                Ok(_) => outcome.success += 1,
                Err(_) => outcome.failure += 1,
            }
        }
        outcome
    }

    /// Stored events matching every predicate, most recent first.
    pub fn search(
        &self,
        predicates: &HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<Arc<NormalizedEvent>>, QueryError> {
        query::search(&self.store, predicates, self.search_window, limit)
    }

    /// Every stored event, oldest first.
    pub fn events(&self) -> Vec<Arc<NormalizedEvent>> {
        self.store.snapshot()
    }

    /// Every stored event in the common schema, oldest first.
    pub fn export(&self) -> Vec<CommonSchemaEvent> {
        query::export(&self.store.snapshot())
    }

    pub fn recent_errors(&self, n: usize) -> Vec<ParseErrorRecord> {
        self.errors.recent(n)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn statistics(&self) -> Statistics {
        let metrics = self.metrics.snapshot();
        let per_source = self
            .sources
            .list()
            .iter()
            .map(|source| source.snapshot())
            .collect();

        Statistics {
            received: metrics.received,
            parsed: metrics.parsed,
            errors: metrics.errors,
            filtered: metrics.filtered,
            dropped: metrics.dropped,
            success_rate: metrics.success_rate,
            per_source,
            active_sources: self.sources.active_count(),
            total_sources: self.sources.len(),
            recent_errors: self.errors.count_since(Utc::now(), self.recent_error_window),
            stored_events: self.store.len(),
            evicted_events: self.store.evicted(),
            per_format: metrics.per_format,
            avg_parse_time_us: metrics.avg_parse_time_us,
            parse_panics: metrics.parse_panics,
        }
    }

    /// Health classified against the configured thresholds.
    pub fn health(&self) -> (HealthStatus, String) {
        self.statistics().health(&self.thresholds)
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogFormat;

    fn aggregator() -> Aggregator {
        let agg = Aggregator::new(&EngineConfig::default());
        agg.register_source(
            SourceConfig::new("app", LogFormat::Json)
                .with_hostname("app-01")
                .with_exclude("healthcheck"),
        )
        .unwrap();
        agg
    }

    #[test]
    fn test_ingest_json_backfills_hostname() {
        let agg = aggregator();
        let event = agg
            .ingest("app", r#"{"level":"error","msg":"boom","service":"api"}"#)
            .unwrap();
        assert_eq!(event.hostname.as_deref(), Some("app-01"));
        assert_eq!(event.service.as_deref(), Some("api"));
        assert_eq!(agg.events().len(), 1);
        assert_eq!(agg.source("app").unwrap().snapshot().parsed, 1);
    }

    #[test]
    fn test_unknown_and_disabled_sources_are_dropped() {
        let agg = aggregator();
        assert_eq!(
            agg.ingest("nope", "x").unwrap_err(),
            IngestError::SourceNotFound("nope".into())
        );
        agg.disable_source("app").unwrap();
        assert_eq!(
            agg.ingest("app", "{}").unwrap_err(),
            IngestError::SourceDisabled("app".into())
        );

        let stats = agg.statistics();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.errors, 0);
        assert!(agg.events().is_empty());
    }

    #[test]
    fn test_filtered_line_is_not_an_error() {
        let agg = aggregator();
        let err = agg.ingest("app", r#"{"msg":"GET /HealthCheck"}"#).unwrap_err();
        assert_eq!(err, IngestError::FilteredOut("app".into()));
        assert!(!err.is_error());

        let stats = agg.statistics();
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.per_source[0].filtered, 1);
        assert!(agg.recent_errors(10).is_empty());
    }

    #[test]
    fn test_parse_failure_recorded() {
        let agg = aggregator();
        let err = agg.ingest("app", "not-json{{{").unwrap_err();
        assert!(err.is_error());
        assert!(matches!(err, IngestError::ParseFailure { ref source_id, .. } if source_id == "app"));

        let errors = agg.recent_errors(10);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].raw, "not-json{{{");
        assert_eq!(agg.statistics().recent_errors, 1);
    }

    #[test]
    fn test_batch_counts_every_item() {
        let agg = aggregator();
        let outcome = agg.batch_ingest(
            "app",
            [r#"{"msg":"a"}"#, "broken", r#"{"msg":"healthcheck"}"#, r#"{"msg":"b"}"#],
        );
        assert_eq!(outcome, BatchOutcome { success: 2, failure: 2 });
        assert_eq!(agg.statistics().received, 4);
    }

    #[test]
    fn test_from_config_registers_sources() {
        let config = EngineConfig {
            sources: vec![
                SourceConfig::new("a", LogFormat::Syslog),
                SourceConfig::new("b", LogFormat::Other("custom".into())).disabled(),
            ],
            ..EngineConfig::default()
        };
        let agg = Aggregator::from_config(&config).unwrap();
        let stats = agg.statistics();
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.active_sources, 1);
    }

    #[test]
    fn test_health_reflects_failures() {
        let agg = aggregator();
        agg.ingest("app", r#"{"msg":"ok"}"#).unwrap();
        assert_eq!(agg.health().0, HealthStatus::Healthy);
        for _ in 0..3 {
            let _ = agg.ingest("app", "garbage");
        }
        assert_eq!(agg.health().0, HealthStatus::Degraded);
    }

    struct Liar;

    impl crate::parser::LogParser for Liar {
        fn parse(&self, _raw: &str, _at: chrono::DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
            Err(ParseError::ParseFailed("parser panicked".into()))
        }

        fn format(&self) -> LogFormat {
            LogFormat::Other("liar".into())
        }
    }

    struct Exploding;

    impl crate::parser::LogParser for Exploding {
        fn parse(&self, _raw: &str, _at: chrono::DateTime<Utc>) -> Result<NormalizedEvent, ParseError> {
            panic!("boom");
        }

        fn format(&self) -> LogFormat {
            LogFormat::Other("exploding".into())
        }
    }

    #[test]
    fn test_only_real_panics_mark_unhealthy() {
        let mut parsers = ParserRegistry::with_defaults(100);
        parsers.register(Arc::new(Liar));
        parsers.register(Arc::new(Exploding));
        let agg = Aggregator::with_registry(&EngineConfig::default(), parsers);
        agg.register_source(SourceConfig::new("liar", LogFormat::Other("liar".into())))
            .unwrap();
        agg.register_source(SourceConfig::new("boom", LogFormat::Other("exploding".into())))
            .unwrap();

        let err = agg.ingest("liar", "x").unwrap_err();
        assert!(matches!(err, IngestError::ParseFailure { error: ParseError::ParseFailed(_), .. }));
        assert_eq!(agg.statistics().parse_panics, 0);
        assert_ne!(agg.health().0, HealthStatus::Unhealthy);

        let err = agg.ingest("boom", "x").unwrap_err();
        assert!(matches!(err, IngestError::ParseFailure { error: ParseError::Panicked, .. }));
        assert_eq!(agg.statistics().parse_panics, 1);
        assert_eq!(agg.health().0, HealthStatus::Unhealthy);
        assert_eq!(agg.recent_errors(1)[0].kind, "panicked");
    }
}
