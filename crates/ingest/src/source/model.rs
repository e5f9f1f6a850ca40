//! Model - source declarations and per-source runtime state.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::filter::FilterEngine;
use crate::parser::LogFormat;

/// Kind of producer behind a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Firewall,
    Ids,
    WebServer,
    Application,
    OperatingSystem,
    Authentication,
    Cloud,
    Database,
    NetworkDevice,
    #[default]
    Other,
}

/// Whether the producer pushes to us or is polled by an external collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    #[default]
    Push,
    Pull,
}

/// Declaration of one log producer (a `[[sources]]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: SourceCategory,
    #[serde(default = "undeclared_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub collection: CollectionMethod,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Regex patterns; a raw line matching any of them is dropped
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub exclude_case_sensitive: bool,
    /// Backfilled into events that carry no hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Backfilled into events that carry no service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

fn undeclared_format() -> LogFormat {
    LogFormat::Other(String::new())
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, format: LogFormat) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: SourceCategory::Other,
            format,
            collection: CollectionMethod::Push,
            enabled: true,
            exclude: Vec::new(),
            exclude_case_sensitive: false,
            hostname: None,
            service: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: SourceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Per-source counters, mutated only by the aggregator.
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub received: AtomicU64,
    pub parsed: AtomicU64,
    pub errors: AtomicU64,
    pub filtered: AtomicU64,
    /// Unix millis of the last line, 0 when none yet
    pub last_received_ms: AtomicI64,
}

/// A registered source: immutable declaration plus runtime state.
pub struct LogSource {
    config: SourceConfig,
    filter: Option<FilterEngine>,
    enabled: AtomicBool,
    counters: SourceCounters,
    // Held from parse through store append so events keep arrival order
    sequence: Mutex<()>,
}

impl LogSource {
    pub(crate) fn new(config: SourceConfig, filter: Option<FilterEngine>) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            filter,
            counters: SourceCounters::default(),
            sequence: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn format(&self) -> &LogFormat {
        &self.config.format
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// True when an exclusion pattern matches `raw`.
    pub fn is_excluded(&self, raw: &str) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|filter| filter.excludes(raw))
    }

    pub fn counters(&self) -> &SourceCounters {
        &self.counters
    }

    pub(crate) fn lock_sequence(&self) -> MutexGuard<'_, ()> {
        self.sequence.lock()
    }

    #[inline]
    pub(crate) fn record_received(&self, at: DateTime<Utc>) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .last_received_ms
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_parsed(&self) {
        self.counters.parsed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_filtered(&self) {
        self.counters.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        let last = self.counters.last_received_ms.load(Ordering::Relaxed);
        SourceSnapshot {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            category: self.config.category,
            format: self.config.format.clone(),
            enabled: self.is_enabled(),
            received: self.counters.received.load(Ordering::Relaxed),
            parsed: self.counters.parsed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            last_received: (last > 0)
                .then(|| DateTime::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSource")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("counters", &self.counters)
            .finish()
    }
}

/// Point-in-time view of one source, as reported in statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub id: String,
    pub name: String,
    pub category: SourceCategory,
    pub format: LogFormat,
    pub enabled: bool,
    pub received: u64,
    pub parsed: u64,
    pub errors: u64,
    pub filtered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_received: Option<DateTime<Utc>>,
}
