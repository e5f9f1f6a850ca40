//! Counters, statistics and health classification.

pub mod health;
pub mod metrics;

pub use health::{HealthStatus, HealthThresholds, Statistics};
pub use metrics::{IngestMetrics, MetricsSnapshot};
