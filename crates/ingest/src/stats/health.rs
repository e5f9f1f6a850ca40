use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::SourceSnapshot;

/// Limits used to classify engine health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Below this success rate the engine is degraded
    pub degraded_success_rate: f64,
    /// Above this many errors within the recent window the engine is degraded.
    /// Counted from per-minute buckets, not from the bounded error ring.
    pub degraded_recent_errors: usize,
    /// Success rate is only judged once this many parse attempts were made
    pub min_attempts: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_success_rate: 0.9,
            degraded_recent_errors: 100,
            min_attempts: 0,
        }
    }
}

impl HealthThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.degraded_success_rate) {
            return Err(format!(
                "thresholds.degraded_success_rate must be within 0.0..=1.0 (got {})",
                self.degraded_success_rate
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    /// A parser panicked; the engine is running but a parser is broken
    Unhealthy,
}

/// Aggregate statistics across every source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub received: u64,
    pub parsed: u64,
    pub errors: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub success_rate: f64,
    pub per_source: Vec<SourceSnapshot>,
    pub active_sources: usize,
    pub total_sources: usize,
    /// Error-ring entries within the recent error window
    pub recent_errors: usize,
    pub stored_events: usize,
    pub evicted_events: u64,
    pub per_format: BTreeMap<String, u64>,
    pub avg_parse_time_us: f64,
    pub parse_panics: u64,
}

impl Statistics {
    /// Classify health and describe why.
    pub fn health(&self, thresholds: &HealthThresholds) -> (HealthStatus, String) {
        if self.parse_panics > 0 {
            return (
                HealthStatus::Unhealthy,
                format!("Critical: {} parser panics detected", self.parse_panics),
            );
        }

        let attempts = self.parsed + self.errors;
        if attempts >= thresholds.min_attempts.max(1)
            && self.success_rate < thresholds.degraded_success_rate
        {
            return (
                HealthStatus::Degraded,
                format!("Degraded: success rate is {:.1}%", self.success_rate * 100.0),
            );
        }

        if self.recent_errors > thresholds.degraded_recent_errors {
            return (
                HealthStatus::Degraded,
                format!("Degraded: {} parse errors in the recent window", self.recent_errors),
            );
        }

        (
            HealthStatus::Healthy,
            format!(
                "Operating normally (parsed: {}, success: {:.1}%)",
                self.parsed,
                self.success_rate * 100.0
            ),
        )
    }
}
