//! Model - EngineConfig and its defaults.

use serde::{Deserialize, Serialize};

use crate::parser::formats::plain::DEFAULT_MAX_MESSAGE_LEN;
use crate::source::SourceConfig;
use crate::stats::HealthThresholds;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum events held in memory; the oldest are evicted beyond this
    pub store_capacity: usize,
    pub error_ring_capacity: usize,
    /// How many of the most recent events a search scans
    pub search_window: usize,
    /// Message length cap for the generic fallback parser
    pub max_message_len: usize,
    pub recent_error_window_secs: u64,
    pub stats_interval_secs: u64,
    /// Write every stored event as common-schema JSON lines on shutdown
    pub export_on_exit: bool,
    pub thresholds: HealthThresholds,
    pub sources: Vec<SourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_capacity: 100_000,
            error_ring_capacity: 1000,
            search_window: 10_000,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            recent_error_window_secs: 3600,
            stats_interval_secs: 30,
            export_on_exit: true,
            thresholds: HealthThresholds::default(),
            sources: Vec::new(),
        }
    }
}
