use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::aggregator::SharedAggregator;
use crate::stats::HealthStatus;

/// Background task that logs statistics and health at a fixed interval.
///
/// Degradation is logged at `warn`, parser panics at `error`; a steady
/// healthy engine logs one `info` line per tick.
pub async fn periodic_statistics(aggregator: SharedAggregator, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        let stats = aggregator.statistics();
        let (status, message) = aggregator.health();

        info!(
            "Ingest stats: received={}, parsed={}, errors={}, filtered={}, dropped={}, stored={}, evicted={}, sources={}/{}, avg_parse={:.1}us",
            stats.received,
            stats.parsed,
            stats.errors,
            stats.filtered,
            stats.dropped,
            stats.stored_events,
            stats.evicted_events,
            stats.active_sources,
            stats.total_sources,
            stats.avg_parse_time_us
        );

        match status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded => warn!("Ingest health degraded: {}", message),
            HealthStatus::Unhealthy => error!("Ingest unhealthy: {}", message),
        }
    }
}
