//! Boot - logging init, config load, aggregator creation.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::aggregator::{Aggregator, SharedAggregator};
use crate::conf::EngineConfig;
use crate::job;

/// Initialise the tracing / logging subsystem.
///
/// Logs go to stderr; stdout carries the JSON-lines export.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load config, register the declared sources, and spawn the periodic
/// statistics job.
pub async fn boot() -> Result<(SharedAggregator, EngineConfig), Box<dyn std::error::Error>> {
    info!("Starting ingest v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!(
        "Loaded configuration: store_capacity={}, search_window={}, sources={}",
        config.store_capacity,
        config.search_window,
        config.sources.len()
    );

    let aggregator = Aggregator::from_config(&config).map_err(|e| {
        error!("Failed to register sources: {}", e);
        e
    })?;
    let aggregator = Arc::new(aggregator);

    if aggregator.sources().is_empty() {
        info!("No sources declared; every input line will be dropped");
    }

    info!(
        "Starting periodic statistics job (interval: {}s)",
        config.stats_interval_secs
    );
    tokio::spawn(job::periodic_statistics(
        Arc::clone(&aggregator),
        config.stats_interval_secs,
    ));

    Ok((aggregator, config))
}
