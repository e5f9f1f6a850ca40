//! Pump - route `<source_id>\t<raw>` input lines to per-source workers.
//!
//! Each registered source gets one task fed by a bounded channel, so lines
//! of a source are ingested in arrival order while sources run in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, SharedAggregator};
use crate::conf::EngineConfig;
use crate::runtime::stop::shutdown_signal;

const CHANNEL_CAPACITY: usize = 1024;

/// What the pump saw on its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Lines handed to a source (or to the aggregator for unknown ids)
    pub lines: u64,
    /// Lines with no tab separator
    pub malformed: u64,
    /// True when shutdown arrived before end of input
    pub interrupted: bool,
}

/// Read lines until EOF or `shutdown`, then drain every source worker.
pub async fn pump<R, S>(aggregator: SharedAggregator, reader: R, shutdown: S) -> PumpSummary
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut senders = HashMap::new();
    let mut workers = Vec::new();
    for source in aggregator.sources() {
        let (tx, rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let id = source.id().to_string();
        workers.push(tokio::spawn(source_worker(
            Arc::clone(&aggregator),
            id.clone(),
            rx,
        )));
        senders.insert(id, tx);
    }

    let mut summary = PumpSummary::default();
    let mut lines = reader.lines();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, draining sources");
                summary.interrupted = true;
                break;
            }
            next = lines.next_line() => match next {
                Ok(Some(line)) => route(&aggregator, &senders, &line, &mut summary).await,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    }

    drop(senders);
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Source worker failed: {}", e);
        }
    }
    summary
}

async fn route(
    aggregator: &Aggregator,
    senders: &HashMap<String, mpsc::Sender<String>>,
    line: &str,
    summary: &mut PumpSummary,
) {
    let Some((source_id, raw)) = line.split_once('\t') else {
        summary.malformed += 1;
        debug!("Skipping input line without a source id");
        return;
    };
    summary.lines += 1;

    match senders.get(source_id) {
        Some(tx) => {
            if tx.send(raw.to_string()).await.is_err() {
                warn!("Worker for source {} is gone; line lost", source_id);
            }
        }
        // Counted as dropped by the aggregator
        None => {
            let _ = aggregator.ingest(source_id, raw);
        }
    }
}

async fn source_worker(
    aggregator: SharedAggregator,
    source_id: String,
    mut rx: mpsc::Receiver<String>,
) {
    let mut handled: u64 = 0;
    while let Some(raw) = rx.recv().await {
        // Outcomes are counted and logged by the aggregator
        let _ = aggregator.ingest(&source_id, &raw);
        handled = handled.saturating_add(1);
    }
    debug!("Source {} drained after {} lines", source_id, handled);
}

/// Write every stored event as one common-schema JSON object per line.
pub async fn write_export<W>(aggregator: &Aggregator, writer: &mut W) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let events = aggregator.export();
    for event in &events {
        let mut line = serde_json::to_vec(event).map_err(std::io::Error::other)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }
    writer.flush().await?;
    Ok(events.len())
}

/// Pump stdin until EOF or Ctrl-C, export, and log final statistics.
pub async fn run(
    aggregator: SharedAggregator,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = BufReader::new(tokio::io::stdin());
    let summary = pump(Arc::clone(&aggregator), stdin, shutdown_signal()).await;
    info!(
        "Input closed: {} lines routed{}",
        summary.lines,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    if summary.malformed > 0 {
        warn!("{} input lines had no source id and were skipped", summary.malformed);
    }

    if config.export_on_exit {
        let mut stdout = tokio::io::stdout();
        let written = write_export(&aggregator, &mut stdout).await?;
        info!("Exported {} events", written);
    }

    let stats = aggregator.statistics();
    info!(
        "Final statistics: received={}, parsed={}, errors={}, filtered={}, dropped={}, evicted={}",
        stats.received,
        stats.parsed,
        stats.errors,
        stats.filtered,
        stats.dropped,
        stats.evicted_events
    );
    let (status, message) = aggregator.health();
    info!("Final health: {:?} - {}", status, message);
    Ok(())
}
