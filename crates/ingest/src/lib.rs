// Domain-driven module structure for the ingest engine.

// Core infrastructure
pub mod filter;
pub mod parser;
pub mod store;

// Domain modules
pub mod aggregator;
pub mod conf;
pub mod job;
pub mod query;
pub mod runtime;
pub mod source;
pub mod stats;

pub use aggregator::{Aggregator, BatchOutcome, IngestError, SharedAggregator};
