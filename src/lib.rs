// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod score_file;
pub mod sentiment;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::TrackerConfig;
pub use crate::ingest::normalize_text;
pub use crate::ingest::scheduler::{CycleOrchestrator, CycleOutcome, RunSummary};
pub use crate::ingest::types::{NewsRecord, NewsSource, TickerFetch};
pub use crate::sentiment::{ScoredRecord, SentimentLabel, SentimentScorer, SentimentScores};
pub use crate::store::PartitionedStore;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
/// `RUST_LOG` filters (default `info`); `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer().compact()).try_init();
    }
}
