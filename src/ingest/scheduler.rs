// src/ingest/scheduler.rs
//! Cycle orchestrator: fetch every ticker, score, persist, sleep, repeat.
//!
//! Strictly sequential. The only suspension point that honours shutdown is
//! the sleep between cycles; a cycle that has started always runs to the end.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::sync::watch;

use crate::config::tracker::TrackerConfig;
use crate::ingest::types::{EmptyReason, NewsRecord, NewsSource, TickerFetch};
use crate::ingest::{ensure_metrics_described, ingest_ticker, normalize_text};
use crate::sentiment::{DynScorer, ScoredRecord};
use crate::store::PartitionedStore;

/// The same article can match several tickers. Later copies get a
/// `#TICKER` suffix so ids stay unique within one cycle yet stable across
/// cycles.
fn make_id_unique(rec: &mut NewsRecord, seen: &mut HashSet<String>) {
    if seen.contains(&rec.id) {
        rec.id = format!("{}#{}", rec.id, rec.ticker);
        if seen.contains(&rec.id) {
            rec.id = uuid::Uuid::new_v4().to_string();
        }
    }
    seen.insert(rec.id.clone());
}

/// Wall clock seam.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Inter-cycle pause seam.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// Where a cycle currently is. Logged at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching(String),
    Scoring(String),
    Aggregating,
    Persisting,
    Sleeping,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Rows appended to `partition` and mirrored into the snapshot.
    Persisted { rows: usize, partition: PathBuf },
    /// Every ticker came back empty; nothing written.
    Skipped,
    /// Results were lost because persistence failed.
    WriteFailed(String),
}

/// Totals over the lifetime of one `run` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub persisted: u64,
    pub skipped: u64,
    pub write_failures: u64,
}

pub struct CycleOrchestrator {
    tickers: Vec<String>,
    page_size: usize,
    interval: Duration,
    source: Arc<dyn NewsSource>,
    scorer: DynScorer,
    store: PartitionedStore,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl CycleOrchestrator {
    pub fn new(
        cfg: &TrackerConfig,
        source: Arc<dyn NewsSource>,
        scorer: DynScorer,
    ) -> Self {
        Self {
            tickers: cfg.tickers.clone(),
            page_size: cfg.page_size,
            interval: cfg.interval(),
            source,
            scorer,
            store: PartitionedStore::new(cfg.data_root.clone()),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    fn enter(&self, phase: CyclePhase) {
        tracing::debug!(target: "cycle", ?phase, "phase");
    }

    /// Score one ticker's records. Any scorer error, or a result of the
    /// wrong length, is returned as an error for the caller to absorb.
    async fn score_ticker(&self, records: Vec<NewsRecord>) -> Result<Vec<ScoredRecord>> {
        let inputs: Vec<String> = if self.scorer.wants_clean_input() {
            records.iter().map(|r| normalize_text(&r.text)).collect()
        } else {
            records.iter().map(|r| r.text.clone()).collect()
        };
        let scores = self.scorer.score(&inputs).await?;
        if scores.len() != records.len() {
            return Err(anyhow!(
                "scorer {} returned {} results for {} inputs",
                self.scorer.name(),
                scores.len(),
                records.len()
            ));
        }
        Ok(records
            .into_iter()
            .zip(scores.iter())
            .map(|(r, s)| ScoredRecord::new(r, s))
            .collect())
    }

    /// Fetch and score every ticker, in configured order. Tickers that come
    /// back empty or fail anywhere are skipped for this cycle.
    pub async fn collect(&self) -> Vec<ScoredRecord> {
        let mut combined = Vec::new();
        let mut ids = HashSet::new();
        for ticker in &self.tickers {
            self.enter(CyclePhase::Fetching(ticker.clone()));
            let records = match ingest_ticker(self.source.as_ref(), ticker, self.page_size).await {
                TickerFetch::Records(v) => v,
                TickerFetch::Empty(EmptyReason::NoArticles) => {
                    tracing::info!(ticker = %ticker, "no headlines returned");
                    continue;
                }
                // already logged by ingest_ticker
                TickerFetch::Empty(EmptyReason::Failed(_)) => continue,
            };

            self.enter(CyclePhase::Scoring(ticker.clone()));
            match self.score_ticker(records).await {
                Ok(scored) => {
                    tracing::debug!(ticker = %ticker, rows = scored.len(), "scored");
                    for mut row in scored {
                        make_id_unique(&mut row.record, &mut ids);
                        combined.push(row);
                    }
                }
                Err(e) => {
                    tracing::warn!(ticker = %ticker, error = ?e, "scoring failed; treating as empty");
                }
            }
        }
        combined
    }

    /// One full pass: fetch → score → aggregate → persist.
    pub async fn run_cycle(&self) -> CycleOutcome {
        ensure_metrics_described();
        let ts = self.clock.now();

        let combined = self.collect().await;
        self.enter(CyclePhase::Aggregating);
        counter!("cycle_runs_total").increment(1);
        gauge!("cycle_last_run_ts").set(ts.timestamp() as f64);

        if combined.is_empty() {
            counter!("cycle_skipped_total").increment(1);
            tracing::info!(cycle = %ts.to_rfc3339(), "no data fetched for any ticker; skipping write");
            return CycleOutcome::Skipped;
        }

        self.enter(CyclePhase::Persisting);
        let partition = match self.store.append(&combined, ts) {
            Ok(p) => p,
            Err(e) => {
                counter!("cycle_write_errors_total").increment(1);
                tracing::error!(error = ?e, rows = combined.len(), "partition append failed; cycle lost");
                return CycleOutcome::WriteFailed(format!("{e:#}"));
            }
        };
        if let Err(e) = self.store.overwrite_snapshot(&combined) {
            counter!("cycle_write_errors_total").increment(1);
            tracing::error!(error = ?e, "snapshot write failed");
            return CycleOutcome::WriteFailed(format!("{e:#}"));
        }

        counter!("cycle_rows_written_total").increment(combined.len() as u64);
        tracing::info!(
            rows = combined.len(),
            tickers = self.tickers.len(),
            path = %partition.display(),
            cycle = %ts.to_rfc3339(),
            "cycle persisted"
        );
        CycleOutcome::Persisted {
            rows: combined.len(),
            partition,
        }
    }

    /// Loop until `shutdown` flips to `true`. Checked before each cycle and
    /// raced against the sleep; never mid-cycle.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut summary = RunSummary::default();
        tracing::info!(
            tickers = ?self.tickers,
            interval_secs = self.interval.as_secs(),
            "starting multi-ticker loop"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_cycle().await {
                CycleOutcome::Persisted { .. } => summary.persisted += 1,
                CycleOutcome::Skipped => summary.skipped += 1,
                CycleOutcome::WriteFailed(_) => summary.write_failures += 1,
            }
            summary.cycles += 1;

            if *shutdown.borrow() {
                break;
            }
            self.enter(CyclePhase::Sleeping);
            tokio::select! {
                _ = self.sleeper.sleep(self.interval) => {}
                res = shutdown.changed() => {
                    // Sender gone: nobody can stop us any more, so take the full nap.
                    if res.is_err() {
                        self.sleeper.sleep(self.interval).await;
                    }
                }
            }
            self.enter(CyclePhase::Idle);
        }
        tracing::info!(?summary, "loop stopped");
        summary
    }
}
