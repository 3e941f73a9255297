// tests/common/mod.rs
//
// Shared fakes for integration tests: a canned news source, a stepping
// clock, and a sleeper that records naps and can request shutdown.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use ticker_sentiment_stream::ingest::scheduler::{Clock, Sleeper};
use ticker_sentiment_stream::ingest::types::{NewsRecord, NewsSource, TickerFetch};
use ticker_sentiment_stream::sentiment::{SentimentScorer, SentimentScores};
use ticker_sentiment_stream::TrackerConfig;

pub fn record(ticker: &str, id: &str, text: &str) -> NewsRecord {
    let mut r = NewsRecord::with_defaults("newsapi", ticker, "2026-10-19T12:00:00Z");
    r.id = id.to_string();
    r.text = text.to_string();
    r.url = id.to_string();
    r
}

/// Per-ticker canned responses. Unknown tickers answer with no articles.
#[derive(Default)]
pub struct FakeSource {
    canned: HashMap<String, TickerFetch>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, fetch: TickerFetch) -> Self {
        self.canned.insert(ticker.to_string(), fetch);
        self
    }
}

#[async_trait]
impl NewsSource for FakeSource {
    async fn fetch(&self, ticker: &str, _page_size: usize) -> TickerFetch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.canned
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| TickerFetch::from_records(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Starts at a fixed instant and advances `step` on every read, so each
/// cycle gets a distinct partition file.
pub struct StepClock {
    start: DateTime<Utc>,
    step_secs: i64,
    n: AtomicI64,
}

impl StepClock {
    pub fn new(step_secs: i64) -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
            step_secs,
            n: AtomicI64::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let k = self.n.fetch_add(1, Ordering::SeqCst);
        self.start + chrono::Duration::seconds(k * self.step_secs)
    }
}

/// Records every requested nap and returns immediately. After `stop_after`
/// naps it flips the shutdown channel.
pub struct RecordingSleeper {
    pub naps: Mutex<Vec<Duration>>,
    stop_after: usize,
    tx: watch::Sender<bool>,
}

impl RecordingSleeper {
    pub fn new(stop_after: usize) -> (Arc<Self>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let s = Arc::new(Self {
            naps: Mutex::new(Vec::new()),
            stop_after,
            tx,
        });
        (s, rx)
    }

    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        let n = {
            let mut naps = self.naps.lock().unwrap();
            naps.push(d);
            naps.len()
        };
        if n >= self.stop_after {
            let _ = self.tx.send(true);
        }
    }
}

/// Scorer that always errors.
pub struct BrokenScorer;

#[async_trait]
impl SentimentScorer for BrokenScorer {
    async fn score(&self, _texts: &[String]) -> Result<Vec<SentimentScores>> {
        anyhow::bail!("model unavailable")
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn tracker_config(root: &Path, tickers: &[&str], interval_secs: u64) -> TrackerConfig {
    TrackerConfig {
        data_root: root.to_path_buf(),
        interval_secs,
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        ..TrackerConfig::default()
    }
    .validated()
    .expect("valid test config")
}
