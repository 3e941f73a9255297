// tests/orchestrator.rs
//
// End-to-end cycle behaviour with a fake news source and the offline
// lexicon scorer. No network, no real sleeping.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{record, tracker_config, BrokenScorer, FakeSource, RecordingSleeper, StepClock};
use ticker_sentiment_stream::ingest::types::TickerFetch;
use ticker_sentiment_stream::sentiment::LexiconScorer;
use ticker_sentiment_stream::store::read_records;
use ticker_sentiment_stream::{CycleOrchestrator, CycleOutcome, RunSummary};

fn aapl_two() -> TickerFetch {
    TickerFetch::from_records(vec![
        record("AAPL", "https://n/1", "Apple shares surge after record profit"),
        record("AAPL", "https://n/2", "Apple faces weak demand, stock falls"),
    ])
}

#[tokio::test]
async fn cycle_persists_only_tickers_with_data() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL", "TSLA"], 3600);
    let source = Arc::new(
        FakeSource::new()
            .with("AAPL", aapl_two())
            .with("TSLA", TickerFetch::from_records(vec![])),
    );
    let orch = CycleOrchestrator::new(&cfg, source.clone(), Arc::new(LexiconScorer::new()))
        .with_clock(Arc::new(StepClock::new(3600)));

    let (rows, partition) = match orch.run_cycle().await {
        CycleOutcome::Persisted { rows, partition } => (rows, partition),
        other => panic!("expected a persisted cycle, got {other:?}"),
    };
    assert_eq!(rows, 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2, "both tickers fetched");
    assert!(partition.starts_with(tmp.path().join("date=2026-10-19")));

    let parts = orch.store().list_partitions().unwrap();
    assert_eq!(parts, vec![partition.clone()]);

    let snapshot = read_records(&orch.store().snapshot_path()).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|r| r.record.ticker == "AAPL"));
    for r in &snapshot {
        let sum = r.sent_pos + r.sent_neu + r.sent_neg;
        assert!((sum - 1.0).abs() < 1e-3, "probabilities sum to {sum}");
    }
    // raw text is stored, not the normalized model input
    assert!(snapshot.iter().any(|r| r.record.text.contains("Apple faces weak demand,")));
}

#[tokio::test]
async fn all_empty_cycle_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL", "TSLA"], 60);
    let source = Arc::new(
        FakeSource::new()
            .with("AAPL", TickerFetch::failed("HTTP 500"))
            .with("TSLA", TickerFetch::from_records(vec![])),
    );
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(LexiconScorer::new()));

    assert_eq!(orch.run_cycle().await, CycleOutcome::Skipped);
    assert!(orch.store().list_partitions().unwrap().is_empty());
    assert!(!orch.store().snapshot_path().exists());
}

#[tokio::test]
async fn snapshot_is_replaced_not_appended() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL"], 60);
    let source = Arc::new(FakeSource::new().with("AAPL", aapl_two()));
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(LexiconScorer::new()))
        .with_clock(Arc::new(StepClock::new(60)));

    assert!(matches!(orch.run_cycle().await, CycleOutcome::Persisted { rows: 2, .. }));
    assert!(matches!(orch.run_cycle().await, CycleOutcome::Persisted { rows: 2, .. }));

    assert_eq!(orch.store().list_partitions().unwrap().len(), 2);
    assert_eq!(read_records(&orch.store().snapshot_path()).unwrap().len(), 2);
}

#[tokio::test]
async fn failing_ticker_does_not_block_others() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["TSLA", "AAPL"], 60);
    let source = Arc::new(
        FakeSource::new()
            .with("TSLA", TickerFetch::failed("connection reset"))
            .with("AAPL", aapl_two()),
    );
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(LexiconScorer::new()));

    let rows = orch.collect().await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.record.ticker == "AAPL"));
}

#[tokio::test]
async fn scoring_failure_counts_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL"], 60);
    let source = Arc::new(FakeSource::new().with("AAPL", aapl_two()));
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(BrokenScorer));

    assert_eq!(orch.run_cycle().await, CycleOutcome::Skipped);
}

#[tokio::test]
async fn shared_article_keeps_unique_ids_across_tickers() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL", "TSLA"], 60);
    let shared = "https://n/big-tech";
    let source = Arc::new(
        FakeSource::new()
            .with("AAPL", TickerFetch::from_records(vec![record("AAPL", shared, "big tech rally")]))
            .with("TSLA", TickerFetch::from_records(vec![record("TSLA", shared, "big tech rally")])),
    );
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(LexiconScorer::new()));

    let rows = orch.collect().await;
    let ids: Vec<&str> = rows.iter().map(|r| r.record.id.as_str()).collect();
    assert_eq!(ids, vec![shared, "https://n/big-tech#TSLA"]);
}

#[tokio::test]
async fn loop_sleeps_fixed_interval_and_stops_on_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL"], 900);
    let source = Arc::new(FakeSource::new().with("AAPL", aapl_two()));
    let (sleeper, shutdown) = RecordingSleeper::new(3);
    let orch = CycleOrchestrator::new(&cfg, source.clone(), Arc::new(LexiconScorer::new()))
        .with_clock(Arc::new(StepClock::new(900)))
        .with_sleeper(sleeper.clone());

    let summary = orch.run(shutdown).await;
    assert_eq!(
        summary,
        RunSummary {
            cycles: 3,
            persisted: 3,
            skipped: 0,
            write_failures: 0
        }
    );
    // no backoff: every nap is the configured interval
    assert_eq!(sleeper.naps(), vec![Duration::from_secs(900); 3]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(orch.store().list_partitions().unwrap().len(), 3);
}

#[tokio::test]
async fn repeated_fetch_failures_keep_the_fixed_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL", "TSLA"], 300);
    let source = Arc::new(
        FakeSource::new()
            .with("AAPL", TickerFetch::failed("HTTP 503"))
            .with("TSLA", TickerFetch::failed("connection refused")),
    );
    let (sleeper, shutdown) = RecordingSleeper::new(4);
    let orch = CycleOrchestrator::new(&cfg, source.clone(), Arc::new(LexiconScorer::new()))
        .with_clock(Arc::new(StepClock::new(300)))
        .with_sleeper(sleeper.clone());

    let summary = orch.run(shutdown).await;
    assert_eq!(
        summary,
        RunSummary {
            cycles: 4,
            persisted: 0,
            skipped: 4,
            write_failures: 0
        }
    );
    // failures never stretch the pause
    assert_eq!(sleeper.naps(), vec![Duration::from_secs(300); 4]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 8);
    assert!(orch.store().list_partitions().unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_before_start_runs_no_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tracker_config(tmp.path(), &["AAPL"], 60);
    let source = Arc::new(FakeSource::new().with("AAPL", aapl_two()));
    let orch = CycleOrchestrator::new(&cfg, source.clone(), Arc::new(LexiconScorer::new()));

    let (tx, rx) = tokio::sync::watch::channel(true);
    let summary = orch.run(rx).await;
    drop(tx);
    assert_eq!(summary.cycles, 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn write_failure_is_reported_and_loop_continues() {
    let tmp = tempfile::tempdir().unwrap();
    // data_root is a regular file, so no partition directory can be created
    let blocked = tmp.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let cfg = tracker_config(&blocked, &["AAPL"], 60);
    let source = Arc::new(FakeSource::new().with("AAPL", aapl_two()));
    let (sleeper, shutdown) = RecordingSleeper::new(2);
    let orch = CycleOrchestrator::new(&cfg, source, Arc::new(LexiconScorer::new()))
        .with_clock(Arc::new(StepClock::new(60)))
        .with_sleeper(sleeper);

    let summary = orch.run(shutdown).await;
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.write_failures, 2);
    assert_eq!(summary.persisted, 0);
}
