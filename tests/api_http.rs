// tests/api_http.rs
//
// HTTP-level tests for the dashboard Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /api/tickers     (503 before the first cycle)
// - GET /api/sentiment   (422 on a snapshot missing dashboard columns, 200 view)

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use parquet::arrow::ArrowWriter;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use ticker_sentiment_stream::api::{self, AppState, SentimentView};
use ticker_sentiment_stream::ingest::types::NewsRecord;
use ticker_sentiment_stream::sentiment::{ScoredRecord, SentimentLabel, SentimentScores};
use ticker_sentiment_stream::PartitionedStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(root: &Path) -> Router {
    api::router(AppState {
        snapshot: PartitionedStore::new(root).snapshot_path(),
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn scored(ticker: &str, hour: u32, pos: f64, neg: f64) -> ScoredRecord {
    let ts = format!("2026-10-19T{hour:02}:00:00Z");
    let mut r = NewsRecord::with_defaults("newsapi", ticker, &ts);
    r.text = format!("{ticker} headline at {hour}");
    r.url = format!("https://n/{ticker}/{hour}");
    ScoredRecord::new(r, &SentimentScores::from_probs(pos, 0.2, neg))
}

#[tokio::test]
async fn health_returns_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_router(tmp.path()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "OK");
}

#[tokio::test]
async fn missing_snapshot_is_service_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    for uri in ["/api/tickers", "/api/sentiment?ticker=AAPL"] {
        let (status, body) = get(test_router(tmp.path()), uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        let v: Json = serde_json::from_slice(&body).unwrap();
        assert!(v["error"].as_str().unwrap().contains("No snapshot"));
    }
}

#[tokio::test]
async fn snapshot_without_sentiment_columns_is_unprocessable() {
    let tmp = tempfile::tempdir().unwrap();
    let path = PartitionedStore::new(tmp.path()).snapshot_path();

    // a raw-records file: no sentiment columns at all
    let cols: Vec<(&str, ArrayRef)> = ["ticker", "text", "fetched_at", "source"]
        .iter()
        .map(|c| (*c, Arc::new(StringArray::from(vec!["x"])) as ArrayRef))
        .collect();
    let batch = RecordBatch::try_from_iter(cols).unwrap();
    let mut w = ArrowWriter::try_new(File::create(&path).unwrap(), batch.schema(), None).unwrap();
    w.write(&batch).unwrap();
    w.close().unwrap();

    let (status, body) = get(test_router(tmp.path()), "/api/sentiment").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let v: Json = serde_json::from_slice(&body).unwrap();
    let msg = v["error"].as_str().unwrap();
    assert!(msg.contains("sent_label") && msg.contains("sent_score"), "{msg}");
}

#[tokio::test]
async fn sentiment_view_over_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let store = PartitionedStore::new(tmp.path());
    store
        .overwrite_snapshot(&[
            scored("TSLA", 9, 0.1, 0.7),
            scored("AAPL", 11, 0.7, 0.1),
            scored("AAPL", 10, 0.1, 0.7),
            scored("AAPL", 12, 0.7, 0.1),
        ])
        .unwrap();

    let (status, body) = get(test_router(tmp.path()), "/api/tickers").await;
    assert_eq!(status, StatusCode::OK);
    let tickers: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(tickers, vec!["AAPL", "TSLA"]);

    let (status, body) = get(test_router(tmp.path()), "/api/sentiment?ticker=aapl&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let view: SentimentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.ticker.as_deref(), Some("AAPL"));
    assert_eq!(view.series.len(), 3);
    assert!(view.series.windows(2).all(|w| w[0].fetched_at <= w[1].fetched_at));
    assert_eq!(view.label_counts.get(&SentimentLabel::Positive), Some(&2));
    assert_eq!(view.label_counts.get(&SentimentLabel::Negative), Some(&1));
    assert_eq!(view.latest.len(), 2);
    assert_eq!(view.latest[1].url, "https://n/AAPL/12");
}
