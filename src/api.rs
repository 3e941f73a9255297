// src/api.rs
//! Read-only dashboard API over `latest.parquet`.
//!
//! A missing snapshot or a snapshot without the dashboard columns is reported
//! to the client as a blocking condition (503 / 422), never a panic.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::sentiment::{ScoredRecord, SentimentLabel};
use crate::store::{read_column_names, read_records, DASHBOARD_COLUMNS};

const DEFAULT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub snapshot: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("No snapshot found yet. Start the stream loop first.")]
    Missing,
    #[error("Missing columns in snapshot: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Failed to read snapshot: {0:#}")]
    Read(anyhow::Error),
}

impl IntoResponse for SnapshotError {
    fn into_response(self) -> Response {
        let status = match &self {
            SnapshotError::Missing => StatusCode::SERVICE_UNAVAILABLE,
            SnapshotError::MissingColumns(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SnapshotError::Read(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Load the snapshot, checking the column contract before decoding rows.
pub fn load_snapshot(path: &std::path::Path) -> Result<Vec<ScoredRecord>, SnapshotError> {
    if !path.exists() {
        return Err(SnapshotError::Missing);
    }
    let names = read_column_names(path).map_err(SnapshotError::Read)?;
    let mut missing: Vec<String> = DASHBOARD_COLUMNS
        .iter()
        .filter(|c| !names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(SnapshotError::MissingColumns(missing));
    }
    read_records(path).map_err(SnapshotError::Read)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/tickers", get(tickers))
        .route("/api/sentiment", get(sentiment))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn tickers(State(state): State<AppState>) -> Result<Json<Vec<String>>, SnapshotError> {
    let rows = load_snapshot(&state.snapshot)?;
    let set: BTreeSet<String> = rows.into_iter().map(|r| r.record.ticker).collect();
    Ok(Json(set.into_iter().collect()))
}

#[derive(Debug, Deserialize)]
pub struct SentimentQuery {
    pub ticker: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub fetched_at: DateTime<Utc>,
    pub sent_score: f64,
    pub sent_label: SentimentLabel,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Headline {
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    pub sent_label: SentimentLabel,
    pub sent_score: f64,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SentimentView {
    pub ticker: Option<String>,
    pub series: Vec<SeriesPoint>,
    pub label_counts: BTreeMap<SentimentLabel, usize>,
    pub latest: Vec<Headline>,
}

/// Ticker-filtered view: time series, label distribution, latest headlines.
/// Rows whose `fetched_at` doesn't parse are dropped.
pub fn build_view(rows: Vec<ScoredRecord>, ticker: Option<&str>, limit: usize) -> SentimentView {
    let mut dated: Vec<(DateTime<Utc>, ScoredRecord)> = rows
        .into_iter()
        .filter_map(|r| {
            DateTime::parse_from_rfc3339(&r.record.fetched_at)
                .ok()
                .map(|t| (t.with_timezone(&Utc), r))
        })
        .collect();
    dated.sort_by_key(|(t, _)| *t);

    let ticker = match ticker {
        Some(t) => Some(t.trim().to_ascii_uppercase()),
        None => dated
            .iter()
            .map(|(_, r)| r.record.ticker.as_str())
            .min()
            .map(str::to_string),
    };
    let view: Vec<(DateTime<Utc>, ScoredRecord)> = dated
        .into_iter()
        .filter(|(_, r)| Some(&r.record.ticker) == ticker.as_ref())
        .collect();

    let series = view
        .iter()
        .map(|(t, r)| SeriesPoint {
            fetched_at: *t,
            sent_score: r.sent_score,
            sent_label: r.sent_label,
        })
        .collect();

    let mut label_counts = BTreeMap::new();
    for (_, r) in &view {
        *label_counts.entry(r.sent_label).or_insert(0) += 1;
    }

    let skip = view.len().saturating_sub(limit);
    let latest = view
        .into_iter()
        .skip(skip)
        .map(|(t, r)| Headline {
            fetched_at: t,
            source: r.record.source,
            sent_label: r.sent_label,
            sent_score: r.sent_score,
            text: r.record.text,
            url: r.record.url,
        })
        .collect();

    SentimentView {
        ticker,
        series,
        label_counts,
        latest,
    }
}

async fn sentiment(
    State(state): State<AppState>,
    Query(q): Query<SentimentQuery>,
) -> Result<Json<SentimentView>, SnapshotError> {
    let rows = load_snapshot(&state.snapshot)?;
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).max(1);
    Ok(Json(build_view(rows, q.ticker.as_deref(), limit)))
}
