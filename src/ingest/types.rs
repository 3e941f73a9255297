// src/ingest/types.rs
use serde::{Deserialize, Serialize};

/// One ingested headline, already mapped into the canonical schema.
///
/// Every field is a plain `String` so that nothing is ever null on disk;
/// adapters fill gaps with [`NewsRecord::with_defaults`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsRecord {
    pub id: String,
    pub source: String,     // adapter tag, e.g. "newsapi"
    pub ticker: String,
    pub text: String,       // title + description, unnormalized
    pub created_at: String, // RFC 3339, as reported by the source
    pub fetched_at: String, // RFC 3339, when we retrieved it
    pub author: String,
    pub url: String,
    pub lang: String,
}

impl NewsRecord {
    /// Record with every optional field at its typed default.
    /// `id` is a fresh UUID; `created_at`/`fetched_at` both equal `fetched_at`.
    pub fn with_defaults(source: &str, ticker: &str, fetched_at: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            ticker: ticker.to_string(),
            text: String::new(),
            created_at: fetched_at.to_string(),
            fetched_at: fetched_at.to_string(),
            author: String::new(),
            url: String::new(),
            lang: "en".to_string(),
        }
    }
}

/// Why a ticker produced nothing this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    /// The source answered, but had no articles.
    NoArticles,
    /// Transient failure (network, status, payload); already logged.
    Failed(String),
}

/// Per-ticker result of one fetch. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerFetch {
    Records(Vec<NewsRecord>),
    Empty(EmptyReason),
}

impl TickerFetch {
    pub fn from_records(records: Vec<NewsRecord>) -> Self {
        if records.is_empty() {
            TickerFetch::Empty(EmptyReason::NoArticles)
        } else {
            TickerFetch::Records(records)
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        TickerFetch::Empty(EmptyReason::Failed(reason.into()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TickerFetch::Empty(_))
    }

    pub fn len(&self) -> usize {
        match self {
            TickerFetch::Records(v) => v.len(),
            TickerFetch::Empty(_) => 0,
        }
    }

    pub fn into_records(self) -> Vec<NewsRecord> {
        match self {
            TickerFetch::Records(v) => v,
            TickerFetch::Empty(_) => Vec::new(),
        }
    }
}

/// Errors raised by news adapters.
///
/// Only `MissingApiKey` ever escapes an adapter; the transient variants are
/// folded into [`TickerFetch::Empty`] by [`NewsSource::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0} not set")]
    MissingApiKey(&'static str),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed payload: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch up to `page_size` articles for `ticker`. Never returns an error;
    /// transient failures are reported as `TickerFetch::Empty(Failed)`.
    async fn fetch(&self, ticker: &str, page_size: usize) -> TickerFetch;
    fn name(&self) -> &'static str;
}
