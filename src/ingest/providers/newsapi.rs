// src/ingest/providers/newsapi.rs
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::tracker::NewsApiConfig;
use crate::ingest::types::{IngestError, NewsRecord, NewsSource, TickerFetch};

pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";
const SOURCE_TAG: &str = "newsapi";

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    // Required: a body without `articles` is a malformed payload.
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    url: Option<String>,
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

/// NewsAPI `/v2/everything` adapter.
pub struct NewsApiProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    language: String,
    sort_by: String,
    aliases: HashMap<String, String>,
}

impl NewsApiProvider {
    /// Build from `$NEWSAPI_KEY`. A missing key is a configuration error and
    /// is returned immediately.
    pub fn from_env(
        cfg: &NewsApiConfig,
        aliases: HashMap<String, String>,
    ) -> Result<Self, IngestError> {
        let key = std::env::var(ENV_NEWSAPI_KEY).unwrap_or_default();
        Self::new(key, cfg, aliases)
    }

    pub fn new(
        api_key: impl Into<String>,
        cfg: &NewsApiConfig,
        aliases: HashMap<String, String>,
    ) -> Result<Self, IngestError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(IngestError::MissingApiKey(ENV_NEWSAPI_KEY));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("ticker-sentiment-stream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            endpoint: cfg.endpoint.clone(),
            language: cfg.language.clone(),
            sort_by: cfg.sort_by.clone(),
            aliases,
        })
    }

    /// `AAPL OR "Apple Inc"` when an alias is configured, else the bare symbol.
    pub fn build_query(&self, ticker: &str) -> String {
        match self.aliases.get(ticker).map(|a| a.trim()) {
            Some(alias) if !alias.is_empty() => format!("{ticker} OR \"{alias}\""),
            _ => ticker.to_string(),
        }
    }

    async fn try_fetch(&self, ticker: &str, page_size: usize) -> Result<Vec<NewsRecord>, IngestError> {
        let query = self.build_query(ticker);
        let page_size = page_size.to_string();
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", query.as_str()),
                ("language", self.language.as_str()),
                ("sortBy", self.sort_by.as_str()),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            // the url carries apiKey; keep it out of error strings and logs
            .map_err(reqwest::Error::without_url)?;

        let status = resp.status();
        let body = resp.text().await.map_err(reqwest::Error::without_url)?;
        if !status.is_success() {
            return Err(IngestError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: Resp =
            serde_json::from_str(&body).map_err(|e| IngestError::Decode(e.to_string()))?;
        if parsed.status.as_deref() == Some("error") {
            return Err(IngestError::Decode(
                parsed.message.unwrap_or_else(|| "status=error".into()),
            ));
        }

        let fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(map_articles(ticker, &self.language, &fetched_at, parsed.articles))
    }
}

fn map_articles(ticker: &str, lang: &str, fetched_at: &str, articles: Vec<Article>) -> Vec<NewsRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(articles.len());
    for a in articles {
        let mut rec = NewsRecord::with_defaults(SOURCE_TAG, ticker, fetched_at);
        rec.lang = lang.to_string();

        let title = a.title.unwrap_or_default();
        let desc = a.description.unwrap_or_default();
        rec.text = html_escape::decode_html_entities(format!("{title} {desc}").trim()).into_owned();

        if let Some(ts) = a.published_at.filter(|s| !s.trim().is_empty()) {
            rec.created_at = ts;
        }
        if let Some(name) = a.source.and_then(|s| s.name) {
            rec.author = name;
        }
        if let Some(url) = a.url.filter(|u| !u.trim().is_empty()) {
            // Same article fetched twice in one response keeps the generated id.
            if seen.insert(url.clone()) {
                rec.id = url.clone();
            }
            rec.url = url;
        }
        out.push(rec);
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl NewsSource for NewsApiProvider {
    async fn fetch(&self, ticker: &str, page_size: usize) -> TickerFetch {
        match self.try_fetch(ticker, page_size).await {
            Ok(v) => TickerFetch::from_records(v),
            Err(e) => TickerFetch::failed(e.to_string()),
        }
    }

    fn name(&self) -> &'static str {
        SOURCE_TAG
    }
}
