// src/sentiment/inference.rs
//! Hosted transformer scorer (FinBERT tone by default) over the HF inference API.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{SentimentScores, SentimentScorer};
use crate::config::tracker::ScorerConfig;

pub const ENV_HF_API_TOKEN: &str = "HF_API_TOKEN";

#[derive(Serialize)]
struct Req<'a> {
    inputs: &'a [String],
    options: ReqOptions,
}

#[derive(Serialize)]
struct ReqOptions {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

pub struct InferenceScorer {
    http: reqwest::Client,
    token: String,
    url: String,
    batch_size: usize,
}

impl InferenceScorer {
    /// Requires `$HF_API_TOKEN`; a missing token is fatal.
    pub fn from_env(cfg: &ScorerConfig) -> Result<Self> {
        let token = std::env::var(ENV_HF_API_TOKEN).unwrap_or_default();
        if token.trim().is_empty() {
            bail!("{ENV_HF_API_TOKEN} not set (required for scorer.kind = \"inference\")");
        }
        Self::new(token, cfg)
    }

    pub fn new(token: impl Into<String>, cfg: &ScorerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ticker-sentiment-stream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building inference http client")?;
        Ok(Self {
            http,
            token: token.into().trim().to_string(),
            url: format!(
                "{}/{}",
                cfg.endpoint.trim_end_matches('/'),
                cfg.model_id.trim_start_matches('/')
            ),
            batch_size: cfg.batch_size.max(1),
        })
    }

    async fn score_batch(&self, batch: &[String]) -> Result<Vec<SentimentScores>> {
        // Blank strings are rejected by some tokenizers; a single space still
        // yields a (neutral-leaning) prediction.
        let inputs: Vec<String> = batch
            .iter()
            .map(|t| if t.trim().is_empty() { " ".to_string() } else { t.clone() })
            .collect();
        let req = Req {
            inputs: &inputs,
            options: ReqOptions { wait_for_model: true },
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&req)
            .send()
            .await
            .context("inference request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "inference returned {status}: {}",
                body.chars().take(200).collect::<String>()
            );
        }
        let body: Vec<Vec<LabelScore>> = resp.json().await.context("decoding inference response")?;
        if body.len() != batch.len() {
            return Err(anyhow!(
                "inference returned {} results for {} inputs",
                body.len(),
                batch.len()
            ));
        }
        Ok(body.iter().map(|scores| to_scores(scores)).collect())
    }
}

fn to_scores(scores: &[LabelScore]) -> SentimentScores {
    let (mut pos, mut neu, mut neg) = (0.0, 0.0, 0.0);
    for s in scores {
        match s.label.to_ascii_lowercase().as_str() {
            "positive" => pos = s.score,
            "neutral" => neu = s.score,
            "negative" => neg = s.score,
            _ => {}
        }
    }
    SentimentScores::from_probs(pos, neu, neg)
}

#[async_trait::async_trait]
impl SentimentScorer for InferenceScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<SentimentScores>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.score_batch(chunk).await?);
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "inference"
    }
}
