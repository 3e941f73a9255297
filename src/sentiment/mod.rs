// src/sentiment/mod.rs
//! Three-class sentiment scoring: shared types, the scorer trait, and the
//! factory that picks an implementation from config.

pub mod inference;
pub mod lexicon;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::tracker::{ScorerConfig, ScorerKind};
use crate::ingest::types::NewsRecord;

pub use inference::InferenceScorer;
pub use lexicon::LexiconScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Ok(SentimentLabel::Positive),
            "neutral" | "neu" => Ok(SentimentLabel::Neutral),
            "negative" | "neg" => Ok(SentimentLabel::Negative),
            other => anyhow::bail!("unknown sentiment label: {other}"),
        }
    }
}

/// Class probabilities for one text plus the arg-max label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub label: SentimentLabel,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
}

impl SentimentScores {
    /// Build from raw (possibly unnormalized) class weights.
    ///
    /// Negative or non-finite inputs count as zero; an all-zero vector becomes
    /// pure neutral. Ties resolve neutral > positive > negative.
    pub fn from_probs(pos: f64, neu: f64, neg: f64) -> Self {
        let c = |x: f64| if x.is_finite() && x > 0.0 { x } else { 0.0 };
        let (pos, neu, neg) = (c(pos), c(neu), c(neg));
        let sum = pos + neu + neg;
        let (pos, neu, neg) = if sum > 0.0 {
            (pos / sum, neu / sum, neg / sum)
        } else {
            (0.0, 1.0, 0.0)
        };

        let mut label = SentimentLabel::Neutral;
        let mut best = neu;
        if pos > best {
            label = SentimentLabel::Positive;
            best = pos;
        }
        if neg > best {
            label = SentimentLabel::Negative;
        }
        Self { label, pos, neu, neg }
    }

    /// Probability of the winning class.
    pub fn score(&self) -> f64 {
        match self.label {
            SentimentLabel::Positive => self.pos,
            SentimentLabel::Neutral => self.neu,
            SentimentLabel::Negative => self.neg,
        }
    }
}

/// A news record together with its sentiment columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: NewsRecord,
    pub sent_label: SentimentLabel,
    pub sent_score: f64,
    pub sent_pos: f64,
    pub sent_neu: f64,
    pub sent_neg: f64,
}

impl ScoredRecord {
    pub fn new(record: NewsRecord, s: &SentimentScores) -> Self {
        Self {
            record,
            sent_label: s.label,
            sent_score: s.score(),
            sent_pos: s.pos,
            sent_neu: s.neu,
            sent_neg: s.neg,
        }
    }
}

/// Black-box text classifier. Output has the same length and order as input;
/// empty input yields empty output.
#[async_trait::async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, texts: &[String]) -> Result<Vec<SentimentScores>>;

    /// Whether inputs should go through `normalize_text` first.
    fn wants_clean_input(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

pub type DynScorer = Arc<dyn SentimentScorer>;

/// Build the configured scorer. Loaded once at startup and shared read-only.
pub fn build_scorer(cfg: &ScorerConfig) -> Result<DynScorer> {
    let scorer: DynScorer = match cfg.kind {
        ScorerKind::Lexicon => Arc::new(LexiconScorer::new()),
        ScorerKind::Inference => Arc::new(InferenceScorer::from_env(cfg)?),
    };
    tracing::info!(
        scorer = scorer.name(),
        model = %cfg.model_id,
        device = %cfg.device,
        batch_size = cfg.batch_size,
        "sentiment scorer ready"
    );
    Ok(scorer)
}
