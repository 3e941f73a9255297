// src/sentiment/lexicon.rs
use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;

use super::{SentimentScores, SentimentScorer};

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_default()
});

/// Per-point weight of lexicon polarity in the class logits.
const POLARITY_GAIN: f64 = 1.2;
/// Fixed neutral logit; an empty or polarity-free text lands here.
const NEUTRAL_LOGIT: f64 = 1.0;

/// Offline scorer: financial polarity lexicon with short-range negation,
/// mapped to three class probabilities via softmax.
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (positive mass, negative mass).
    /// A negator in the previous 1..=3 tokens flips a word's polarity.
    pub fn polarity(&self, text: &str) -> (i32, i32) {
        let tokens = tokens(text);
        let (mut pos, mut neg) = (0, 0);

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            let adj = if negated { -base } else { base };
            if adj > 0 {
                pos += adj;
            } else {
                neg += -adj;
            }
        }
        (pos, neg)
    }

    pub fn score_one(&self, text: &str) -> SentimentScores {
        let (p, n) = self.polarity(text);
        let logits = [
            POLARITY_GAIN * f64::from(p),
            NEUTRAL_LOGIT,
            POLARITY_GAIN * f64::from(n),
        ];
        let max = logits.iter().cloned().fold(f64::MIN, f64::max);
        let e: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        SentimentScores::from_probs(e[0], e[1], e[2])
    }
}

#[async_trait::async_trait]
impl SentimentScorer for LexiconScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<SentimentScores>> {
        Ok(texts.iter().map(|t| self.score_one(t)).collect())
    }

    fn wants_clean_input(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// Stems that `normalize_text` leaves behind when it splits `xxn't` into `xxn t`.
const CONTRACTION_STEMS: [&str; 14] = [
    "isn", "wasn", "aren", "weren", "won", "didn", "don", "doesn", "can", "couldn",
    "shouldn", "wouldn", "hasn", "haven",
];

/// Tokens with `<stem> t` pairs glued back into `<stem>t` (`didn t` -> `didnt`).
fn tokens(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tok in tokenize(s) {
        if tok == "t" {
            if let Some(prev) = out.last_mut() {
                if CONTRACTION_STEMS.contains(&prev.as_str()) {
                    prev.push('t');
                    continue;
                }
            }
        }
        out.push(tok);
    }
    out
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "isnt"
            | "wasn't"
            | "wasnt"
            | "aren't"
            | "arent"
            | "won't"
            | "wont"
            | "weren't"
            | "werent"
            | "didn't"
            | "didnt"
            | "don't"
            | "dont"
            | "doesn't"
            | "doesnt"
            | "couldn't"
            | "couldnt"
            | "shouldn't"
            | "shouldnt"
            | "wouldn't"
            | "wouldnt"
            | "hasn't"
            | "hasnt"
            | "haven't"
            | "havent"
            | "can't"
            | "cant"
            | "cannot"
            | "without"
    )
}
