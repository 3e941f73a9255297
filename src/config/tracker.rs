// src/config/tracker.rs
//! Tracker configuration: which tickers to poll, how often, where to write,
//! and which scorer to use. Loaded from TOML with env overrides.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "TRACKER_CONFIG_PATH";
pub const ENV_TICKERS: &str = "TRACKER_TICKERS";
pub const ENV_INTERVAL_SECS: &str = "TRACKER_INTERVAL_SECS";
pub const ENV_DATA_ROOT: &str = "TRACKER_DATA_ROOT";
pub const DEFAULT_CONFIG_PATH: &str = "config/tracker.toml";

/// NewsAPI caps `pageSize` at 100.
const MAX_PAGE_SIZE: usize = 100;

fn default_data_root() -> PathBuf {
    PathBuf::from("data/processed/sentiment")
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_page_size() -> usize {
    20
}
fn default_tickers() -> Vec<String> {
    ["AAPL", "TSLA", "AMZN", "NVDA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_aliases() -> HashMap<String, String> {
    [
        ("AAPL", "Apple Inc"),
        ("TSLA", "Tesla"),
        ("AMZN", "Amazon"),
        ("NVDA", "Nvidia"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsApiConfig {
    pub endpoint: String,
    pub language: String,
    pub sort_by: String,
    pub timeout_secs: u64,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://newsapi.org/v2/everything".into(),
            language: "en".into(),
            sort_by: "publishedAt".into(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Built-in lexicon model, no network.
    Lexicon,
    /// Hosted transformer model (FinBERT by default).
    Inference,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub kind: ScorerKind,
    pub model_id: String,
    pub endpoint: String,
    pub batch_size: usize,
    /// "auto" | "cpu" | "mps". Forwarded to the model host; not interpreted here.
    pub device: String,
    /// Per-request timeout for the hosted model (cold starts can be slow).
    pub timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            kind: ScorerKind::Lexicon,
            model_id: "yiyanghkust/finbert-tone".into(),
            endpoint: "https://api-inference.huggingface.co/models".into(),
            batch_size: 16,
            device: "auto".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    /// Full-name alias per ticker, OR-ed into the news query.
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub newsapi: NewsApiConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            interval_secs: default_interval_secs(),
            page_size: default_page_size(),
            tickers: default_tickers(),
            aliases: default_aliases(),
            newsapi: NewsApiConfig::default(),
            scorer: ScorerConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from an explicit TOML path, then validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading tracker config from {}", path.display()))?;
        let cfg: TrackerConfig = toml::from_str(&content)
            .with_context(|| format!("parsing tracker config {}", path.display()))?;
        cfg.validated()
    }

    /// Load using env var + fallbacks:
    /// 1) $TRACKER_CONFIG_PATH
    /// 2) config/tracker.toml
    /// 3) built-in defaults
    ///
    /// Env overrides (`TRACKER_TICKERS`, `TRACKER_INTERVAL_SECS`,
    /// `TRACKER_DATA_ROOT`) are applied on top.
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        base.with_env_overrides()?.validated()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(ENV_TICKERS) {
            self.tickers = raw.split(',').map(|s| s.to_string()).collect();
        }
        if let Ok(raw) = std::env::var(ENV_INTERVAL_SECS) {
            self.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_SECS} must be an integer, got {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var(ENV_DATA_ROOT) {
            if !raw.trim().is_empty() {
                self.data_root = PathBuf::from(raw.trim());
            }
        }
        Ok(self)
    }

    /// Normalize tickers (trim, upper-case, dedup in order) and sanity-check
    /// the numeric knobs.
    pub fn validated(mut self) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        self.tickers = self
            .tickers
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        if self.tickers.is_empty() {
            bail!("at least one ticker must be configured");
        }
        self.aliases = self
            .aliases
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
            .collect();
        if self.interval_secs == 0 {
            bail!("interval_secs must be >= 1");
        }
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        if self.scorer.batch_size == 0 {
            bail!("scorer.batch_size must be >= 1");
        }
        if self.scorer.timeout_secs == 0 {
            bail!("scorer.timeout_secs must be >= 1");
        }
        Ok(self)
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}
