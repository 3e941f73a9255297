// src/config/mod.rs
pub mod tracker;

pub use tracker::{NewsApiConfig, ScorerConfig, ScorerKind, TrackerConfig};
