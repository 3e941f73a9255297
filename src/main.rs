//! Ticker sentiment stream: binary entrypoint.
//!
//! `run`        poll news, score, write partitions + snapshot, forever
//! `once`       a single cycle, then exit
//! `score-file` score a csv/json/jsonl file offline
//! `serve`      read-only dashboard API over the snapshot

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use ticker_sentiment_stream::api::{self, AppState};
use ticker_sentiment_stream::config::{ScorerKind, TrackerConfig};
use ticker_sentiment_stream::ingest::providers::NewsApiProvider;
use ticker_sentiment_stream::metrics::Metrics;
use ticker_sentiment_stream::sentiment::build_scorer;
use ticker_sentiment_stream::{init_tracing, score_file, CycleOrchestrator, CycleOutcome};

#[derive(Parser)]
#[command(name = "ticker-sentiment", version, about = "News sentiment snapshots for tracked tickers")]
struct Cli {
    /// Tracker config (TOML). Defaults to $TRACKER_CONFIG_PATH, then config/tracker.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll forever until Ctrl+C / SIGTERM.
    Run {
        /// Also expose Prometheus metrics on this address.
        #[arg(long, env = "METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
    /// Run exactly one cycle.
    Once,
    /// Score a file of texts.
    ScoreFile {
        /// Input file (.csv, .json, .jsonl)
        #[arg(long = "in")]
        input: PathBuf,
        /// Output file (.csv, .parquet, .jsonl)
        #[arg(long = "out")]
        output: PathBuf,
        /// Column containing text
        #[arg(long, default_value = "text")]
        text_col: String,
        /// Use the hosted model instead of the configured scorer.
        #[arg(long)]
        inference: bool,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Compute device hint: auto | cpu | mps
        #[arg(long, value_parser = ["auto", "cpu", "mps"])]
        device: Option<String>,
    },
    /// Serve the dashboard API.
    Serve {
        #[arg(long, env = "DASHBOARD_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    match path {
        Some(p) => TrackerConfig::load_from(p),
        None => TrackerConfig::load_default(),
    }
}

fn build_orchestrator(cfg: &TrackerConfig) -> Result<CycleOrchestrator> {
    // Missing NEWSAPI_KEY is fatal here, before any cycle runs.
    let source = NewsApiProvider::from_env(&cfg.newsapi, cfg.aliases.clone())
        .context("configuring news source")?;
    let scorer = build_scorer(&cfg.scorer)?;
    Ok(CycleOrchestrator::new(cfg, Arc::new(source), scorer))
}

/// Flip the watch channel on Ctrl+C or SIGTERM.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = ?e, "SIGTERM handler unavailable");
                        let _ = ctrl_c.await;
                        let _ = tx.send(true);
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown requested; stopping after the current cycle");
        let _ = tx.send(true);
    });
    rx
}

async fn serve_router(addr: SocketAddr, router: axum::Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router).await.context("http server")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { metrics_addr } => {
            let cfg = load_config(cli.config.as_ref())?;
            if let Some(addr) = metrics_addr {
                let m = Metrics::init()?;
                let router = m.router();
                tokio::spawn(async move {
                    if let Err(e) = serve_router(addr, router).await {
                        tracing::error!(error = ?e, "metrics server stopped");
                    }
                });
            }
            let orchestrator = build_orchestrator(&cfg)?;
            let shutdown = spawn_shutdown_listener();
            orchestrator.run(shutdown).await;
        }
        Command::Once => {
            let cfg = load_config(cli.config.as_ref())?;
            let orchestrator = build_orchestrator(&cfg)?;
            match orchestrator.run_cycle().await {
                CycleOutcome::Persisted { rows, partition } => {
                    println!("wrote {rows} rows to {}", partition.display());
                }
                CycleOutcome::Skipped => println!("no data fetched for any ticker"),
                CycleOutcome::WriteFailed(e) => anyhow::bail!("write failed: {e}"),
            }
        }
        Command::ScoreFile {
            input,
            output,
            text_col,
            inference,
            batch_size,
            device,
        } => {
            let cfg = load_config(cli.config.as_ref())?;
            let mut scorer_cfg = cfg.scorer.clone();
            if inference {
                scorer_cfg.kind = ScorerKind::Inference;
            }
            if let Some(b) = batch_size {
                scorer_cfg.batch_size = b.max(1);
            }
            if let Some(d) = device {
                scorer_cfg.device = d;
            }
            let scorer = build_scorer(&scorer_cfg)?;
            let n = score_file::score_file(&input, &output, &text_col, scorer.as_ref()).await?;
            println!("scored {n} rows -> {}", output.display());
        }
        Command::Serve { addr } => {
            let cfg = load_config(cli.config.as_ref())?;
            let m = Metrics::init()?;
            let state = AppState {
                snapshot: ticker_sentiment_stream::PartitionedStore::new(&cfg.data_root)
                    .snapshot_path(),
            };
            let router = api::router(state).merge(m.router());
            serve_router(addr, router).await?;
        }
    }
    Ok(())
}
