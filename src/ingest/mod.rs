// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::{EmptyReason, NewsSource, TickerFetch};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetch_total", "Per-ticker fetch attempts.");
        describe_counter!("ingest_records_total", "Records returned by providers.");
        describe_counter!(
            "ingest_empty_total",
            "Fetches that yielded no records (no articles or failure)."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_fetch_ms", "Provider fetch time in milliseconds.");
        describe_counter!("cycle_runs_total", "Completed ingest cycles.");
        describe_counter!(
            "cycle_skipped_total",
            "Cycles where every ticker came back empty."
        );
        describe_counter!("cycle_rows_written_total", "Scored rows persisted.");
        describe_counter!("cycle_write_errors_total", "Cycles lost to write failures.");
        describe_gauge!("cycle_last_run_ts", "Unix ts of the last finished cycle.");
    });
}

static RE_URL: OnceCell<Regex> = OnceCell::new();
static RE_MENTION: OnceCell<Regex> = OnceCell::new();
static RE_HASHTAG: OnceCell<Regex> = OnceCell::new();
static RE_EMOJI: OnceCell<Regex> = OnceCell::new();
static RE_NONALNUM: OnceCell<Regex> = OnceCell::new();
static RE_WS: OnceCell<Regex> = OnceCell::new();

/// Clean text for models that want plain lower-case words.
///
/// Steps, in order: lower-case, drop URLs (`scheme://` or `www.`), drop
/// `@mentions`, turn `#tag` into `tag`, drop emoji/pictographs, drop anything
/// that is not `[a-z0-9]` or whitespace, collapse whitespace, trim.
/// Idempotent.
pub fn normalize_text(s: &str) -> String {
    let re_url = RE_URL.get_or_init(|| Regex::new(r"[a-z][a-z0-9+.\-]*://\S+|www\.\S+").unwrap());
    let re_mention = RE_MENTION.get_or_init(|| Regex::new(r"@\w+").unwrap());
    let re_hashtag = RE_HASHTAG.get_or_init(|| Regex::new(r"#+(\w*)").unwrap());
    let re_emoji = RE_EMOJI.get_or_init(|| {
        Regex::new(concat!(
            "[",
            "\u{1F600}-\u{1F64F}", // emoticons
            "\u{1F300}-\u{1F5FF}", // symbols & pictographs
            "\u{1F680}-\u{1F6FF}", // transport & map
            "\u{1F1E0}-\u{1F1FF}", // flags
            "\u{1F900}-\u{1FAFF}", // supplemental pictographs
            "\u{2600}-\u{27BF}",   // misc symbols, dingbats
            "]+"
        ))
        .unwrap()
    });
    let re_nonalnum = RE_NONALNUM.get_or_init(|| Regex::new(r"[^a-z0-9\s]+").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let out = s.to_lowercase();
    let out = re_url.replace_all(&out, " ");
    let out = re_mention.replace_all(&out, " ");
    let out = re_hashtag.replace_all(&out, "$1");
    let out = re_emoji.replace_all(&out, " ");
    let out = re_nonalnum.replace_all(&out, " ");
    let out = re_ws.replace_all(&out, " ");
    out.trim().to_string()
}

/// Same as [`normalize_text`] for optional input; `None` yields "".
pub fn normalize_opt(s: Option<&str>) -> String {
    s.map(normalize_text).unwrap_or_default()
}

/// Fetch one ticker through `source`, recording telemetry.
pub async fn ingest_ticker(source: &dyn NewsSource, ticker: &str, page_size: usize) -> TickerFetch {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let res = source.fetch(ticker, page_size).await;

    histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_fetch_total").increment(1);
    match &res {
        TickerFetch::Records(v) => {
            counter!("ingest_records_total").increment(v.len() as u64);
        }
        TickerFetch::Empty(reason) => {
            counter!("ingest_empty_total").increment(1);
            if let EmptyReason::Failed(e) = reason {
                counter!("ingest_provider_errors_total").increment(1);
                tracing::warn!(ticker, provider = source.name(), error = %e, "fetch failed; treating as empty");
            }
        }
    }
    res
}
