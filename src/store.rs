// src/store.rs
//! Date-partitioned Parquet store.
//!
//! Layout under `data_root`:
//! - `date=YYYY-MM-DD/part-<epoch_secs>.parquet` (one per cycle, append-only)
//! - `latest.parquet` (most recent cycle, replaced each time)

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::ingest::types::NewsRecord;
use crate::sentiment::ScoredRecord;

pub const SNAPSHOT_FILE: &str = "latest.parquet";

/// Columns of a NewsRecord, in write order.
pub const RECORD_COLUMNS: [&str; 9] = [
    "id",
    "source",
    "ticker",
    "text",
    "created_at",
    "fetched_at",
    "author",
    "url",
    "lang",
];

/// Columns of the sentiment extension, in write order.
pub const SENTIMENT_COLUMNS: [&str; 5] = ["sent_label", "sent_score", "sent_pos", "sent_neu", "sent_neg"];

/// Minimum columns the dashboard needs to render anything.
pub const DASHBOARD_COLUMNS: [&str; 6] = ["ticker", "text", "sent_label", "sent_score", "fetched_at", "source"];

pub fn scored_schema() -> SchemaRef {
    let mut fields: Vec<Field> = RECORD_COLUMNS
        .iter()
        .map(|c| Field::new(*c, DataType::Utf8, false))
        .collect();
    fields.push(Field::new("sent_label", DataType::Utf8, false));
    for c in &SENTIMENT_COLUMNS[1..] {
        fields.push(Field::new(*c, DataType::Float64, false));
    }
    Arc::new(Schema::new(fields))
}

pub fn to_record_batch(rows: &[ScoredRecord]) -> Result<RecordBatch> {
    fn utf8(rows: &[ScoredRecord], f: impl Fn(&NewsRecord) -> &str) -> ArrayRef {
        Arc::new(StringArray::from(
            rows.iter().map(|r| f(&r.record)).collect::<Vec<_>>(),
        ))
    }
    fn f64s(rows: &[ScoredRecord], f: impl Fn(&ScoredRecord) -> f64) -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    }

    let columns: Vec<ArrayRef> = vec![
        utf8(rows, |r| r.id.as_str()),
        utf8(rows, |r| r.source.as_str()),
        utf8(rows, |r| r.ticker.as_str()),
        utf8(rows, |r| r.text.as_str()),
        utf8(rows, |r| r.created_at.as_str()),
        utf8(rows, |r| r.fetched_at.as_str()),
        utf8(rows, |r| r.author.as_str()),
        utf8(rows, |r| r.url.as_str()),
        utf8(rows, |r| r.lang.as_str()),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.sent_label.as_str()).collect::<Vec<_>>(),
        )),
        f64s(rows, |r| r.sent_score),
        f64s(rows, |r| r.sent_pos),
        f64s(rows, |r| r.sent_neu),
        f64s(rows, |r| r.sent_neg),
    ];
    RecordBatch::try_new(scored_schema(), columns).context("building scored record batch")
}

fn write_batch(file: File, path: &Path, batch: &RecordBatch) -> Result<()> {
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

/// Writer for the partitioned layout. Sole writer of `data_root`.
#[derive(Debug, Clone)]
pub struct PartitionedStore {
    root: PathBuf,
}

impl PartitionedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn partition_dir(&self, ts: DateTime<Utc>) -> PathBuf {
        self.root.join(ts.format("date=%Y-%m-%d").to_string())
    }

    pub fn partition_file(&self, ts: DateTime<Utc>) -> PathBuf {
        self.partition_dir(ts)
            .join(format!("part-{}.parquet", ts.timestamp()))
    }

    /// Write one new partition file for the cycle at `ts`.
    /// Refuses to touch an existing file.
    pub fn append(&self, rows: &[ScoredRecord], ts: DateTime<Utc>) -> Result<PathBuf> {
        let dir = self.partition_dir(ts);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = self.partition_file(ts);
        let batch = to_record_batch(rows)?;
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating partition file {}", path.display()))?;
        if let Err(e) = write_batch(file, &path, &batch) {
            // Don't leave a truncated part behind.
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(path)
    }

    /// Replace `latest.parquet` with exactly `rows` (temp file + rename).
    pub fn overwrite_snapshot(&self, rows: &[ScoredRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        let path = self.snapshot_path();
        let tmp = self.root.join(format!("{SNAPSHOT_FILE}.tmp"));
        let batch = to_record_batch(rows)?;
        let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        let replaced = write_batch(file, &tmp, &batch).and_then(|()| {
            fs::rename(&tmp, &path)
                .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))
        });
        if let Err(e) = replaced {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(path)
    }

    /// All partition files, sorted by path (date, then epoch).
    pub fn list_partitions(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e).with_context(|| format!("listing {}", self.root.display())),
        };
        for dir in entries.flatten() {
            let p = dir.path();
            let is_partition = p
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("date="));
            if !p.is_dir() || !is_partition {
                continue;
            }
            for f in fs::read_dir(&p)?.flatten() {
                let fp = f.path();
                if fp.extension().and_then(|e| e.to_str()) == Some("parquet") {
                    out.push(fp);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Column names present in a Parquet file.
pub fn read_column_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata {}", path.display()))?;
    Ok(builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect())
}

fn str_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a StringArray>> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(a) => a
            .as_any()
            .downcast_ref::<StringArray>()
            .map(Some)
            .ok_or_else(|| anyhow!("column {name} is not utf8")),
    }
}

fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a Float64Array>> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(a) => a
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(Some)
            .ok_or_else(|| anyhow!("column {name} is not float64")),
    }
}

fn str_at(a: Option<&StringArray>, i: usize) -> String {
    match a {
        Some(a) if !a.is_null(i) => a.value(i).to_string(),
        _ => String::new(),
    }
}

fn f64_at(a: Option<&Float64Array>, i: usize) -> f64 {
    match a {
        Some(a) if !a.is_null(i) => a.value(i),
        _ => 0.0,
    }
}

/// Read a scored Parquet file back. Dashboard columns are required; the rest
/// default to "" (text) / 0.0 (probabilities) when absent.
pub fn read_records(path: &Path) -> Result<Vec<ScoredRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata {}", path.display()))?
        .build()
        .with_context(|| format!("building parquet reader {}", path.display()))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("reading batch from {}", path.display()))?;
        for c in DASHBOARD_COLUMNS {
            if batch.column_by_name(c).is_none() {
                return Err(anyhow!("{} is missing column {c}", path.display()));
            }
        }
        let cols: Vec<Option<&StringArray>> = RECORD_COLUMNS
            .iter()
            .map(|c| str_column(&batch, c))
            .collect::<Result<_>>()?;
        let label = str_column(&batch, "sent_label")?;
        let score = f64_column(&batch, "sent_score")?;
        let pos = f64_column(&batch, "sent_pos")?;
        let neu = f64_column(&batch, "sent_neu")?;
        let neg = f64_column(&batch, "sent_neg")?;

        for i in 0..batch.num_rows() {
            let record = NewsRecord {
                id: str_at(cols[0], i),
                source: str_at(cols[1], i),
                ticker: str_at(cols[2], i),
                text: str_at(cols[3], i),
                created_at: str_at(cols[4], i),
                fetched_at: str_at(cols[5], i),
                author: str_at(cols[6], i),
                url: str_at(cols[7], i),
                lang: str_at(cols[8], i),
            };
            let sent_label = str_at(label, i)
                .parse()
                .with_context(|| format!("row {i} of {}", path.display()))?;
            out.push(ScoredRecord {
                record,
                sent_label,
                sent_score: f64_at(score, i),
                sent_pos: f64_at(pos, i),
                sent_neu: f64_at(neu, i),
                sent_neg: f64_at(neg, i),
            });
        }
    }
    Ok(out)
}
