// src/score_file.rs
//! One-shot scoring of a tabular file: read `.csv`/`.json`/`.jsonl`, score a
//! text column, write `.csv`/`.parquet`/`.jsonl` with the class columns added.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value};

use crate::ingest::normalize_text;
use crate::sentiment::{SentimentScorer, SentimentScores};

pub const SCORE_COLUMNS: [&str; 4] = ["label", "score_positive", "score_neutral", "score_negative"];

/// Untyped rows; every cell is text or null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        bail!(
            "Input file not found: {}. Create it or check the path.",
            path.display()
        );
    }
    match extension(path).as_str() {
        "csv" => read_csv(path),
        "jsonl" => read_json_values(read_jsonl(path)?),
        // a .json file may hold either an array or one object per line
        "json" => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(v) => read_json_values(v),
                Err(_) => read_json_values(read_jsonl(path)?),
            }
        }
        other => bail!("Unsupported file type: .{other}"),
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("reading {}", path.display()))?;
        let mut row: Vec<Option<String>> = rec.iter().map(|c| Some(c.to_string())).collect();
        row.resize(columns.len(), None);
        rows.push(row);
    }
    Ok(Table { columns, rows })
}

fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let v: Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid json", path.display(), i + 1))?;
        out.push(v);
    }
    Ok(out)
}

fn read_json_values(values: Vec<Value>) -> Result<Table> {
    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(values.len());
    for v in values {
        let Value::Object(obj) = v else {
            bail!("expected one JSON object per row");
        };
        for k in obj.keys() {
            if !columns.contains(k) {
                columns.push(k.clone());
            }
        }
        objects.push(obj);
    }
    let rows = objects
        .iter()
        .map(|obj| {
            columns
                .iter()
                .map(|c| match obj.get(c) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect()
        })
        .collect();
    Ok(Table { columns, rows })
}

/// Score `text_col` of every row. Nulls score as "".
pub async fn score_table(
    table: &Table,
    text_col: &str,
    scorer: &dyn SentimentScorer,
) -> Result<Vec<SentimentScores>> {
    let idx = table
        .column_index(text_col)
        .ok_or_else(|| anyhow!("Column '{text_col}' not found"))?;
    let texts: Vec<String> = table
        .rows
        .iter()
        .map(|r| {
            let raw = r.get(idx).cloned().flatten().unwrap_or_default();
            if scorer.wants_clean_input() {
                normalize_text(&raw)
            } else {
                raw
            }
        })
        .collect();
    let scores = scorer.score(&texts).await?;
    if scores.len() != texts.len() {
        bail!("scorer returned {} results for {} rows", scores.len(), texts.len());
    }
    Ok(scores)
}

fn label_upper(s: &SentimentScores) -> String {
    s.label.as_str().to_ascii_uppercase()
}

pub fn write_scored(path: &Path, table: &Table, scores: &[SentimentScores]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    match extension(path).as_str() {
        "csv" => write_csv(path, table, scores),
        "jsonl" => write_jsonl(path, table, scores),
        "parquet" => write_parquet(path, table, scores),
        other => bail!("Unsupported output type: .{other}"),
    }
}

fn write_csv(path: &Path, table: &Table, scores: &[SentimentScores]) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    let header: Vec<&str> = table
        .columns
        .iter()
        .map(String::as_str)
        .chain(SCORE_COLUMNS)
        .collect();
    w.write_record(&header)?;
    for (row, s) in table.rows.iter().zip(scores) {
        let mut rec: Vec<String> = row.iter().map(|c| c.clone().unwrap_or_default()).collect();
        rec.push(label_upper(s));
        rec.extend([s.pos, s.neu, s.neg].iter().map(|x| x.to_string()));
        w.write_record(&rec)?;
    }
    w.flush()?;
    Ok(())
}

fn write_jsonl(path: &Path, table: &Table, scores: &[SentimentScores]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for (row, s) in table.rows.iter().zip(scores) {
        let mut obj = Map::new();
        for (c, v) in table.columns.iter().zip(row) {
            obj.insert(c.clone(), v.clone().map(Value::String).unwrap_or(Value::Null));
        }
        obj.insert("label".into(), Value::String(label_upper(s)));
        obj.insert("score_positive".into(), s.pos.into());
        obj.insert("score_neutral".into(), s.neu.into());
        obj.insert("score_negative".into(), s.neg.into());
        serde_json::to_writer(&mut w, &Value::Object(obj))?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, table: &Table, scores: &[SentimentScores]) -> Result<()> {
    let mut fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(c, DataType::Utf8, true))
        .collect();
    fields.push(Field::new("label", DataType::Utf8, false));
    for c in &SCORE_COLUMNS[1..] {
        fields.push(Field::new(*c, DataType::Float64, false));
    }

    let mut columns: Vec<ArrayRef> = (0..table.columns.len())
        .map(|i| {
            Arc::new(StringArray::from(
                table
                    .rows
                    .iter()
                    .map(|r| r.get(i).cloned().flatten())
                    .collect::<Vec<Option<String>>>(),
            )) as ArrayRef
        })
        .collect();
    columns.push(Arc::new(StringArray::from(
        scores.iter().map(label_upper).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(Float64Array::from(scores.iter().map(|s| s.pos).collect::<Vec<_>>())));
    columns.push(Arc::new(Float64Array::from(scores.iter().map(|s| s.neu).collect::<Vec<_>>())));
    columns.push(Arc::new(Float64Array::from(scores.iter().map(|s| s.neg).collect::<Vec<_>>())));

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building scored file batch")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Read `input`, score `text_col`, write `output`. Returns the row count.
pub async fn score_file(
    input: &Path,
    output: &Path,
    text_col: &str,
    scorer: &dyn SentimentScorer,
) -> Result<usize> {
    let table = read_table(input)?;
    if table.column_index(text_col).is_none() {
        bail!("Column '{text_col}' not found in: {}", input.display());
    }
    let scores = score_table(&table, text_col, scorer).await?;
    write_scored(output, &table, &scores)?;
    tracing::info!(
        rows = table.rows.len(),
        input = %input.display(),
        output = %output.display(),
        "scored file"
    );
    Ok(table.rows.len())
}
