//! Output table and JSON artifacts
//! One CSV row per resolved record, joining resolution and label columns

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::data::{normalize_timestamp, source_credibility, ResolutionResult, ResolvedRecord};
use crate::labeling::LabelResult;

/// Column order of the output table.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "event_id",
    "timestamp",
    "source",
    "headline",
    "text",
    "url",
    "ticker",
    "ticker_confidence",
    "resolution_source",
    "source_credibility",
    "category",
    "label_severity",
    "label_direction",
    "label_time_horizon_1_min",
    "label_time_horizon_2_min",
    "label_confidence",
    "label_needs_review",
];

/// One output row. Absent values serialize as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub event_id: String,
    pub timestamp: String,
    pub source: String,
    pub headline: String,
    pub text: String,
    pub url: String,
    pub ticker: Option<String>,
    pub ticker_confidence: Option<f64>,
    pub resolution_source: String,
    pub source_credibility: String,
    pub category: Option<String>,
    pub label_severity: Option<u8>,
    pub label_direction: Option<String>,
    pub label_time_horizon_1_min: Option<u32>,
    pub label_time_horizon_2_min: Option<u32>,
    pub label_confidence: Option<f64>,
    pub label_needs_review: Option<bool>,
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl OutputRow {
    pub fn new(resolved: &ResolvedRecord, label: Option<&LabelResult>) -> Self {
        let record = &resolved.record;
        let resolution = &resolved.resolution;

        let mut row = Self {
            event_id: record.event_id.clone(),
            timestamp: normalize_timestamp(&record.timestamp),
            source: single_line(&record.source),
            headline: single_line(&record.headline_clean),
            text: single_line(&record.text_clean),
            url: record.url.trim().to_string(),
            ticker: resolution.ticker.clone(),
            ticker_confidence: resolution.ticker.as_ref().map(|_| resolution.ticker_confidence),
            resolution_source: resolution.resolution_source.to_string(),
            source_credibility: source_credibility(&record.source).to_string(),
            category: None,
            label_severity: None,
            label_direction: None,
            label_time_horizon_1_min: None,
            label_time_horizon_2_min: None,
            label_confidence: None,
            label_needs_review: None,
        };
        if let Some(label) = label {
            row.apply_label(label);
        }
        row
    }

    pub fn apply_label(&mut self, label: &LabelResult) {
        self.category = Some(label.category.to_string());
        self.label_severity = Some(label.label_severity);
        self.label_direction = Some(label.label_direction.to_string());
        self.label_time_horizon_1_min = label.label_time_horizon_1_min;
        self.label_time_horizon_2_min = label.label_time_horizon_2_min;
        self.label_confidence = Some(label.label_confidence);
        self.label_needs_review = Some(label.label_needs_review);
    }

    /// A row counts as labeled once it carries a category, placeholder
    /// included.
    pub fn is_labeled(&self) -> bool {
        self.category.as_deref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

/// Build rows for `records` in their order, attaching labels by `event_id`.
/// Rows already labeled in `existing` keep their previous label columns.
pub fn build_rows(records: &[ResolvedRecord], labels: &[LabelResult], existing: &[OutputRow]) -> Vec<OutputRow> {
    let labels: HashMap<&str, &LabelResult> = labels.iter().map(|l| (l.event_id.as_str(), l)).collect();
    let previous: HashMap<&str, &OutputRow> = existing
        .iter()
        .filter(|row| row.is_labeled())
        .map(|row| (row.event_id.as_str(), row))
        .collect();

    records
        .iter()
        .map(|resolved| {
            let id = resolved.record.event_id.as_str();
            match (labels.get(id), previous.get(id)) {
                (Some(label), _) => OutputRow::new(resolved, Some(label)),
                (None, Some(row)) => (*row).clone(),
                (None, None) => OutputRow::new(resolved, None),
            }
        })
        .collect()
}

pub fn write_rows<W: Write>(writer: W, rows: &[OutputRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv_writer.write_record(OUTPUT_COLUMNS)?;
    }
    for row in rows {
        csv_writer.serialize(row).context("Failed to serialize output row")?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<OutputRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (idx, row) in csv_reader.deserialize().enumerate() {
        let row: OutputRow = row.with_context(|| format!("Failed to decode output row {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_output(path: &Path, rows: &[OutputRow]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_rows(BufWriter::new(file), rows)?;
    let labeled = rows.iter().filter(|r| r.is_labeled()).count();
    info!(path = %path.display(), rows = rows.len(), labeled, "Wrote output table");
    Ok(())
}

/// Rows of an existing output table. A missing file is an empty table.
pub fn read_output(path: &Path) -> Result<Vec<OutputRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_rows(BufReader::new(file)).with_context(|| format!("Failed to read {}", path.display()))
}

/// Event ids that already carry a terminal label.
pub fn labeled_ids(rows: &[OutputRow]) -> HashSet<String> {
    rows.iter()
        .filter(|row| row.is_labeled())
        .map(|row| row.event_id.clone())
        .collect()
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// Resolution results from a previous run, keyed by `event_id`. A missing
/// file means there is nothing to carry over.
pub fn load_previous_results(path: &Path) -> Result<HashMap<String, ResolutionResult>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let results: Vec<ResolutionResult> = read_json(path)?;
    Ok(results.into_iter().map(|r| (r.event_id.clone(), r)).collect())
}
