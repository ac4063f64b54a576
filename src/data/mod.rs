//! Record types shared by every pipeline stage
//! Cleaned input records, resolution results, and the loaders that read them

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// A news item as produced by the upstream cleaning stage. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub event_id: String,
    pub timestamp: String,
    pub source: String,
    pub headline_clean: String,
    pub text_clean: String,
    pub url: String,
}

/// Which resolver produced an accepted ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Explicit,
    NameMatch,
    None,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::Explicit => write!(f, "explicit"),
            ResolutionSource::NameMatch => write!(f, "name_match"),
            ResolutionSource::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Accepted,
    Rejected,
}

/// Why a record ended up accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    Cashtag,
    ExchangePrefix,
    QuoteUrl,
    UniqueMatch,
    DominantMatch,
    Ambiguous,
    LowConfidence,
    NoMatch,
    JunkHeadline,
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResolutionReason::Cashtag => "cashtag",
            ResolutionReason::ExchangePrefix => "exchange_prefix",
            ResolutionReason::QuoteUrl => "quote_url",
            ResolutionReason::UniqueMatch => "unique_match",
            ResolutionReason::DominantMatch => "dominant_match",
            ResolutionReason::Ambiguous => "ambiguous",
            ResolutionReason::LowConfidence => "low_confidence",
            ResolutionReason::NoMatch => "no_match",
            ResolutionReason::JunkHeadline => "junk_headline",
        };
        write!(f, "{}", tag)
    }
}

/// Outcome of ticker resolution for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub event_id: String,
    pub ticker: Option<String>,
    pub ticker_confidence: f64,
    pub resolution_source: ResolutionSource,
    pub status: ResolutionStatus,
    pub reason: ResolutionReason,
}

impl ResolutionResult {
    pub fn accepted(
        event_id: &str,
        ticker: String,
        confidence: f64,
        source: ResolutionSource,
        reason: ResolutionReason,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            ticker: Some(ticker),
            ticker_confidence: confidence,
            resolution_source: source,
            status: ResolutionStatus::Accepted,
            reason,
        }
    }

    pub fn rejected(event_id: &str, reason: ResolutionReason) -> Self {
        Self {
            event_id: event_id.to_string(),
            ticker: None,
            ticker_confidence: 0.0,
            resolution_source: ResolutionSource::None,
            status: ResolutionStatus::Rejected,
            reason,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ResolutionStatus::Accepted
    }
}

/// A cleaned record joined with its resolution. Accepted ones are what the
/// labeling stage consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub record: CleanedRecord,
    pub resolution: ResolutionResult,
}

/// Lenient shape of an upstream record. Older cleaning runs kept only
/// `headline`/`text`, newer ones carry both raw and cleaned fields.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    headline_clean: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    text_clean: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn first_non_empty(primary: Option<String>, fallback: Option<String>) -> String {
    primary
        .filter(|s| !s.trim().is_empty())
        .or(fallback)
        .unwrap_or_default()
}

impl RawRecord {
    fn into_cleaned(self) -> Option<CleanedRecord> {
        let event_id = self.event_id.filter(|id| !id.trim().is_empty())?;
        Some(CleanedRecord {
            event_id,
            timestamp: self.timestamp.unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            headline_clean: first_non_empty(self.headline_clean, self.headline),
            text_clean: first_non_empty(self.text_clean, self.text),
            url: self.url.unwrap_or_default(),
        })
    }
}

/// Parse a JSON array of cleaned records. Entries that are not objects or
/// lack an `event_id` are skipped with a warning.
pub fn parse_records(json: &str) -> Result<Vec<CleanedRecord>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).context("Expected a JSON array of records")?;

    let mut records = Vec::with_capacity(values.len());
    for (idx, value) in values.into_iter().enumerate() {
        if !value.is_object() {
            warn!(index = idx, "Skipping non-object record entry");
            continue;
        }
        let raw: RawRecord = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(index = idx, error = %e, "Skipping undecodable record entry");
                continue;
            }
        };
        match raw.into_cleaned() {
            Some(record) => records.push(record),
            None => warn!(index = idx, "Skipping record without event_id"),
        }
    }
    Ok(records)
}

pub fn load_records(path: &Path) -> Result<Vec<CleanedRecord>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    let records = parse_records(&json)
        .with_context(|| format!("Failed to parse records in {}", path.display()))?;
    info!(path = %path.display(), count = records.len(), "Loaded cleaned records");
    Ok(records)
}

/// Drop repeated stories, keeping the first one seen. Records are keyed by
/// URL when present, otherwise by headline plus timestamp.
pub fn dedupe_records(records: Vec<CleanedRecord>) -> Vec<CleanedRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let before = records.len();
    let deduped: Vec<CleanedRecord> = records
        .into_iter()
        .filter(|r| {
            let url = r.url.trim();
            let key = if url.is_empty() {
                (String::new(), format!("{}|{}", r.headline_clean, r.timestamp))
            } else {
                (url.to_string(), String::new())
            };
            seen.insert(key)
        })
        .collect();
    if deduped.len() < before {
        info!(removed = before - deduped.len(), "Removed duplicate records");
    }
    deduped
}

/// Parse a feed timestamp as UTC. Accepts RFC 3339, RFC 2822 (RSS
/// `pubDate`) and naive `YYYY-MM-DD HH:MM:SS`, which is taken as UTC.
pub fn parse_timestamp_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })
}

/// RFC 3339 UTC rendering of a feed timestamp, or the input unchanged when
/// it does not parse.
pub fn normalize_timestamp(raw: &str) -> String {
    parse_timestamp_utc(raw)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| raw.trim().to_string())
}

const SOURCE_CREDIBILITY: &[(&str, &str)] = &[
    ("ap_news_", "high"),
    ("npr_", "high"),
    ("abc_news_", "high"),
    ("cbs_news_", "high"),
    ("nbc_news_", "high"),
];

/// Coarse credibility bucket for a feed source name.
pub fn source_credibility(source: &str) -> &'static str {
    let source = source.to_lowercase();
    SOURCE_CREDIBILITY
        .iter()
        .find(|(prefix, _)| source.starts_with(prefix))
        .map(|(_, rating)| *rating)
        .unwrap_or("unknown")
}

/// Validation helpers
pub mod validation {
    /// Validate an exchange ticker: a leading letter followed by letters,
    /// digits, `.` or `-` (class shares such as BRK.B), at most 10 chars.
    pub fn validate_symbol(symbol: &str) -> Result<(), String> {
        if symbol.is_empty() {
            return Err("Symbol cannot be empty".to_string());
        }

        if symbol.len() > 10 {
            return Err("Symbol too long (max 10 chars)".to_string());
        }

        if !symbol.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err("Symbol must start with an uppercase letter".to_string());
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err("Symbol must contain only A-Z, 0-9, '.' or '-'".to_string());
        }

        Ok(())
    }
}
