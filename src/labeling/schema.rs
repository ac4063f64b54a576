//! Label schema: enumerations, coercion of loosely typed model output, and
//! validation into a [`ValidatedLabel`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::errors::LabelFault;
use crate::llm::extract_json_object;

pub const REQUIRED_KEYS: [&str; 6] = [
    "category",
    "label_severity",
    "label_direction",
    "label_time_horizon_1_min",
    "label_time_horizon_2_min",
    "confidence",
];

pub const MAX_SEVERITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Earnings,
    Guidance,
    MergersAcquisitions,
    AnalystRating,
    Regulatory,
    Legal,
    Product,
    Management,
    Macro,
    MarketMove,
    Other,
    /// Placeholder for degraded rows; never accepted from the model.
    Unknown,
}

impl Category {
    /// Categories a model may choose.
    pub const ALL: [Category; 11] = [
        Category::Earnings,
        Category::Guidance,
        Category::MergersAcquisitions,
        Category::AnalystRating,
        Category::Regulatory,
        Category::Legal,
        Category::Product,
        Category::Management,
        Category::Macro,
        Category::MarketMove,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Earnings => "earnings",
            Category::Guidance => "guidance",
            Category::MergersAcquisitions => "mergers_acquisitions",
            Category::AnalystRating => "analyst_rating",
            Category::Regulatory => "regulatory",
            Category::Legal => "legal",
            Category::Product => "product",
            Category::Management => "management",
            Category::Macro => "macro",
            Category::MarketMove => "market_move",
            Category::Other => "other",
            Category::Unknown => "unknown",
        }
    }

    /// Lenient parse: case, spacing and punctuation are folded, and a few
    /// common spellings are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded = fold_token(raw);
        let category = match folded.as_str() {
            "earnings" | "earning" => Category::Earnings,
            "guidance" | "outlook" => Category::Guidance,
            "mergers_acquisitions" | "mergers_and_acquisitions" | "m_a" | "merger" | "acquisition" => {
                Category::MergersAcquisitions
            }
            "analyst_rating" | "analyst_ratings" | "rating" => Category::AnalystRating,
            "regulatory" | "regulation" => Category::Regulatory,
            "legal" | "litigation" => Category::Legal,
            "product" => Category::Product,
            "management" | "leadership" => Category::Management,
            "macro" | "macroeconomic" => Category::Macro,
            "market_move" | "market_movement" => Category::MarketMove,
            "other" => Category::Other,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
    Mixed,
    Neutral,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Positive,
        Direction::Negative,
        Direction::Mixed,
        Direction::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
            Direction::Mixed => "mixed",
            Direction::Neutral => "neutral",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match fold_token(raw).as_str() {
            "positive" | "bullish" => Some(Direction::Positive),
            "negative" | "bearish" => Some(Direction::Negative),
            "mixed" => Some(Direction::Mixed),
            "neutral" | "none" => Some(Direction::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON schema handed to backends that can constrain decoding. Types stay
/// loose where [`validate`] coerces; enumerations are closed.
pub fn output_schema() -> Value {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    let directions: Vec<&str> = Direction::ALL.iter().map(|d| d.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "category": {"type": "string", "enum": categories},
            "label_severity": {"type": ["string", "integer", "number"]},
            "label_direction": {"type": "string", "enum": directions},
            "label_time_horizon_1_min": {"type": ["string", "integer", "number", "null"]},
            "label_time_horizon_2_min": {"type": ["string", "integer", "number", "null"]},
            "confidence": {"type": ["string", "number"]},
            "needs_review": {"type": ["string", "boolean", "null"]}
        },
        "required": REQUIRED_KEYS,
    })
}

/// Lowercase and join words with single underscores.
fn fold_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("none")
        }
        _ => false,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Integers, integral floats, and numeric strings of either.
fn coerce_i64(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    coerce_f64(value)
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// Locate the label object in raw model text. A `parameters` wrapper, as
/// some tool-calling models emit, is unwrapped.
pub fn parse_output(raw: &str) -> Result<Map<String, Value>, LabelFault> {
    let mut object = extract_json_object(raw)
        .ok_or_else(|| LabelFault::malformed("no JSON object in model output"))?;

    if let Some(Value::Object(inner)) = object.remove("parameters") {
        object = inner;
    }

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(LabelFault::malformed(format!(
            "missing key(s): {}",
            missing.join(", ")
        )));
    }

    Ok(object)
}

/// A label that passed every schema check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedLabel {
    pub category: Category,
    pub severity: u8,
    pub direction: Direction,
    pub horizon_1_min: Option<u32>,
    pub horizon_2_min: Option<u32>,
    pub confidence: f64,
    pub model_needs_review: bool,
}

fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a Value, LabelFault> {
    object
        .get(key)
        .ok_or_else(|| LabelFault::malformed(format!("missing key: {}", key)))
}

fn horizon(object: &Map<String, Value>, key: &str) -> Result<Option<u32>, LabelFault> {
    let value = field(object, key)?;
    if is_null_like(value) {
        return Ok(None);
    }
    let minutes = coerce_i64(value)
        .ok_or_else(|| LabelFault::invalid(key, format!("expected minutes, got {}", value)))?;
    u32::try_from(minutes)
        .map(Some)
        .map_err(|_| LabelFault::invalid(key, format!("{} is not a non-negative minute count", minutes)))
}

/// Coerce and validate a parsed label object.
pub fn validate(object: &Map<String, Value>) -> Result<ValidatedLabel, LabelFault> {
    let category_value = field(object, "category")?;
    let category = category_value
        .as_str()
        .and_then(Category::parse)
        .ok_or_else(|| LabelFault::invalid("category", format!("unknown category {}", category_value)))?;

    let severity_value = field(object, "label_severity")?;
    let severity = coerce_i64(severity_value)
        .filter(|s| (0..=MAX_SEVERITY as i64).contains(s))
        .ok_or_else(|| {
            LabelFault::invalid(
                "label_severity",
                format!("expected integer 0-{}, got {}", MAX_SEVERITY, severity_value),
            )
        })? as u8;

    let direction_value = field(object, "label_direction")?;
    let direction = direction_value
        .as_str()
        .and_then(Direction::parse)
        .ok_or_else(|| LabelFault::invalid("label_direction", format!("unknown direction {}", direction_value)))?;

    let horizon_1_min = horizon(object, "label_time_horizon_1_min")?;
    let horizon_2_min = horizon(object, "label_time_horizon_2_min")?;
    if let (Some(h1), Some(h2)) = (horizon_1_min, horizon_2_min) {
        if h1 >= h2 {
            return Err(LabelFault::invalid(
                "label_time_horizon_2_min",
                format!("horizon 1 ({}) must be shorter than horizon 2 ({})", h1, h2),
            ));
        }
    }

    let confidence_value = field(object, "confidence")?;
    let confidence = coerce_f64(confidence_value)
        .filter(|c| (0.0..=1.0).contains(c))
        .ok_or_else(|| {
            LabelFault::invalid("confidence", format!("expected number in [0, 1], got {}", confidence_value))
        })?;

    let model_needs_review = object.get("needs_review").map(coerce_bool).unwrap_or(false);

    Ok(ValidatedLabel {
        category,
        severity,
        direction,
        horizon_1_min,
        horizon_2_min,
        confidence,
        model_needs_review,
    })
}

/// Terminal labeling output for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub event_id: String,
    pub category: Category,
    pub label_severity: u8,
    pub label_direction: Direction,
    pub label_time_horizon_1_min: Option<u32>,
    pub label_time_horizon_2_min: Option<u32>,
    pub label_confidence: f64,
    pub label_needs_review: bool,
}

impl LabelResult {
    pub fn from_validated(event_id: &str, label: ValidatedLabel, confidence_floor: f64) -> Self {
        let needs_review = label.model_needs_review || label.confidence < confidence_floor;
        Self {
            event_id: event_id.to_string(),
            category: label.category,
            label_severity: label.severity,
            label_direction: label.direction,
            label_time_horizon_1_min: label.horizon_1_min,
            label_time_horizon_2_min: label.horizon_2_min,
            label_confidence: label.confidence,
            label_needs_review: needs_review,
        }
    }

    /// Degraded row written when every attempt failed validation.
    pub fn placeholder(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            category: Category::Unknown,
            label_severity: 0,
            label_direction: Direction::Neutral,
            label_time_horizon_1_min: None,
            label_time_horizon_2_min: None,
            label_confidence: 0.0,
            label_needs_review: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.category == Category::Unknown
    }
}
