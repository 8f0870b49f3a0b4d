//! Core value model for dynamically-typed loan records.
//!
//! Uploaded CSV files carry arbitrary columns, so a record is a mapping from
//! column name to a scalar [`Value`] rather than a fixed struct. The
//! authoritative column order lives in the per-collection metadata record,
//! not in the map itself.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier column every ingested row is guaranteed to carry.
pub const IDENTIFIER_FIELD: &str = "loanNumber";

/// Conventional header alias consulted when no `loanNumber` column exists.
pub const IDENTIFIER_ALIAS: &str = "Loan Number";

/// Scalar cell value: numeric when the raw cell fully parses as a float,
/// otherwise the verbatim string (empty cells stay empty strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// One loan record: column name mapped to its coerced cell value.
pub type Document = BTreeMap<String, Value>;

/// Coerces a raw CSV cell. A cell is numeric iff it is non-empty and fully
/// consumable as a float; anything else is preserved verbatim. Non-finite
/// parses stay textual because they cannot round-trip through JSON.
pub fn coerce_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Text(String::new());
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(raw.to_string()),
    }
}

/// Resolves the identifier for a row of raw cells, in priority order: the
/// `loanNumber` column, the `Loan Number` alias, the first header column's
/// value, and finally a generated fallback. Empty cells do not count.
pub fn resolve_loan_number(fields: &BTreeMap<String, String>, headers: &[String]) -> String {
    for key in [IDENTIFIER_FIELD, IDENTIFIER_ALIAS] {
        if let Some(value) = fields.get(key) {
            if !value.is_empty() {
                return value.clone();
            }
        }
    }
    if let Some(first) = headers.first() {
        if let Some(value) = fields.get(first) {
            if !value.is_empty() {
                return value.clone();
            }
        }
    }
    generated_loan_number(Utc::now())
}

/// Fallback identifier combining the ingestion timestamp with a random suffix.
pub fn generated_loan_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("LOAN-{}-{}", now.timestamp_millis(), suffix)
}

/// Derives a unique collection name from the uploaded filename: extension
/// stripped, non-alphanumeric characters replaced with `_`, truncated to 20
/// characters, then suffixed with the upload timestamp so repeated filenames
/// never collide.
pub fn collection_name_for(filename: &str, uploaded_at: DateTime<Utc>) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(filename);
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(20)
        .collect();
    format!("loans_{}_{}", sanitized, uploaded_at.timestamp_millis())
}
