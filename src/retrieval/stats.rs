//! Descriptive statistics over table columns.
//!
//! Shared by the chunk summarizer and the dataset summary endpoint. Missing cells are
//! always skipped.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::table::{number_to_json, Cell, ColumnKind, Table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl NumericStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: values.len(),
            mean: sum / values.len() as f64,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalStats {
    pub count: usize,
    pub unique: usize,
    /// Most frequent value; ties go to the value seen first
    pub top: Option<String>,
}

impl CategoricalStats {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        let mut count = 0;
        for (position, value) in values.into_iter().enumerate() {
            count += 1;
            counts.entry(value).or_insert((0, position)).0 += 1;
        }

        let top = counts
            .iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(value, _)| value.to_string());

        Self {
            count,
            unique: counts.len(),
            top,
        }
    }
}

/// Format a float the way a Python float prints: integral values keep a `.0`,
/// and magnitudes from 1e16 up or below 1e-4 switch to exponent form (`1e+16`, `1.5e-05`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let magnitude = value.abs();
    if value.is_infinite() {
        format!("{}", value)
    } else if magnitude >= 1e16 || (magnitude != 0.0 && magnitude < 1e-4) {
        let scientific = format!("{:e}", value);
        match scientific.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => scientific,
        }
    } else if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Per-column statistics for the dataset summary endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnSummary {
    Numeric {
        mean: f64,
        median: f64,
        mode: Vec<Value>,
        std: Option<f64>,
        min: f64,
        max: f64,
        count: usize,
    },
    Categorical {
        mode: Vec<Value>,
        count: usize,
        unique: usize,
    },
}

/// Summarize every column that has at least one non-missing value
pub fn summarize_table(table: &Table) -> BTreeMap<String, ColumnSummary> {
    let mut summary = BTreeMap::new();

    for (idx, column) in table.columns.iter().enumerate() {
        let cells = table.rows.iter().map(|row| &row[idx]);
        let entry = match column.kind {
            ColumnKind::Numeric => {
                let values: Vec<f64> = cells.filter_map(Cell::as_number).collect();
                numeric_summary(&values)
            }
            ColumnKind::Categorical => {
                let values: Vec<&str> = cells.filter_map(Cell::as_text).collect();
                categorical_summary(&values)
            }
        };
        if let Some(entry) = entry {
            summary.insert(column.name.clone(), entry);
        }
    }

    summary
}

fn numeric_summary(values: &[f64]) -> Option<ColumnSummary> {
    let basic = NumericStats::from_values(values)?;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let std = if values.len() > 1 {
        let variance = values
            .iter()
            .map(|v| (v - basic.mean).powi(2))
            .sum::<f64>()
            / (values.len() - 1) as f64;
        Some(variance.sqrt())
    } else {
        None
    };

    // sorted input makes equal values adjacent, and keeps modes ascending
    let mut modes: Vec<f64> = Vec::new();
    let mut best = 0;
    let mut run_start = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i] != sorted[run_start] {
            let run = i - run_start;
            if run > best {
                best = run;
                modes.clear();
            }
            if run == best {
                modes.push(sorted[run_start]);
            }
            run_start = i;
        }
    }

    Some(ColumnSummary::Numeric {
        mean: basic.mean,
        median,
        mode: modes.into_iter().map(number_to_json).collect(),
        std,
        min: basic.min,
        max: basic.max,
        count: basic.count,
    })
}

fn categorical_summary(values: &[&str]) -> Option<ColumnSummary> {
    if values.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);
    let mode = counts
        .iter()
        .filter(|(_, count)| **count == best)
        .map(|(value, _)| Value::String(value.to_string()))
        .collect();

    Some(ColumnSummary::Categorical {
        mode,
        count: values.len(),
        unique: counts.len(),
    })
}
