use serde_json::Value;
use std::collections::HashMap;

/// Field values treated as missing, mirroring the usual CSV NA markers
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
];

/// Error types for tabular parsing
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("No columns to parse from file")]
    NoColumns,

    #[error("{0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Missing => Value::Null,
            Cell::Number(n) => number_to_json(*n),
            Cell::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Render a float as a JSON number, keeping integral values as integers
pub fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// A parsed dataset: named, typed columns and row-ordered cells
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Parse CSV bytes with a header row.
    ///
    /// Column kinds are decided over the whole file: a column is numeric when every
    /// non-missing value is a finite number. A column with no values at all is numeric.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::Fields)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(TableError::NoColumns);
        }

        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            raw_rows.push(
                record
                    .iter()
                    .map(|field| {
                        if is_missing(field) {
                            None
                        } else {
                            Some(field.to_string())
                        }
                    })
                    .collect(),
            );
        }

        let columns: Vec<Column> = dedup_names(headers.iter())
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let numeric = raw_rows
                    .iter()
                    .filter_map(|row| row[idx].as_deref())
                    .all(|value| parse_number(value).is_some());
                Column {
                    name,
                    kind: if numeric {
                        ColumnKind::Numeric
                    } else {
                        ColumnKind::Categorical
                    },
                }
            })
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(columns.iter())
                    .map(|(value, column)| match (value, column.kind) {
                        (None, _) => Cell::Missing,
                        (Some(v), ColumnKind::Numeric) => {
                            parse_number(&v).map(Cell::Number).unwrap_or(Cell::Missing)
                        }
                        (Some(v), ColumnKind::Categorical) => Cell::Text(v),
                    })
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Rename repeated header names `a`, `a` to `a`, `a.1`; a renamed name that is
/// already taken gets suffixed again
fn dedup_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    names
        .map(|name| {
            let mut name = name.to_string();
            let mut seen = counts.get(&name).copied().unwrap_or(0);
            while seen > 0 {
                counts.insert(name.clone(), seen + 1);
                name = format!("{}.{}", name, seen);
                seen = counts.get(&name).copied().unwrap_or(0);
            }
            counts.insert(name.clone(), seen + 1);
            name
        })
        .collect()
}

fn is_missing(field: &str) -> bool {
    MISSING_MARKERS.contains(&field)
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}
