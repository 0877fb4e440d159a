//! Column label cleanup and per-column value typing.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::reader::RecordBatch;

static INVALID_LABEL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]+").expect("static pattern"));

/// Errors that fail a single batch without stopping the run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("columns '{first}' and '{second}' both normalize to '{label}'")]
    LabelCollision {
        label: String,
        first: String,
        second: String,
    },

    #[error("row {row}: timestamp {timestamp} is outside the storable range")]
    TimestampOutOfRange { row: usize, timestamp: DateTime<Utc> },

    #[error("{0}")]
    Write(String),
}

/// Cells the tabular reader treats as a missing value.
const MISSING_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_TOKENS.contains(&cell)
}

/// Collapse every run of characters outside `[0-9A-Za-z_]` into a single `_`.
pub fn normalize_label(label: &str) -> String {
    INVALID_LABEL_RUN.replace_all(label, "_").into_owned()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    /// Narrowest type that holds every non-empty cell.
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut ty: Option<ColumnType> = None;
        for cell in cells.map(str::trim).filter(|c| !is_missing(c)) {
            let cell_ty = if cell.parse::<i64>().is_ok() {
                ColumnType::Integer
            } else if cell.parse::<f64>().is_ok() {
                ColumnType::Float
            } else if parse_bool(cell).is_some() {
                ColumnType::Boolean
            } else {
                return ColumnType::Text;
            };
            ty = Some(match (ty, cell_ty) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Integer), ColumnType::Float)
                | (Some(ColumnType::Float), ColumnType::Integer) => ColumnType::Float,
                _ => return ColumnType::Text,
            });
        }
        // an all-missing column yields no fields either way
        ty.unwrap_or(ColumnType::Float)
    }

    fn convert(self, cell: &str) -> Option<FieldValue> {
        let cell = cell.trim();
        if is_missing(cell) {
            return None;
        }
        match self {
            ColumnType::Integer => cell.parse().ok().map(FieldValue::Integer),
            // line protocol has no spelling for inf
            ColumnType::Float => cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Float),
            ColumnType::Boolean => parse_bool(cell).map(FieldValue::Boolean),
            ColumnType::Text => Some(FieldValue::Text(cell.to_string())),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A batch ready for the store: clean labels, time promoted to the row key.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub index: usize,
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// `None` marks a missing cell.
    pub rows: Vec<Vec<Option<FieldValue>>>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

pub fn normalize_batch(batch: RecordBatch) -> Result<NormalizedBatch, BatchError> {
    let RecordBatch {
        index,
        headers,
        time_index,
        timestamps,
        rows,
    } = batch;

    let labels: Vec<String> = headers.iter().map(|h| normalize_label(h)).collect();
    let mut owners: HashMap<&str, &str> = HashMap::with_capacity(labels.len());
    for (label, original) in labels.iter().zip(headers.iter()) {
        if let Some(first) = owners.insert(label.as_str(), original.as_str()) {
            return Err(BatchError::LabelCollision {
                label: label.clone(),
                first: first.to_string(),
                second: original.clone(),
            });
        }
    }

    let field_indices: Vec<usize> = (0..headers.len()).filter(|&i| i != time_index).collect();
    let column_types: Vec<ColumnType> = field_indices
        .iter()
        .map(|&col| ColumnType::infer(rows.iter().map(|row| row[col].as_str())))
        .collect();

    let typed_rows = rows
        .iter()
        .map(|row| {
            field_indices
                .iter()
                .zip(column_types.iter())
                .map(|(&col, ty)| ty.convert(&row[col]))
                .collect()
        })
        .collect();

    Ok(NormalizedBatch {
        index,
        columns: field_indices.iter().map(|&i| labels[i].clone()).collect(),
        column_types,
        timestamps,
        rows: typed_rows,
    })
}
