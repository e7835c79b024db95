//! The `Table` type

use super::filter::Expr;
use crate::error::{Error, Result};
use crate::types::JsonObject;
use serde::Serialize;
use serde_json::Value;

/// Ordered columns and JSON-valued rows.
///
/// Rows are stored as mappings; a row without a given column reads as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<JsonObject>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from JSON records.
    ///
    /// Columns are the union of record keys, in first-seen order.
    pub fn from_records(records: Vec<Value>) -> Result<Self> {
        let mut table = Self::new();
        for (i, record) in records.into_iter().enumerate() {
            match record {
                Value::Object(row) => table.push_row(row),
                other => {
                    return Err(Error::decode(format!(
                        "record {i} is not an object: {other}"
                    )))
                }
            }
        }
        Ok(table)
    }

    /// Build a table from column names and positional rows
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut objects = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::decode(format!(
                    "row {i} has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            objects.push(columns.iter().cloned().zip(row).collect());
        }
        Ok(Self {
            columns,
            rows: objects,
        })
    }

    /// Append a row, registering any new column
    pub fn push_row(&mut self, row: JsonObject) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows
    pub fn rows(&self) -> &[JsonObject] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// Values of one column, or `None` if the column is unknown
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        if !self.columns.iter().any(|c| c == name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    /// Keep only rows matching the expression
    pub fn filter(self, expr: &Expr) -> Table {
        let rows = self
            .rows
            .into_iter()
            .filter(|row| expr.evaluate(row))
            .collect();
        Table {
            columns: self.columns,
            rows,
        }
    }

    /// Parse `expression` and keep only matching rows
    pub fn query(self, expression: &str) -> Result<Table> {
        let expr = Expr::parse(expression)?;
        Ok(self.filter(&expr))
    }

    /// Rows `[offset, offset + limit)`, or `[offset, end)` without a limit.
    ///
    /// Out-of-range windows yield an empty table with the same columns.
    pub fn slice(&self, offset: usize, limit: Option<usize>) -> Table {
        let start = offset.min(self.rows.len());
        let end = match limit {
            Some(limit) => start.saturating_add(limit).min(self.rows.len()),
            None => self.rows.len(),
        };
        Table {
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Convert back into JSON records
    pub fn into_records(self) -> Vec<Value> {
        self.rows.into_iter().map(Value::Object).collect()
    }
}
