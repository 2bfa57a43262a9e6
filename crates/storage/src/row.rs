use statute_core::Value;

use crate::error::StorageError;
use crate::table::{columns_of, union_columns, FilterOp, Row, Table};

/// Row-oriented in-memory table. Every stored row carries every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowTable {
    /// Build from rows; columns absent from a row are filled with `Null`.
    pub fn new(rows: Vec<Row>) -> Self {
        let columns = columns_of(&rows);
        RowTable::with_columns(columns, rows)
    }

    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                for c in &columns {
                    row.entry(c.clone()).or_insert(Value::Null);
                }
                row
            })
            .collect();
        RowTable { columns, rows }
    }

    pub fn from_json(v: &serde_json::Value) -> Result<Self, StorageError> {
        Ok(RowTable::new(crate::table::rows_from_json(v)?))
    }
}

impl Table for RowTable {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn rows(&self) -> Vec<Row> {
        self.rows.clone()
    }

    fn column_values(&self, name: &str) -> Vec<Value> {
        if !self.columns.iter().any(|c| c == name) {
            return Vec::new();
        }
        self.rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn filter(
        &self,
        column: &str,
        op: FilterOp,
        value: &Value,
    ) -> Result<Box<dyn Table>, StorageError> {
        let mut rows = Vec::new();
        if self.columns.iter().any(|c| c == column) {
            for row in &self.rows {
                let cell = row.get(column).unwrap_or(&Value::Null);
                if op.matches(cell, value)? {
                    rows.push(row.clone());
                }
            }
        }
        Ok(Box::new(RowTable {
            columns: self.columns.clone(),
            rows,
        }))
    }

    fn project(&self, columns: &[String]) -> Box<dyn Table> {
        let kept: Vec<String> = columns
            .iter()
            .filter(|c| self.columns.contains(c))
            .cloned()
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                kept.iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Box::new(RowTable {
            columns: kept,
            rows,
        })
    }

    fn append(&self, other: &dyn Table) -> Box<dyn Table> {
        let columns = union_columns(&self.columns, &other.columns());
        let mut rows = self.rows.clone();
        rows.extend(other.rows());
        Box::new(RowTable::with_columns(columns, rows))
    }
}
