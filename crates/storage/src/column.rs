use std::collections::BTreeMap;

use statute_core::Value;

use crate::error::StorageError;
use crate::table::{columns_of, union_columns, FilterOp, Row, Table};

/// Column-oriented in-memory table: one value vector per column, all of
/// equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    order: Vec<String>,
    data: BTreeMap<String, Vec<Value>>,
    len: usize,
}

impl ColumnTable {
    pub fn new(rows: Vec<Row>) -> Self {
        let order = columns_of(&rows);
        ColumnTable::from_rows(order, &rows)
    }

    fn from_rows(order: Vec<String>, rows: &[Row]) -> Self {
        let data = order
            .iter()
            .map(|c| {
                let values = rows
                    .iter()
                    .map(|r| r.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                (c.clone(), values)
            })
            .collect();
        ColumnTable {
            order,
            data,
            len: rows.len(),
        }
    }

    /// Rebuild keeping only the row indices in `keep`.
    fn select(&self, keep: &[usize]) -> ColumnTable {
        let data = self
            .data
            .iter()
            .map(|(c, values)| (c.clone(), keep.iter().map(|&i| values[i].clone()).collect()))
            .collect();
        ColumnTable {
            order: self.order.clone(),
            data,
            len: keep.len(),
        }
    }
}

impl Table for ColumnTable {
    fn columns(&self) -> Vec<String> {
        self.order.clone()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn has_column(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    fn rows(&self) -> Vec<Row> {
        (0..self.len)
            .map(|i| {
                self.data
                    .iter()
                    .map(|(c, values)| (c.clone(), values[i].clone()))
                    .collect()
            })
            .collect()
    }

    fn column_values(&self, name: &str) -> Vec<Value> {
        self.data.get(name).cloned().unwrap_or_default()
    }

    fn filter(
        &self,
        column: &str,
        op: FilterOp,
        value: &Value,
    ) -> Result<Box<dyn Table>, StorageError> {
        let mut keep = Vec::new();
        if let Some(values) = self.data.get(column) {
            for (i, cell) in values.iter().enumerate() {
                if op.matches(cell, value)? {
                    keep.push(i);
                }
            }
        }
        Ok(Box::new(self.select(&keep)))
    }

    fn project(&self, columns: &[String]) -> Box<dyn Table> {
        let order: Vec<String> = columns
            .iter()
            .filter(|c| self.data.contains_key(*c))
            .cloned()
            .collect();
        let data = order
            .iter()
            .filter_map(|c| self.data.get(c).map(|v| (c.clone(), v.clone())))
            .collect();
        Box::new(ColumnTable {
            order,
            data,
            len: self.len,
        })
    }

    fn append(&self, other: &dyn Table) -> Box<dyn Table> {
        let order = union_columns(&self.order, &other.columns());
        let mut rows = self.rows();
        rows.extend(other.rows());
        Box::new(ColumnTable::from_rows(order, &rows))
    }
}
