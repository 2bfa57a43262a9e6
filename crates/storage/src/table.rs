use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use statute_core::Value;

use crate::error::StorageError;

/// One row of a table, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Row filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Ge => ">=",
            FilterOp::Le => "<=",
            FilterOp::In => "in",
        }
    }

    /// Whether a cell passes this filter.
    ///
    /// Equality and membership use [`Value::loose_eq`]. Ordering operators
    /// never match a null cell or an incomparable pair.
    pub fn matches(&self, cell: &Value, operand: &Value) -> Result<bool, StorageError> {
        use std::cmp::Ordering;

        let ord = |cell: &Value| -> Option<Ordering> {
            if cell.is_null() || operand.is_null() {
                return None;
            }
            cell.compare(operand).ok()
        };
        Ok(match self {
            FilterOp::Eq => cell.loose_eq(operand),
            FilterOp::Ne => !cell.loose_eq(operand),
            FilterOp::Gt => ord(cell) == Some(Ordering::Greater),
            FilterOp::Lt => ord(cell) == Some(Ordering::Less),
            FilterOp::Ge => matches!(ord(cell), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Le => matches!(ord(cell), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::In => match operand {
                Value::List(items) => items.iter().any(|item| cell.loose_eq(item)),
                other => {
                    return Err(StorageError::InvalidOperand {
                        op: self.as_str().to_string(),
                        got: other.type_name().to_string(),
                    })
                }
            },
        })
    }
}

impl FromStr for FilterOp {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            "<" => Ok(FilterOp::Lt),
            ">=" => Ok(FilterOp::Ge),
            "<=" => Ok(FilterOp::Le),
            "in" | "IN" => Ok(FilterOp::In),
            other => Err(StorageError::UnknownOperator {
                op: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tabular source contract.
///
/// Every operation returns a new table; implementations never mutate in
/// place. Filtering and projection preserve row order.
///
/// ## Append semantics
///
/// `append` is a union over both tables' column sets. Columns missing on
/// either side are filled with `Null`. Left rows precede right rows, and
/// each side keeps its original order.
pub trait Table: Send + Sync + fmt::Debug {
    /// Column names in first-seen order.
    fn columns(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c == name)
    }

    /// All rows, each carrying every column of the table.
    fn rows(&self) -> Vec<Row>;

    /// One column's values in row order; empty if the column does not exist.
    fn column_values(&self, name: &str) -> Vec<Value>;

    /// Rows whose `column` cell passes `op` against `value`. Filtering on a
    /// column the table lacks yields an empty table.
    fn filter(
        &self,
        column: &str,
        op: FilterOp,
        value: &Value,
    ) -> Result<Box<dyn Table>, StorageError>;

    /// Keep only the named columns that exist, in the requested order.
    fn project(&self, columns: &[String]) -> Box<dyn Table>;

    fn append(&self, other: &dyn Table) -> Box<dyn Table>;
}

/// Column union in first-seen order, left table first.
pub(crate) fn union_columns(left: &[String], right: &[String]) -> Vec<String> {
    let mut columns = left.to_vec();
    for c in right {
        if !columns.contains(c) {
            columns.push(c.clone());
        }
    }
    columns
}

/// Column names in the order rows first mention them.
pub(crate) fn columns_of(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Parse a JSON array of objects into rows.
pub fn rows_from_json(v: &serde_json::Value) -> Result<Vec<Row>, StorageError> {
    let items = v.as_array().ok_or_else(|| StorageError::InvalidData {
        message: "expected a list of row objects".to_string(),
    })?;
    items
        .iter()
        .map(|item| match Value::from_json(item) {
            Value::Map(row) => Ok(row),
            other => Err(StorageError::InvalidData {
                message: format!("expected a row object, got {}", other.type_name()),
            }),
        })
        .collect()
}
