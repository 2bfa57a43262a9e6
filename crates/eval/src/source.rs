//! Resolution of properties backed by a tabular source.

use std::sync::Arc;

use statute_core::{ActionValue, OperationKind, SourceReference, Value};
use statute_storage::{FilterOp, RowTable, Table};
use tracing::{debug, warn};

use crate::claims::Event;
use crate::engine::Evaluation;
use crate::error::EvalError;

impl Evaluation<'_> {
    /// Look a source reference up. `None` means unresolved: no table, a
    /// filter that could not be applied, a missing field or no rows.
    pub(crate) fn resolve_source(&mut self, source: &SourceReference) -> Result<Option<Value>, EvalError> {
        let Some(table) = self.source_table(source)? else {
            warn!(
                source_type = source.source_type.as_deref().unwrap_or(""),
                table = source.table.as_deref().unwrap_or(""),
                "source table not found"
            );
            return Ok(None);
        };

        let mut selected: Option<Box<dyn Table>> = None;
        for select in &source.select_on {
            let (op, operand) = self.selection(&select.value)?;
            let current: &dyn Table = selected.as_deref().unwrap_or(table.as_ref());
            match current.filter(&select.name, op, &operand) {
                Ok(next) => selected = Some(next),
                Err(e) => {
                    warn!(column = %select.name, error = %e, "cannot apply source filter");
                    return Ok(None);
                }
            }
        }
        let current: &dyn Table = selected.as_deref().unwrap_or(table.as_ref());

        let values: Vec<Value> = if let Some(fields) = &source.fields {
            for missing in fields.iter().filter(|f| !current.has_column(f)) {
                warn!(field = %missing, "source field not found");
            }
            current
                .project(fields)
                .rows()
                .into_iter()
                .map(Value::Map)
                .collect()
        } else if let Some(field) = &source.field {
            if !current.has_column(field) {
                warn!(field = %field, "source field not found");
                return Ok(None);
            }
            current.column_values(field)
        } else {
            current.rows().into_iter().map(Value::Map).collect()
        };

        debug!(rows = values.len(), "source lookup");
        Ok(collapse(values))
    }

    fn source_table(&self, source: &SourceReference) -> Result<Option<Arc<dyn Table>>, EvalError> {
        match source.source_type.as_deref() {
            Some("laws") => Ok(Some(Arc::new(RowTable::new(self.provider.rules_table())))),
            Some("events") => {
                let Some(cases) = self.provider.cases() else {
                    return Ok(None);
                };
                let rows = cases.events_for_case(None)?.iter().map(Event::to_row).collect();
                Ok(Some(Arc::new(RowTable::new(rows))))
            }
            _ => match source.table.as_deref() {
                Some(table) => self.provider.source_table(&self.spec.service, table),
                None => Ok(None),
            },
        }
    }

    /// The filter for one `select_on` entry: membership for an `IN` action,
    /// equality with the resolved value otherwise.
    fn selection(&mut self, value: &ActionValue) -> Result<(FilterOp, Value), EvalError> {
        match value {
            ActionValue::Action(action) if action.operation == Some(OperationKind::In) => {
                let operand = match action.values.as_slice() {
                    [single] => match self.evaluate_value(single)? {
                        Value::List(items) => Value::List(items),
                        other => Value::List(vec![other]),
                    },
                    many => Value::List(
                        many.iter()
                            .map(|v| self.evaluate_value(v))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                };
                Ok((FilterOp::In, operand))
            }
            other => Ok((FilterOp::Eq, self.evaluate_value(other)?)),
        }
    }
}

/// No rows is unresolved, one row its value, several a list.
fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::List(values)),
    }
}
