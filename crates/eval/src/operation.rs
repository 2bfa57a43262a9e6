//! Operation interpreter.
//!
//! Dispatches on [`OperationKind`]. Every operation records an
//! `operation` node in the trace with its result and the operand values it
//! saw.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use statute_core::{Action, ActionValue, OperationKind, Value};
use time::Date;
use tracing::{debug, warn};

use crate::engine::Evaluation;
use crate::error::EvalError;
use crate::numeric::aggregate;
use crate::path::{NodeKind, PathNode};

impl Evaluation<'_> {
    /// Evaluate an operand: `$references` are resolved, nested actions
    /// evaluated, and literal lists evaluated element-wise.
    pub(crate) fn evaluate_value(&mut self, value: &ActionValue) -> Result<Value, EvalError> {
        match value {
            ActionValue::Action(action) => self.evaluate_action(action),
            ActionValue::Literal(literal) => self.evaluate_literal(literal),
        }
    }

    fn evaluate_literal(&mut self, literal: &Value) -> Result<Value, EvalError> {
        match literal {
            Value::Text(s) if s.starts_with('$') => self.resolve_reference(s),
            Value::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.evaluate_literal(item))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    fn optional_value(&mut self, value: Option<&ActionValue>) -> Result<Value, EvalError> {
        match value {
            Some(v) => self.evaluate_value(v),
            None => Ok(Value::Null),
        }
    }

    /// Evaluate an action: its operation, else its value.
    pub(crate) fn evaluate_action(&mut self, action: &Action) -> Result<Value, EvalError> {
        match &action.operation {
            Some(kind) => self.evaluate_operation(kind, action),
            None => {
                let mut node = PathNode::new(NodeKind::DirectValue, "Direct value assignment");
                if let Some(ActionValue::Literal(raw)) = &action.value {
                    node = node.with_detail("raw_value", raw.to_json());
                }
                self.trace.enter(node);
                let value = self.optional_value(action.value.as_ref());
                self.close(value)
            }
        }
    }

    fn close(&mut self, value: Result<Value, EvalError>) -> Result<Value, EvalError> {
        if let Ok(v) = &value {
            self.trace.current().result = v.clone();
        }
        self.trace.exit();
        value
    }

    fn detail(&mut self, key: &str, value: &Value) {
        self.trace
            .current()
            .details
            .insert(key.to_string(), value.to_json());
    }

    fn evaluate_operation(&mut self, kind: &OperationKind, action: &Action) -> Result<Value, EvalError> {
        self.trace.enter(
            PathNode::new(NodeKind::Operation, format!("Operation: {}", kind))
                .with_detail("operation_type", kind.as_str()),
        );
        let result = self.dispatch(kind, action);
        if let Ok(v) = &result {
            debug!(operation = %kind, result = %v, "computed operation");
        }
        self.close(result)
    }

    fn dispatch(&mut self, kind: &OperationKind, action: &Action) -> Result<Value, EvalError> {
        match kind {
            OperationKind::If => self.if_operation(action),
            OperationKind::Foreach => self.foreach(action),
            OperationKind::In => self.membership(action).map(Value::Bool),
            OperationKind::NotIn => self.membership(action).map(|found| Value::Bool(!found)),
            OperationKind::NotNull | OperationKind::IsNull => {
                let subject = self.optional_value(action.subject.as_ref())?;
                self.detail("subject_value", &subject);
                let is_null = subject.is_null();
                Ok(Value::Bool(if *kind == OperationKind::IsNull { is_null } else { !is_null }))
            }
            OperationKind::And | OperationKind::Or => self.logical(kind, action),
            OperationKind::Equals
            | OperationKind::NotEquals
            | OperationKind::GreaterThan
            | OperationKind::LessThan
            | OperationKind::GreaterOrEqual
            | OperationKind::LessOrEqual => self.comparison(kind, action),
            OperationKind::Get => self.get(action),
            OperationKind::Min
            | OperationKind::Max
            | OperationKind::Add
            | OperationKind::Concat
            | OperationKind::Multiply
            | OperationKind::Subtract
            | OperationKind::Divide => {
                let values = self.operands(action)?;
                self.detail("evaluated_values", &Value::List(values.clone()));
                aggregate(kind, values)
            }
            OperationKind::SubtractDate => self.subtract_date(action),
            OperationKind::Other(tag) => {
                warn!(operation = %tag, "unknown operation, yielding null");
                self.trace
                    .current()
                    .details
                    .insert("error".to_string(), "unknown operation".into());
                Ok(Value::Null)
            }
        }
    }

    fn operands(&mut self, action: &Action) -> Result<Vec<Value>, EvalError> {
        action
            .values
            .iter()
            .map(|v| self.evaluate_value(v))
            .collect()
    }

    // ── Conditionals ─────────────────────────────────────────────

    fn if_operation(&mut self, action: &Action) -> Result<Value, EvalError> {
        let last = action.conditions.len().saturating_sub(1);
        for (i, condition) in action.conditions.iter().enumerate() {
            match &condition.test {
                Some(test) => {
                    if self.evaluate_action(test)?.is_truthy() {
                        self.trace
                            .current()
                            .details
                            .insert("matched_condition".to_string(), i.into());
                        return self.optional_value(condition.then.as_ref());
                    }
                    if i == last {
                        if let Some(otherwise) = &condition.otherwise {
                            return self.evaluate_value(otherwise);
                        }
                    }
                }
                None => {
                    if let Some(otherwise) = &condition.otherwise {
                        return self.evaluate_value(otherwise);
                    }
                }
            }
        }
        Ok(Value::Null)
    }

    // ── Iteration ────────────────────────────────────────────────

    fn foreach(&mut self, action: &Action) -> Result<Value, EvalError> {
        let subject = self.optional_value(action.subject.as_ref())?;
        let items = match subject {
            Value::Null => {
                warn!("no data to run FOREACH on");
                Vec::new()
            }
            Value::List(items) => items,
            single => vec![single],
        };

        let body = match &action.value {
            Some(ActionValue::Literal(Value::List(items))) => items.first().cloned().map(ActionValue::Literal),
            other => other.clone(),
        };

        let mut collected = Vec::new();
        for item in items {
            let saved = self.ctx.bind_local(item_bindings(item));
            let result = self.optional_value(body.as_ref());
            self.ctx.restore_local(saved);
            match result? {
                Value::List(values) => collected.extend(values),
                value => collected.push(value),
            }
        }

        match &action.combine {
            Some(combine) => aggregate(combine, collected),
            None => Ok(Value::List(collected)),
        }
    }

    // ── Membership and logic ─────────────────────────────────────

    fn membership(&mut self, action: &Action) -> Result<bool, EvalError> {
        let (subject, rest) = match &action.subject {
            Some(s) => (self.evaluate_value(s)?, &action.values[..]),
            None => match action.values.split_first() {
                Some((first, rest)) => (self.evaluate_value(first)?, rest),
                None => (Value::Null, &action.values[..]),
            },
        };

        let allowed = match rest {
            [single] => match self.evaluate_value(single)? {
                Value::List(items) => items,
                Value::Map(entries) => entries.into_keys().map(Value::Text).collect(),
                other => vec![other],
            },
            many => many
                .iter()
                .map(|v| self.evaluate_value(v))
                .collect::<Result<Vec<_>, _>>()?,
        };

        self.detail("subject_value", &subject);
        self.detail("allowed_values", &Value::List(allowed.clone()));
        Ok(allowed.iter().any(|v| subject.loose_eq(v)))
    }

    fn logical(&mut self, kind: &OperationKind, action: &Action) -> Result<Value, EvalError> {
        let stop_on = *kind == OperationKind::Or;
        let mut seen = Vec::new();
        let mut result = !stop_on;
        for operand in &action.values {
            let value = self.evaluate_value(operand)?;
            let truthy = value.is_truthy();
            seen.push(value);
            if truthy == stop_on {
                result = stop_on;
                break;
            }
        }
        self.detail("evaluated_values", &Value::List(seen));
        Ok(Value::Bool(result))
    }

    // ── Comparison and lookup ────────────────────────────────────

    fn pair(&mut self, action: &Action) -> Result<(Value, Value), EvalError> {
        match &action.subject {
            Some(subject) => {
                let left = self.evaluate_value(subject)?;
                let right = match (&action.value, action.values.first()) {
                    (Some(v), _) | (None, Some(v)) => self.evaluate_value(v)?,
                    (None, None) => Value::Null,
                };
                Ok((left, right))
            }
            None if action.values.len() >= 2 => {
                let left = self.evaluate_value(&action.values[0])?;
                let right = self.evaluate_value(&action.values[1])?;
                Ok((left, right))
            }
            None => Err(EvalError::InvalidOperation {
                operation: action.operation.as_ref().map(|k| k.to_string()).unwrap_or_default(),
                message: "expects a subject and value or two values".to_string(),
            }),
        }
    }

    fn comparison(&mut self, kind: &OperationKind, action: &Action) -> Result<Value, EvalError> {
        let (left, right) = self.pair(action)?;
        self.detail("subject_value", &left);
        self.detail("comparison_value", &right);

        let ordering = match date_pair(&left, &right) {
            Some((l, r)) => l.cmp(&r),
            None if matches!(kind, OperationKind::Equals | OperationKind::NotEquals) => {
                if left.equals(&right)? {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            }
            None => left.compare(&right)?,
        };

        let result = match kind {
            OperationKind::Equals => ordering == Ordering::Equal,
            OperationKind::NotEquals => ordering != Ordering::Equal,
            OperationKind::GreaterThan => ordering == Ordering::Greater,
            OperationKind::LessThan => ordering == Ordering::Less,
            OperationKind::GreaterOrEqual => ordering != Ordering::Less,
            OperationKind::LessOrEqual => ordering != Ordering::Greater,
            _ => false,
        };
        Ok(Value::Bool(result))
    }

    fn get(&mut self, action: &Action) -> Result<Value, EvalError> {
        let key = self.optional_value(action.subject.as_ref())?;
        let collection = match (&action.value, action.values.first()) {
            (Some(v), _) | (None, Some(v)) => self.evaluate_value(v)?,
            (None, None) => Value::Null,
        };
        let found = match (&collection, &key) {
            (Value::Map(entries), key) => entries.get(&key.to_string()).cloned(),
            (Value::List(items), Value::Int(i)) => usize::try_from(*i).ok().and_then(|i| items.get(i).cloned()),
            (Value::Record { .. }, Value::Text(field)) => Some(collection.navigate(field)),
            _ => None,
        };
        Ok(found.unwrap_or(Value::Null))
    }

    // ── Dates ────────────────────────────────────────────────────

    fn subtract_date(&mut self, action: &Action) -> Result<Value, EvalError> {
        let values = self.operands(action)?;
        let unit = action.unit.as_deref().unwrap_or("days");
        self.detail("evaluated_values", &Value::List(values.clone()));
        self.trace
            .current()
            .details
            .insert("unit".to_string(), unit.into());

        let [end, start] = values.as_slice() else {
            warn!(count = values.len(), "SUBTRACT_DATE requires exactly 2 values");
            return Ok(Value::Int(0));
        };
        let end = end.as_date().unwrap_or(self.ctx.calculation_date);
        let start = match start {
            Value::Null => {
                warn!("SUBTRACT_DATE start date is null");
                return Ok(Value::Null);
            }
            other => other.as_date().ok_or_else(|| EvalError::InvalidDate {
                value: other.to_string(),
                operation: OperationKind::SubtractDate.to_string(),
            })?,
        };

        match date_difference(end, start, unit) {
            Some(diff) => Ok(Value::Int(diff)),
            None => {
                warn!(unit, "unknown date unit");
                Ok(Value::Int(0))
            }
        }
    }
}

/// Loop bindings for one FOREACH item: a map's entries, a record's fields
/// by tag (or name), or the item itself as `value`.
fn item_bindings(item: Value) -> BTreeMap<String, Value> {
    match item {
        Value::Map(entries) => entries,
        Value::Record { fields, .. } => fields
            .into_iter()
            .map(|f| (f.tag.unwrap_or(f.name), f.value))
            .collect(),
        other => BTreeMap::from([("value".to_string(), other)]),
    }
}

/// Both operands as dates, if either one is a date or parses as one.
fn date_pair(left: &Value, right: &Value) -> Option<(Date, Date)> {
    let is_date = |v: &Value| matches!(v, Value::Date(_)) || v.as_str().and_then(statute_core::parse_date).is_some();
    if !is_date(left) && !is_date(right) {
        return None;
    }
    Some((left.as_date()?, right.as_date()?))
}

/// Whole `days`, `months` or `years` from `start` to `end`. Month and year
/// differences count only completed periods.
pub(crate) fn date_difference(end: Date, start: Date, unit: &str) -> Option<i64> {
    let year_diff = i64::from(end.year() - start.year());
    let month_diff = i64::from(u8::from(end.month())) - i64::from(u8::from(start.month()));
    let before_anniversary = (u8::from(end.month()), end.day()) < (u8::from(start.month()), start.day());
    match unit {
        "days" => Some((end - start).whole_days()),
        "years" => Some(year_diff - i64::from(before_anniversary)),
        "months" => Some(year_diff * 12 + month_diff - i64::from(end.day() < start.day())),
        _ => None,
    }
}
