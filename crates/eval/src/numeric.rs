//! Type coercion and aggregate arithmetic, using `rust_decimal`.
//!
//! No `f64` anywhere in the evaluation path. Coercion is idempotent:
//! applying the same [`TypeSpec`] twice is a no-op.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use statute_core::{OperationKind, TypeSpec, Value};
use tracing::warn;

use crate::error::EvalError;

const EUROCENT: &str = "eurocent";

// ──────────────────────────────────────────────
// Coercion
// ──────────────────────────────────────────────

/// Apply a declared output shape to a computed value.
///
/// - `null` passes through.
/// - `type: "string"` stringifies.
/// - Numbers (and numeric text) are clamped to `min`/`max`, then rounded to
///   `precision` decimals. Precision 0 truncates to an integer; the
///   `eurocent` unit rounds half away from zero to an integer.
/// - Everything else passes through unchanged.
pub fn coerce(value: Value, spec: &TypeSpec) -> Value {
    if value.is_null() {
        return value;
    }
    if spec.type_name.as_deref() == Some("string") {
        return match value {
            Value::Text(_) => value,
            other => Value::Text(other.to_string()),
        };
    }

    let was_int = matches!(value, Value::Int(_));
    let mut d = match numeric_view(&value) {
        Some(d) => d,
        None => return value,
    };

    if let Some(min) = spec.min {
        d = d.max(min);
    }
    if let Some(max) = spec.max {
        d = d.min(max);
    }

    if let Some(p) = spec.precision.filter(|p| *p > 0) {
        d = d.round_dp_with_strategy(p, RoundingStrategy::MidpointAwayFromZero);
    }
    if spec.precision == Some(0) {
        return integral(d.trunc());
    }
    if spec.unit.as_deref() == Some(EUROCENT) {
        return integral(d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero));
    }
    if was_int && d.fract().is_zero() {
        if let Some(v) = to_int(d) {
            return v;
        }
    }
    Value::Number(d)
}

/// Numeric view of a value, accepting numeric text.
pub(crate) fn numeric_view(value: &Value) -> Option<Decimal> {
    match value {
        Value::Text(s) => Decimal::from_str(s.trim()).ok(),
        other => other.as_decimal(),
    }
}

fn to_int(d: Decimal) -> Option<Value> {
    d.to_i64().map(Value::Int)
}

fn integral(d: Decimal) -> Value {
    to_int(d).unwrap_or(Value::Number(d))
}

// ──────────────────────────────────────────────
// Aggregates
// ──────────────────────────────────────────────

/// Reduce operand values with an aggregate operation.
///
/// Nulls are dropped first. With nothing left the result is `Int(0)` for
/// every kind, CONCAT, AND and OR included. DIVIDE needs a dividend and at
/// least one divisor, else it is `Int(0)` too. Arithmetic over integers only
/// stays integral; any decimal operand promotes the result to `Number`.
pub fn aggregate(kind: &OperationKind, values: Vec<Value>) -> Result<Value, EvalError> {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return Ok(Value::Int(0));
    }

    match kind {
        OperationKind::And => Ok(Value::Bool(values.iter().all(Value::is_truthy))),
        OperationKind::Or => Ok(Value::Bool(values.iter().any(Value::is_truthy))),
        OperationKind::Concat => Ok(Value::Text(
            values.iter().map(Value::to_string).collect::<String>(),
        )),
        OperationKind::Min | OperationKind::Max | OperationKind::Add | OperationKind::Multiply
        | OperationKind::Subtract | OperationKind::Divide => arithmetic(kind, &values),
        other => {
            warn!(operation = %other, "not an aggregate operation, yielding 0");
            Ok(Value::Int(0))
        }
    }
}

fn arithmetic(kind: &OperationKind, values: &[Value]) -> Result<Value, EvalError> {
    let all_int = values
        .iter()
        .filter(|v| numeric_view(v).is_some())
        .all(|v| matches!(v, Value::Int(_)));
    let nums: Vec<Decimal> = values.iter().filter_map(numeric_view).collect();
    let (first, rest) = match nums.split_first() {
        Some(split) => split,
        None => return Ok(Value::Int(0)),
    };

    let overflow = |op: &str| EvalError::Overflow {
        message: format!("{} overflow", op),
    };
    let result = match kind {
        OperationKind::Min => nums.iter().copied().fold(*first, Ord::min),
        OperationKind::Max => nums.iter().copied().fold(*first, Ord::max),
        OperationKind::Add => rest.iter().try_fold(*first, |acc, n| {
            acc.checked_add(*n).ok_or_else(|| overflow("addition"))
        })?,
        OperationKind::Multiply => rest.iter().try_fold(*first, |acc, n| {
            acc.checked_mul(*n).ok_or_else(|| overflow("multiplication"))
        })?,
        OperationKind::Subtract => rest.iter().try_fold(*first, |acc, n| {
            acc.checked_sub(*n).ok_or_else(|| overflow("subtraction"))
        })?,
        OperationKind::Divide => {
            if rest.is_empty() {
                return Ok(Value::Int(0));
            }
            let mut acc = *first;
            for n in rest {
                if n.is_zero() {
                    warn!("skipping zero divisor");
                    continue;
                }
                acc = acc.checked_div(*n).ok_or_else(|| overflow("division"))?;
            }
            return Ok(Value::Number(acc));
        }
        _ => return Ok(Value::Int(0)),
    };

    if all_int {
        if let Some(v) = to_int(result) {
            return Ok(v);
        }
    }
    Ok(Value::Number(result))
}
