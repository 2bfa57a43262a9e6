//! Runtime values and the comparison rules shared by every component.
//!
//! All numeric values use `rust_decimal::Decimal` -- never `f64`. Integers
//! stay `Int` until arithmetic or coercion promotes them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::error::CoreError;

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A named field of a [`Value::Record`].
///
/// `name` is the declared (capitalised) field name, `tag` the serialization
/// name used by rule references such as `$person.birth_date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub name: String,
    pub tag: Option<String>,
    pub value: Value,
}

/// Runtime value produced and consumed during rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(Decimal),
    Text(String),
    Date(Date),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record {
        type_name: String,
        fields: Vec<RecordField>,
    },
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record { .. } => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by requirements and the logical operations:
    /// booleans as-is, numeric zero and null are false, everything else true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Number(d) => !d.is_zero(),
            _ => true,
        }
    }

    /// Numeric view of `Int` and `Number`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Calendar date view: a `Date`, or text that parses as an ISO date or
    /// timestamp.
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Look up one segment of a dotted path.
    ///
    /// Maps are indexed by key. Records match a capitalised segment against
    /// the declared field name and anything else against the field tag.
    /// Every other shape, and every miss, yields `Null`.
    pub fn navigate(&self, segment: &str) -> Value {
        match self {
            Value::Map(entries) => entries.get(segment).cloned().unwrap_or(Value::Null),
            Value::Record { fields, .. } => {
                let by_name = segment.chars().next().is_some_and(char::is_uppercase);
                fields
                    .iter()
                    .find(|f| {
                        if by_name {
                            f.name == segment
                        } else {
                            f.tag.as_deref() == Some(segment)
                        }
                    })
                    .map(|f| f.value.clone())
                    .unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }

    /// Ordered comparison.
    ///
    /// Same-typed values compare naturally, `Int` and `Number` compare
    /// through `Decimal`, and null sorts before everything else. Maps and
    /// records only order when structurally equal. Any other pairing is
    /// [`CoreError::Incomparable`].
    pub fn compare(&self, other: &Value) -> Result<Ordering, CoreError> {
        let ord = match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Number(_), Value::Int(_) | Value::Number(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => return Err(incomparable(self, other)),
                }
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Date(a), Value::Text(b)) => match parse_date(b) {
                Some(b) => a.cmp(&b),
                None => return Err(incomparable(self, other)),
            },
            (Value::Text(a), Value::Date(b)) => match parse_date(a) {
                Some(a) => a.cmp(b),
                None => return Err(incomparable(self, other)),
            },
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y)?;
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(_), Value::Map(_)) | (Value::Record { .. }, Value::Record { .. })
                if self.loose_eq(other) =>
            {
                Ordering::Equal
            }
            _ => return Err(incomparable(self, other)),
        };
        Ok(ord)
    }

    /// Equality with the same cross-numeric rule as [`Value::compare`].
    ///
    /// Maps and records compare structurally and are never incomparable
    /// with each other.
    pub fn equals(&self, other: &Value) -> Result<bool, CoreError> {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, left) in a {
                    match b.get(key) {
                        Some(right) if left.loose_eq(right) => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            (
                Value::Record {
                    type_name: ta,
                    fields: fa,
                },
                Value::Record {
                    type_name: tb,
                    fields: fb,
                },
            ) => {
                if ta != tb || fa.len() != fb.len() {
                    return Ok(false);
                }
                for (x, y) in fa.iter().zip(fb.iter()) {
                    if x.name != y.name || !x.value.loose_eq(&y.value) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(self.compare(other)? == Ordering::Equal),
        }
    }

    /// Equality for membership tests and table filters: incomparable pairs
    /// are simply unequal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.equals(other).unwrap_or(false)
    }

    // ──────────────────────────────────────────────
    // JSON conversion
    // ──────────────────────────────────────────────

    /// Convert a JSON value. Integers become `Int`, other numbers `Number`.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => number_from_json(n),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Dates become `YYYY-MM-DD` strings, records become
    /// objects keyed by tag (falling back to the declared name).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Number(d) => decimal_to_json(*d),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(*d)),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Record { fields, .. } => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|f| {
                        let key = f.tag.clone().unwrap_or_else(|| f.name.clone());
                        (key, f.value.to_json())
                    })
                    .collect(),
            ),
        }
    }
}

fn incomparable(left: &Value, right: &Value) -> CoreError {
    CoreError::Incomparable {
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

fn number_from_json(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Int(i);
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decimal_to_json(d: Decimal) -> serde_json::Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(d.normalize().to_string()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Number(d) => write!(f, "{}", d.normalize()),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", format_date(*d)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Number(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

// ──────────────────────────────────────────────
// Dates
// ──────────────────────────────────────────────

/// Parse an ISO calendar date (`2024-01-31`), an RFC 3339 timestamp, or a
/// naive `YYYY-MM-DDTHH:MM:SS` timestamp. Only the date part is kept.
pub fn parse_date(input: &str) -> Option<Date> {
    let s = input.trim();
    if let Ok(d) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Some(d);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt.date());
    }
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
    .map(|dt| dt.date())
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}
