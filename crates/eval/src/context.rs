//! Per-call evaluation state.

use std::collections::{BTreeMap, HashMap};

use statute_core::{format_date, Value};
use time::{Date, Month};

use crate::claims::Claim;

/// Caller-supplied values keyed by service, then field.
pub type Overwrite = BTreeMap<String, BTreeMap<String, Value>>;

/// Mutable state of a single evaluation call. Never shared between calls.
#[derive(Debug)]
pub struct RuleContext<'a> {
    pub definitions: &'a BTreeMap<String, Value>,
    pub parameters: BTreeMap<String, Value>,
    /// Loop-local bindings; only non-empty inside FOREACH.
    pub local: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
    pub claims: BTreeMap<String, Claim>,
    pub overwrite: Overwrite,
    /// Cross-service results memoized by [`cache_key`](Self::cache_key).
    pub cache: HashMap<String, Value>,
    /// Every `$` reference resolved during the call, without its sigil.
    pub resolved: BTreeMap<String, Value>,
    pub missing_required: bool,
    pub approved: bool,
    pub calculation_date: Date,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        definitions: &'a BTreeMap<String, Value>,
        parameters: BTreeMap<String, Value>,
        overwrite: Overwrite,
        calculation_date: Date,
        approved: bool,
    ) -> Self {
        RuleContext {
            definitions,
            parameters,
            local: BTreeMap::new(),
            outputs: BTreeMap::new(),
            claims: BTreeMap::new(),
            overwrite,
            cache: HashMap::new(),
            resolved: BTreeMap::new(),
            missing_required: false,
            approved,
            calculation_date,
        }
    }

    /// Values of the calculation-date pseudo references.
    pub fn date_value(&self, name: &str) -> Option<Value> {
        let date = self.calculation_date;
        let first_of = |year: i32| Date::from_calendar_date(year, Month::January, 1).ok();
        match name {
            "calculation_date" => Some(Value::Text(format_date(date))),
            "january_first" => first_of(date.year()).map(|d| Value::Text(format_date(d))),
            "prev_january_first" => first_of(date.year() - 1).map(|d| Value::Text(format_date(d))),
            "year" => Some(Value::Text(format!("{:04}", date.year()))),
            _ => None,
        }
    }

    /// Overlay loop bindings on the local scope, returning the previous
    /// scope for [`restore_local`](Self::restore_local).
    pub fn bind_local(&mut self, bindings: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut scope = self.local.clone();
        scope.extend(bindings);
        std::mem::replace(&mut self.local, scope)
    }

    pub fn restore_local(&mut self, saved: BTreeMap<String, Value>) {
        self.local = saved;
    }

    /// Memoization key of a cross-service fact: the reference path, the
    /// sorted parameters as JSON and the reference date.
    pub fn cache_key(path: &str, parameters: &BTreeMap<String, Value>, reference_date: &str) -> String {
        let params: Vec<String> = parameters
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v.to_json()))
            .collect();
        format!("{}({},{})", path, params.join(","), reference_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn context(defs: &BTreeMap<String, Value>) -> RuleContext<'_> {
        RuleContext::new(defs, BTreeMap::new(), Overwrite::new(), date!(2025 - 03 - 15), false)
    }

    #[test]
    fn date_pseudo_values() {
        let defs = BTreeMap::new();
        let ctx = context(&defs);
        assert_eq!(ctx.date_value("calculation_date"), Some(Value::Text("2025-03-15".into())));
        assert_eq!(ctx.date_value("january_first"), Some(Value::Text("2025-01-01".into())));
        assert_eq!(ctx.date_value("prev_january_first"), Some(Value::Text("2024-01-01".into())));
        assert_eq!(ctx.date_value("year"), Some(Value::Text("2025".into())));
        assert_eq!(ctx.date_value("income"), None);
    }

    #[test]
    fn local_scope_restores() {
        let defs = BTreeMap::new();
        let mut ctx = context(&defs);
        let outer = ctx.bind_local(BTreeMap::from([("a".to_string(), Value::Int(1))]));
        assert!(outer.is_empty());
        let inner = ctx.bind_local(BTreeMap::from([("b".to_string(), Value::Int(2))]));
        assert_eq!(ctx.local.len(), 2);
        ctx.restore_local(inner);
        assert_eq!(ctx.local.len(), 1);
        ctx.restore_local(outer);
        assert!(ctx.local.is_empty());
    }

    #[test]
    fn cache_key_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("BSN".to_string(), Value::Text("123".into()));
        a.insert("YEAR".to_string(), Value::Int(2025));
        let mut b = BTreeMap::new();
        b.insert("YEAR".to_string(), Value::Int(2025));
        b.insert("BSN".to_string(), Value::Text("123".into()));
        let ka = RuleContext::cache_key("age", &a, "2025-01-01");
        assert_eq!(ka, RuleContext::cache_key("age", &b, "2025-01-01"));
        assert_eq!(ka, "age(BSN:\"123\",YEAR:2025,2025-01-01)");
        assert_ne!(ka, RuleContext::cache_key("age", &a, "2024-01-01"));
    }

    #[test]
    fn cache_key_keeps_value_types_apart() {
        let key = |v: Value| RuleContext::cache_key("age", &BTreeMap::from([("BSN".to_string(), v)]), "2025-01-01");
        assert_ne!(key(Value::Text("123".into())), key(Value::Int(123)));
        assert_ne!(key(Value::Text("true".into())), key(Value::Bool(true)));

        let split = BTreeMap::from([
            ("A".to_string(), Value::Text("1,B:2".into())),
        ]);
        let pair = BTreeMap::from([
            ("A".to_string(), Value::Int(1)),
            ("B".to_string(), Value::Int(2)),
        ]);
        assert_ne!(
            RuleContext::cache_key("age", &split, "2025-01-01"),
            RuleContext::cache_key("age", &pair, "2025-01-01")
        );
    }
}
