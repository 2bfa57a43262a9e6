//! End-to-end evaluation tests: operations, requirements, outputs and the
//! missing-required contract.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::json;
use statute_core::{CoreError, RuleSpec, RuleSpecRegistry, Value};
use statute_eval::{EvalError, NodeKind, ServiceRequest, Services};

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn spec(service: &str, law: &str, properties: serde_json::Value, requirements: serde_json::Value, actions: serde_json::Value) -> RuleSpec {
    RuleSpec::from_json(&json!({
        "uuid": format!("{}-{}", service, law),
        "name": law,
        "law": law,
        "service": service,
        "valid_from": "2020-01-01",
        "properties": properties,
        "requirements": requirements,
        "actions": actions,
    }))
    .unwrap()
}

fn services(specs: Vec<RuleSpec>) -> Services {
    Services::new(RuleSpecRegistry::new(specs))
}

fn request(date: &str) -> ServiceRequest {
    ServiceRequest::new("SVC", "law", date)
}

fn output(result: &statute_eval::EvaluateResult, name: &str) -> Value {
    result.outputs[name].value.clone()
}

// ──────────────────────────────────────────────
// 1. Operations
// ──────────────────────────────────────────────

#[test]
fn add_literals() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [{"name": "total", "type": "number"}]}),
        json!([]),
        json!([{"output": "total", "operation": "ADD", "values": [3, 4]}]),
    )]);
    let result = svc.run(&request("2025-01-01")).unwrap();
    assert!(result.requirements_met);
    assert_eq!(output(&result, "total"), Value::Int(7));
    assert_eq!(result.outputs["total"].type_name, "number");
}

#[test]
fn foreach_sums_item_fields() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({
            "parameters": [{"name": "items", "type": "array", "required": true}],
            "output": [{"name": "total", "type": "number"}]
        }),
        json!([]),
        json!([{
            "output": "total",
            "operation": "FOREACH",
            "subject": "$items",
            "value": "$v",
            "combine": "ADD"
        }]),
    )]);
    let items = Value::from_json(&json!([{"v": 1}, {"v": 2}, {"v": 3}, {"v": 4}]));
    let result = svc
        .run(&request("2025-01-01").parameter("items", items))
        .unwrap();
    assert_eq!(output(&result, "total"), Value::Int(10));
}

#[test]
fn foreach_over_null_subject_is_zero() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [{"name": "total", "type": "number"}]}),
        json!([]),
        json!([{"output": "total", "operation": "FOREACH", "subject": "$nothing", "value": "$v", "combine": "ADD"}]),
    )]);
    let result = svc.run(&request("2025-01-01")).unwrap();
    assert_eq!(output(&result, "total"), Value::Int(0));
    assert!(!result.missing_required);
}

#[test]
fn if_picks_first_true_branch_else_fallback() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [{"name": "category", "type": "string"}]}),
        json!([]),
        json!([{
            "output": "category",
            "operation": "IF",
            "conditions": [
                {"test": {"operation": "GREATER_THAN", "subject": "$age", "value": 65}, "then": "senior"},
                {"test": {"operation": "LESS_THAN", "subject": "$age", "value": 18}, "then": "minor"},
                {"else": "regular"}
            ]
        }]),
    )]);
    let run = |age: i64| {
        let result = svc.run(&request("2025-01-01").parameter("age", age)).unwrap();
        output(&result, "category")
    };
    assert_eq!(run(70), Value::Text("senior".into()));
    assert_eq!(run(12), Value::Text("minor".into()));
    assert_eq!(run(40), Value::Text("regular".into()));
}

#[test]
fn subtract_date_in_years_and_days() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [{"name": "age", "type": "number"}, {"name": "days", "type": "number"}]}),
        json!([]),
        json!([
            {"output": "age", "operation": "SUBTRACT_DATE", "values": ["$calculation_date", "$birth_date"], "unit": "years"},
            {"output": "days", "operation": "SUBTRACT_DATE", "values": ["2025-01-11", "2025-01-01"]}
        ]),
    )]);
    let result = svc
        .run(&request("2025-06-14").parameter("birth_date", "2000-06-15"))
        .unwrap();
    assert_eq!(output(&result, "age"), Value::Int(24));
    assert_eq!(output(&result, "days"), Value::Int(10));
}

#[test]
fn subtract_date_with_invalid_start_is_fatal() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([{"output": "age", "operation": "SUBTRACT_DATE", "values": ["$calculation_date", "not a date"], "unit": "years"}]),
    )]);
    let err = svc.run(&request("2025-01-01")).unwrap_err();
    assert!(matches!(err, EvalError::InvalidDate { .. }), "got {:?}", err);
}

#[test]
fn membership_and_null_checks() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([
            {"output": "in_list", "operation": "IN", "subject": "$city", "values": ["Utrecht", "Amsterdam"]},
            {"output": "not_in", "operation": "NOT_IN", "subject": "$city", "values": "$excluded"},
            {"output": "missing", "operation": "IS_NULL", "subject": "$unknown"},
            {"output": "present", "operation": "NOT_NULL", "subject": "$city"}
        ]),
    )]);
    let excluded = Value::from_json(&json!(["Rotterdam"]));
    let result = svc
        .run(&request("2025-01-01").parameter("city", "Utrecht").parameter("excluded", excluded))
        .unwrap();
    assert_eq!(output(&result, "in_list"), Value::Bool(true));
    assert_eq!(output(&result, "not_in"), Value::Bool(true));
    assert_eq!(output(&result, "missing"), Value::Bool(true));
    assert_eq!(output(&result, "present"), Value::Bool(true));
}

#[test]
fn incomparable_comparison_is_fatal() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([{"output": "bigger", "operation": "GREATER_THAN", "subject": "abc", "value": 3}]),
    )]);
    let err = svc.run(&request("2025-01-01")).unwrap_err();
    assert!(matches!(err, EvalError::Incomparable { .. }), "got {:?}", err);
}

#[test]
fn comparison_without_operands_is_fatal() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([{"output": "eq", "operation": "EQUALS", "values": [1]}]),
    )]);
    let err = svc.run(&request("2025-01-01")).unwrap_err();
    assert!(matches!(err, EvalError::InvalidOperation { .. }), "got {:?}", err);
}

#[test]
fn unknown_operation_yields_null() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([{"output": "x", "operation": "FROBNICATE", "values": [1]}]),
    )]);
    let result = svc.run(&request("2025-01-01")).unwrap();
    assert_eq!(output(&result, "x"), Value::Null);
}

#[test]
fn and_or_short_circuit() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [
            {"name": "any_set", "type": "boolean"},
            {"name": "all_set", "type": "boolean"},
            {"name": "both_true", "type": "boolean"}
        ]}),
        json!([]),
        json!([
            {"output": "any_set", "operation": "OR", "values": ["$flag", "$never_or"]},
            {"output": "all_set", "operation": "AND", "values": ["$flag", "$zero", "$never_and"]},
            {"output": "both_true", "operation": "AND", "values": ["$flag", 1]}
        ]),
    )]);
    let result = svc
        .run(&request("2025-01-01").parameter("flag", true).parameter("zero", Value::Int(0)))
        .unwrap();
    assert_eq!(output(&result, "any_set"), Value::Bool(true));
    assert_eq!(output(&result, "all_set"), Value::Bool(false));
    assert_eq!(output(&result, "both_true"), Value::Bool(true));

    assert!(result.input.contains_key("flag"));
    assert!(result.input.contains_key("zero"));
    assert!(!result.input.contains_key("never_or"));
    assert!(!result.input.contains_key("never_and"));
}

#[test]
fn empty_and_is_true_empty_or_is_false() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"output": [
            {"name": "none_all", "type": "boolean"},
            {"name": "none_any", "type": "boolean"}
        ]}),
        json!([]),
        json!([
            {"output": "none_all", "operation": "AND", "values": []},
            {"output": "none_any", "operation": "OR", "values": []}
        ]),
    )]);
    let result = svc.run(&request("2025-01-01")).unwrap();
    assert_eq!(output(&result, "none_all"), Value::Bool(true));
    assert_eq!(output(&result, "none_any"), Value::Bool(false));
}

#[test]
fn get_reads_map_entry_and_list_index() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({"definitions": {"RATES": {"A": 10, "B": 20}, "LIST": ["x", "y"]}}),
        json!([]),
        json!([
            {"output": "rate", "operation": "GET", "subject": "$category", "value": "$RATES"},
            {"output": "second", "operation": "GET", "subject": 1, "values": "$LIST"}
        ]),
    )]);
    let result = svc.run(&request("2025-01-01").parameter("category", "B")).unwrap();
    assert_eq!(output(&result, "rate"), Value::Int(20));
    assert_eq!(output(&result, "second"), Value::Text("y".into()));
}

// ──────────────────────────────────────────────
// 2. Coercion and definitions
// ──────────────────────────────────────────────

#[test]
fn outputs_are_coerced_to_type_spec() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({
            "definitions": {"RATE": 0.0125},
            "output": [
                {"name": "capped", "type": "amount", "type_spec": {"unit": "eurocent", "max": 1000}},
                {"name": "rounded", "type": "number", "type_spec": {"precision": 2}}
            ]
        }),
        json!([]),
        json!([
            {"output": "capped", "operation": "MULTIPLY", "values": ["$income", 2]},
            {"output": "rounded", "operation": "MULTIPLY", "values": ["$income", "$RATE"]}
        ]),
    )]);
    let result = svc.run(&request("2025-01-01").parameter("income", 999)).unwrap();
    assert_eq!(output(&result, "capped"), Value::Int(1000));
    // 999 * 0.0125 = 12.4875
    assert_eq!(output(&result, "rounded").as_decimal(), Some(Decimal::new(1249, 2)));
}

// ──────────────────────────────────────────────
// 3. Requirements
// ──────────────────────────────────────────────

fn adult_spec() -> RuleSpec {
    spec(
        "SVC",
        "law",
        json!({"output": [{"name": "allowance", "type": "amount"}]}),
        json!([{"all": [
            {"operation": "GREATER_OR_EQUAL", "subject": "$age", "value": 18},
            {"operation": "EQUALS", "subject": "$insured", "value": true}
        ]}]),
        json!([{"output": "allowance", "value": 100}]),
    )
}

#[test]
fn failing_all_requirement_short_circuits() {
    let svc = services(vec![adult_spec()]);
    let result = svc
        .run(&request("2025-01-01").parameter("age", 17).parameter("insured", true))
        .unwrap();
    assert!(!result.requirements_met);
    assert!(result.outputs.is_empty());
    assert!(result.input.contains_key("age"));
    assert!(!result.input.contains_key("insured"));
}

#[test]
fn passing_requirements_compute_outputs() {
    let svc = services(vec![adult_spec()]);
    let result = svc
        .run(&request("2025-01-01").parameter("age", 30).parameter("insured", true))
        .unwrap();
    assert!(result.requirements_met);
    assert_eq!(output(&result, "allowance"), Value::Int(100));
}

#[test]
fn or_requirement_needs_one_member() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([{"or": [
            {"operation": "EQUALS", "subject": "$a", "value": 1},
            {"operation": "EQUALS", "subject": "$b", "value": 1}
        ]}]),
        json!([{"output": "ok", "value": true}]),
    )]);
    let met = |a: i64, b: i64| {
        svc.run(&request("2025-01-01").parameter("a", a).parameter("b", b))
            .unwrap()
            .requirements_met
    };
    assert!(met(0, 1));
    assert!(met(1, 0));
    assert!(!met(0, 0));
}

#[test]
fn requirement_trace_shape() {
    let svc = services(vec![adult_spec()]);
    let result = svc
        .run(&request("2025-01-01").parameter("age", 17).parameter("insured", true))
        .unwrap();
    let root = &result.path;
    assert_eq!(root.kind, NodeKind::Root);
    let requirements = &root.children[0];
    assert_eq!(requirements.kind, NodeKind::Requirements);
    assert_eq!(requirements.name, "Check all requirements");
    assert_eq!(requirements.result, Value::Bool(false));
    assert_eq!(requirements.children[0].name, "Check ALL conditions");
}

// ──────────────────────────────────────────────
// 4. Missing required values
// ──────────────────────────────────────────────

fn income_spec(required: bool) -> RuleSpec {
    spec(
        "SVC",
        "law",
        json!({
            "parameters": [{"name": "BSN", "type": "string", "required": true}],
            "sources": [{
                "name": "income",
                "type": "amount",
                "required": required,
                "source_reference": {
                    "table": "inkomen",
                    "field": "bedrag",
                    "select_on": [{"name": "bsn", "value": "$BSN"}]
                }
            }],
            "output": [{"name": "result", "type": "amount"}]
        }),
        json!([]),
        json!([{"output": "result", "operation": "ADD", "values": ["$income", 1]}]),
    )
}

#[test]
fn missing_required_source_discards_outputs() {
    let svc = services(vec![income_spec(true)]);
    let result = svc
        .run(&request("2025-01-01").parameter("BSN", "999993653"))
        .unwrap();
    assert!(result.missing_required);
    assert!(!result.requirements_met);
    assert!(result.outputs.is_empty());
}

#[test]
fn missing_optional_source_is_null() {
    let svc = services(vec![income_spec(false)]);
    let result = svc
        .run(&request("2025-01-01").parameter("BSN", "999993653"))
        .unwrap();
    assert!(!result.missing_required);
    assert_eq!(output(&result, "result"), Value::Int(1));
}

#[test]
fn loaded_source_resolves() {
    let svc = services(vec![income_spec(true)]);
    let rows = vec![
        BTreeMap::from([("bsn".to_string(), Value::from("999993653")), ("bedrag".to_string(), Value::Int(41))]),
        BTreeMap::from([("bsn".to_string(), Value::from("111111111")), ("bedrag".to_string(), Value::Int(7))]),
    ];
    svc.set_source_rows("SVC", "inkomen", rows).unwrap();
    let result = svc
        .run(&request("2025-01-01").parameter("BSN", "999993653"))
        .unwrap();
    assert!(!result.missing_required);
    assert_eq!(output(&result, "result"), Value::Int(42));
    assert_eq!(result.input["income"], Value::Int(41));

    svc.reset_sources().unwrap();
    let result = svc
        .run(&request("2025-01-01").parameter("BSN", "999993653"))
        .unwrap();
    assert!(result.missing_required);
}

// ──────────────────────────────────────────────
// 5. Output selection
// ──────────────────────────────────────────────

fn chain_spec() -> RuleSpec {
    spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([
            {"output": "base", "value": 5},
            {"output": "other", "value": 100},
            {"output": "mid", "operation": "ADD", "values": ["$base", 1]},
            {"output": "result", "operation": "MULTIPLY", "values": ["$mid", 2]}
        ]),
    )
}

#[test]
fn requested_output_evaluates_only_its_closure() {
    let svc = services(vec![chain_spec()]);
    let result = svc.run(&request("2025-01-01").requested("result")).unwrap();
    let names: Vec<&str> = result.outputs.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["base", "mid", "result"]);
    assert_eq!(output(&result, "result"), Value::Int(12));
}

#[test]
fn all_outputs_in_declaration_order() {
    let svc = services(vec![chain_spec()]);
    let result = svc.run(&request("2025-01-01")).unwrap();
    assert_eq!(result.outputs.len(), 4);
    let order: Vec<&str> = result
        .path
        .children
        .iter()
        .filter(|n| n.kind == NodeKind::Action)
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(
        order,
        vec![
            "Evaluate action for base",
            "Evaluate action for other",
            "Evaluate action for mid",
            "Evaluate action for result"
        ]
    );
}

#[test]
fn circular_actions_are_fatal() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([
            {"output": "a", "operation": "ADD", "values": ["$b", 1]},
            {"output": "b", "operation": "ADD", "values": ["$a", 1]}
        ]),
    )]);
    let err = svc.run(&request("2025-01-01").requested("a")).unwrap_err();
    match err {
        EvalError::CircularDependency { involved } => assert_eq!(involved, vec!["a", "b"]),
        other => panic!("expected circular dependency, got {:?}", other),
    }
}

// ──────────────────────────────────────────────
// 6. Call errors
// ──────────────────────────────────────────────

#[test]
fn invalid_reference_date() {
    let svc = services(vec![chain_spec()]);
    let err = svc.run(&request("01-01-2025")).unwrap_err();
    assert!(matches!(err, EvalError::InvalidReferenceDate { .. }));
}

#[test]
fn no_spec_in_force() {
    let svc = services(vec![chain_spec()]);
    let err = svc.run(&request("2019-12-31")).unwrap_err();
    assert!(matches!(err, EvalError::Core(CoreError::NoRuleSpec { .. })), "got {:?}", err);
}

#[test]
fn date_pseudo_references() {
    let svc = services(vec![spec(
        "SVC",
        "law",
        json!({}),
        json!([]),
        json!([
            {"output": "year", "value": "$year"},
            {"output": "start", "value": "$january_first"},
            {"output": "prev", "value": "$prev_january_first"}
        ]),
    )]);
    let result = svc.run(&request("2025-03-15")).unwrap();
    assert_eq!(output(&result, "year"), Value::Text("2025".into()));
    assert_eq!(output(&result, "start"), Value::Text("2025-01-01".into()));
    assert_eq!(output(&result, "prev"), Value::Text("2024-01-01".into()));
}
