use statute_core::Value;
use rust_decimal::Decimal;

use super::{bsns, expect_eq, people, texts, TestResult};
use crate::{FilterOp, Row, StorageError, Table};

pub(super) fn run_filter_tests<F>(factory: &F) -> Vec<TestResult>
where
    F: Fn(Vec<Row>) -> Box<dyn Table>,
{
    vec![
        TestResult::from_result("filter", "filter_eq_selects_rows", filter_eq_selects_rows(factory)),
        TestResult::from_result(
            "filter",
            "filter_eq_matches_cross_numeric",
            filter_eq_matches_cross_numeric(factory),
        ),
        TestResult::from_result("filter", "filter_ne_keeps_nulls", filter_ne_keeps_nulls(factory)),
        TestResult::from_result(
            "filter",
            "filter_ordering_skips_nulls",
            filter_ordering_skips_nulls(factory),
        ),
        TestResult::from_result("filter", "filter_in_uses_list", filter_in_uses_list(factory)),
        TestResult::from_result(
            "filter",
            "filter_in_rejects_scalar",
            filter_in_rejects_scalar(factory),
        ),
        TestResult::from_result(
            "filter",
            "filter_unknown_column_is_empty",
            filter_unknown_column_is_empty(factory),
        ),
        TestResult::from_result("filter", "filters_chain", filters_chain(factory)),
    ]
}

fn filter_eq_selects_rows<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter("bsn", FilterOp::Eq, &Value::Text("200".into()))
        .map_err(|e| e.to_string())?;
    expect_eq("bsns", bsns(out.as_ref()), texts(&["200"]))?;
    expect_eq("columns kept", out.has_column("income"), true)
}

fn filter_eq_matches_cross_numeric<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter("income", FilterOp::Eq, &Value::Number(Decimal::new(120000, 1)))
        .map_err(|e| e.to_string())?;
    expect_eq("bsns", bsns(out.as_ref()), texts(&["200"]))
}

fn filter_ne_keeps_nulls<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter("income", FilterOp::Ne, &Value::Int(30000))
        .map_err(|e| e.to_string())?;
    expect_eq("bsns", bsns(out.as_ref()), texts(&["200", "300"]))
}

fn filter_ordering_skips_nulls<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    let lt = table
        .filter("income", FilterOp::Lt, &Value::Int(20000))
        .map_err(|e| e.to_string())?;
    expect_eq("lt", bsns(lt.as_ref()), texts(&["200"]))?;
    let ge = table
        .filter("income", FilterOp::Ge, &Value::Int(12000))
        .map_err(|e| e.to_string())?;
    expect_eq("ge", bsns(ge.as_ref()), texts(&["100", "200"]))?;
    let gt = table
        .filter("bsn", FilterOp::Gt, &Value::Int(150))
        .map_err(|e| e.to_string())?;
    expect_eq("gt on incomparable", gt.len(), 0)
}

fn filter_in_uses_list<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter(
            "bsn",
            FilterOp::In,
            &Value::List(texts(&["300", "100", "999"])),
        )
        .map_err(|e| e.to_string())?;
    expect_eq("bsns", bsns(out.as_ref()), texts(&["100", "300"]))
}

fn filter_in_rejects_scalar<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    match table.filter("bsn", FilterOp::In, &Value::Text("100".into())) {
        Err(StorageError::InvalidOperand { .. }) => Ok(()),
        Err(other) => Err(format!("expected InvalidOperand, got {}", other)),
        Ok(_) => Err("expected InvalidOperand, got a table".to_string()),
    }
}

fn filter_unknown_column_is_empty<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter("age", FilterOp::Ne, &Value::Int(1))
        .map_err(|e| e.to_string())?;
    expect_eq("len", out.len(), 0)
}

fn filters_chain<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    let out = table
        .filter("partner", FilterOp::Eq, &Value::Bool(false))
        .and_then(|t| t.filter("income", FilterOp::Gt, &Value::Int(0)))
        .map_err(|e| e.to_string())?;
    expect_eq("bsns", bsns(out.as_ref()), texts(&["200"]))
}
