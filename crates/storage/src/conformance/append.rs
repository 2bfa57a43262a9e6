use statute_core::Value;

use super::{expect_eq, people, row, TestResult};
use crate::{Row, Table};

pub(super) fn run_append_tests<F>(factory: &F) -> Vec<TestResult>
where
    F: Fn(Vec<Row>) -> Box<dyn Table>,
{
    vec![
        TestResult::from_result(
            "append",
            "append_unions_columns",
            append_unions_columns(factory),
        ),
        TestResult::from_result(
            "append",
            "append_keeps_left_rows_first",
            append_keeps_left_rows_first(factory),
        ),
        TestResult::from_result(
            "append",
            "append_fills_missing_with_null",
            append_fills_missing_with_null(factory),
        ),
        TestResult::from_result(
            "append",
            "append_to_empty_table",
            append_to_empty_table(factory),
        ),
    ]
}

fn extra() -> Vec<Row> {
    vec![
        row(&[("bsn", Value::Text("400".into())), ("age", Value::Int(40))]),
        row(&[("bsn", Value::Text("500".into())), ("age", Value::Int(50))]),
    ]
}

fn append_unions_columns<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let left = factory(people());
    let right = factory(extra());
    let merged = left.append(right.as_ref());
    for c in ["bsn", "income", "partner", "age"] {
        expect_eq(c, merged.has_column(c), true)?;
    }
    expect_eq("len", merged.len(), 5)
}

fn append_keeps_left_rows_first<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let merged = factory(people()).append(factory(extra()).as_ref());
    expect_eq(
        "bsn order",
        merged.column_values("bsn"),
        ["100", "200", "300", "400", "500"]
            .iter()
            .map(|s| Value::Text(s.to_string()))
            .collect(),
    )
}

fn append_fills_missing_with_null<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let merged = factory(people()).append(factory(extra()).as_ref());
    expect_eq(
        "age",
        merged.column_values("age"),
        vec![Value::Null, Value::Null, Value::Null, Value::Int(40), Value::Int(50)],
    )?;
    let rows = merged.rows();
    expect_eq("last income", rows[4].get("income").cloned(), Some(Value::Null))
}

fn append_to_empty_table<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let merged = factory(Vec::new()).append(factory(extra()).as_ref());
    expect_eq("len", merged.len(), 2)?;
    expect_eq("columns", merged.columns(), vec!["age".to_string(), "bsn".to_string()])
}
