use statute_core::Value;

use super::{expect_eq, people, row, TestResult};
use crate::{Row, Table};

pub(super) fn run_shape_tests<F>(factory: &F) -> Vec<TestResult>
where
    F: Fn(Vec<Row>) -> Box<dyn Table>,
{
    vec![
        TestResult::from_result("shape", "len_counts_rows", len_counts_rows(factory)),
        TestResult::from_result(
            "shape",
            "has_column_reports_known_columns",
            has_column_reports_known_columns(factory),
        ),
        TestResult::from_result(
            "shape",
            "column_values_in_row_order",
            column_values_in_row_order(factory),
        ),
        TestResult::from_result(
            "shape",
            "missing_cells_read_as_null",
            missing_cells_read_as_null(factory),
        ),
        TestResult::from_result("shape", "empty_table", empty_table(factory)),
    ]
}

fn len_counts_rows<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(people());
    expect_eq("len", table.len(), 3)?;
    expect_eq("is_empty", table.is_empty(), false)
}

fn has_column_reports_known_columns<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    expect_eq("has bsn", table.has_column("bsn"), true)?;
    expect_eq("has age", table.has_column("age"), false)
}

fn column_values_in_row_order<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    expect_eq(
        "income column",
        table.column_values("income"),
        vec![Value::Int(30000), Value::Int(12000), Value::Null],
    )?;
    expect_eq("unknown column", table.column_values("age"), Vec::new())
}

fn missing_cells_read_as_null<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(vec![
        row(&[("a", Value::Int(1))]),
        row(&[("b", Value::Int(2))]),
    ]);
    let rows = table.rows();
    expect_eq("row count", rows.len(), 2)?;
    expect_eq("first row b", rows[0].get("b").cloned(), Some(Value::Null))?;
    expect_eq("second row a", rows[1].get("a").cloned(), Some(Value::Null))
}

fn empty_table<F: Fn(Vec<Row>) -> Box<dyn Table>>(factory: &F) -> Result<(), String> {
    let table = factory(Vec::new());
    expect_eq("len", table.len(), 0)?;
    expect_eq("rows", table.rows(), Vec::<Row>::new())?;
    expect_eq("columns", table.columns(), Vec::<String>::new())
}
