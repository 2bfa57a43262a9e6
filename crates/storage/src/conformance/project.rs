use statute_core::Value;

use super::{expect_eq, people, TestResult};
use crate::{Row, Table};

pub(super) fn run_project_tests<F>(factory: &F) -> Vec<TestResult>
where
    F: Fn(Vec<Row>) -> Box<dyn Table>,
{
    vec![
        TestResult::from_result(
            "project",
            "project_keeps_requested_columns",
            project_keeps_requested_columns(factory),
        ),
        TestResult::from_result(
            "project",
            "project_skips_unknown_columns",
            project_skips_unknown_columns(factory),
        ),
    ]
}

fn project_keeps_requested_columns<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    let out = table.project(&["income".to_string(), "bsn".to_string()]);
    expect_eq(
        "columns",
        out.columns(),
        vec!["income".to_string(), "bsn".to_string()],
    )?;
    let rows = out.rows();
    expect_eq("row count", rows.len(), 3)?;
    expect_eq("row width", rows[0].len(), 2)?;
    expect_eq("first income", rows[0].get("income").cloned(), Some(Value::Int(30000)))
}

fn project_skips_unknown_columns<F: Fn(Vec<Row>) -> Box<dyn Table>>(
    factory: &F,
) -> Result<(), String> {
    let table = factory(people());
    let out = table.project(&["bsn".to_string(), "age".to_string()]);
    expect_eq("columns", out.columns(), vec!["bsn".to_string()])?;
    expect_eq("has age", out.has_column("age"), false)
}
