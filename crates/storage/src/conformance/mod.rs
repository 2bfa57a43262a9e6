//! Conformance test suite for [`Table`] implementations.
//!
//! This module provides a backend-agnostic suite that any `Table`
//! implementation can run to verify it honours the tabular contract:
//!
//! - **Shape**: column order, null filling, row and column access
//! - **Filter**: every operator, missing columns, operand validation
//! - **Project**: column selection and order, unknown columns
//! - **Append**: column union, null filling, row order
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory that builds
//! a table of that backend from rows:
//!
//! ```ignore
//! use statute_storage::conformance::run_conformance_suite;
//!
//! #[test]
//! fn my_backend_conformance() {
//!     let report = run_conformance_suite(|rows| Box::new(MyTable::new(rows)));
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod filter;
mod project;
mod shape;

use std::fmt;

use statute_core::Value;

use crate::{Row, Table};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "filter", "append").
    pub category: String,
    /// Test name (e.g. "filter_eq_matches_cross_numeric").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: result.is_ok(),
            message: result.err(),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a table backend.
///
/// `factory` builds a fresh table of the backend under test from rows;
/// columns missing from a row must read back as `Null`.
pub fn run_conformance_suite<F>(factory: F) -> ConformanceReport
where
    F: Fn(Vec<Row>) -> Box<dyn Table>,
{
    let mut results = Vec::new();

    results.extend(shape::run_shape_tests(&factory));
    results.extend(filter::run_filter_tests(&factory));
    results.extend(project::run_project_tests(&factory));
    results.extend(append::run_append_tests(&factory));

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Three people with income rows, used by most tests.
fn people() -> Vec<Row> {
    vec![
        row(&[
            ("bsn", Value::Text("100".into())),
            ("income", Value::Int(30000)),
            ("partner", Value::Bool(true)),
        ]),
        row(&[
            ("bsn", Value::Text("200".into())),
            ("income", Value::Int(12000)),
            ("partner", Value::Bool(false)),
        ]),
        row(&[
            ("bsn", Value::Text("300".into())),
            ("income", Value::Null),
            ("partner", Value::Bool(false)),
        ]),
    ]
}

fn expect_eq<T: PartialEq + fmt::Debug>(what: &str, got: T, want: T) -> Result<(), String> {
    if got == want {
        Ok(())
    } else {
        Err(format!("{}: expected {:?}, got {:?}", what, want, got))
    }
}

fn bsns(table: &dyn Table) -> Vec<Value> {
    table.column_values("bsn")
}

fn texts(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::Text(s.to_string())).collect()
}
