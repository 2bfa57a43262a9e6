//! CLI integration tests for the `statute` binary.
//!
//! Each test writes its rule files into a fresh temporary directory and
//! runs the binary with that directory as working directory, so the
//! default `rules` directory and `statute.toml` resolve inside it.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper: create a Command for the `statute` binary, rooted at `dir`.
fn statute(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("statute");
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_json(path: &Path, value: &serde_json::Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// An allowance of 100 below an income of 30000, else 0.
fn allowance_rule() -> serde_json::Value {
    json!({
        "uuid": "toeslag-test",
        "name": "Test allowance",
        "law": "test_toeslag",
        "service": "TOESLAGEN",
        "valid_from": "2020-01-01",
        "properties": {
            "parameters": [{"name": "income", "type": "number", "required": true}],
            "output": [{"name": "allowance", "type": "number"}]
        },
        "actions": [{
            "output": "allowance",
            "operation": "IF",
            "conditions": [
                {"test": {"operation": "LESS_THAN", "subject": "$income", "value": 30000}, "then": 100},
                {"else": 0}
            ]
        }]
    })
}

/// Reads a registered income from the `inkomen` table.
fn income_rule() -> serde_json::Value {
    json!({
        "uuid": "belasting-test",
        "law": "inkomstenbelasting",
        "service": "BELASTINGDIENST",
        "valid_from": "2020-01-01",
        "properties": {
            "parameters": [{"name": "BSN", "type": "string", "required": true}],
            "sources": [{
                "name": "income",
                "type": "number",
                "required": true,
                "source_reference": {
                    "table": "inkomen",
                    "field": "bedrag",
                    "select_on": [{"name": "bsn", "value": "$BSN"}]
                }
            }],
            "output": [{"name": "high_income", "type": "boolean"}]
        },
        "actions": [{
            "output": "high_income",
            "operation": "GREATER_THAN",
            "subject": "$income",
            "value": 50000
        }]
    })
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_json(&dir.path().join("rules/toeslagen/allowance.json"), &allowance_rule());
    write_json(&dir.path().join("rules/belastingdienst/income.json"), &income_rule());
    dir
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    statute(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluate legal rule specifications"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    statute(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("statute"));
}

#[test]
fn eval_help_lists_flags() {
    let dir = TempDir::new().unwrap();
    statute(dir.path())
        .args(["eval", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--service"))
        .stdout(predicate::str::contains("--overwrite"));
}

// ──────────────────────────────────────────────
// 2. eval
// ──────────────────────────────────────────────

#[test]
fn eval_text_output() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2025-01-01",
            "--param",
            "income=25000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("TOESLAGEN / test_toeslag @ 2025-01-01"))
        .stdout(predicate::str::contains("requirements met: yes"))
        .stdout(predicate::str::contains("allowance = 100"));
}

#[test]
fn eval_json_output() {
    let dir = workspace();
    let output = statute(dir.path())
        .args([
            "--output",
            "json",
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2025-01-01",
            "--param",
            "income=45000",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["service"], "TOESLAGEN");
    assert_eq!(json["reference_date"], "2025-01-01");
    assert_eq!(json["requirements_met"], true);
    assert_eq!(json["missing_required"], false);
    assert_eq!(json["outputs"]["allowance"]["value"], 0);
    assert!(json.get("explain").is_none());
}

#[test]
fn eval_params_file() {
    let dir = workspace();
    write_json(&dir.path().join("params.json"), &json!({"income": 12000}));
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2025-01-01",
            "--params",
            "params.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("allowance = 100"));
}

#[test]
fn eval_with_source_rows() {
    let dir = workspace();
    write_json(
        &dir.path().join("inkomen.json"),
        &json!([
            {"bsn": "999993653", "bedrag": 62000},
            {"bsn": "111222333", "bedrag": 18000}
        ]),
    );
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "BELASTINGDIENST",
            "--law",
            "inkomstenbelasting",
            "--date",
            "2025-01-01",
            "--param",
            "BSN=\"999993653\"",
            "--source",
            "BELASTINGDIENST:inkomen=inkomen.json",
            "--explain",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("high_income = true"))
        .stdout(predicate::str::contains("values used:"))
        .stdout(predicate::str::contains("income = 62000 (SOURCE"));
}

#[test]
fn eval_missing_source_reports_missing_required() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "BELASTINGDIENST",
            "--law",
            "inkomstenbelasting",
            "--date",
            "2025-01-01",
            "--param",
            "BSN=\"999993653\"",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing required: yes"))
        .stdout(predicate::str::contains("no outputs"));
}

#[test]
fn eval_overwrite_replaces_output() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2025-01-01",
            "--param",
            "income=25000",
            "--overwrite",
            "TOESLAGEN.allowance=7",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("allowance = 7"));
}

#[test]
fn eval_unknown_law_fails() {
    let dir = workspace();
    statute(dir.path())
        .args(["eval", "--service", "TOESLAGEN", "--law", "nope", "--date", "2025-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn eval_before_valid_from_fails() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2019-06-01",
            "--param",
            "income=1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn eval_bad_param_fails() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--param",
            "income",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=VALUE"));
}

#[test]
fn eval_error_as_json() {
    let dir = workspace();
    let output = statute(dir.path())
        .args(["--output", "json", "eval", "--service", "X", "--law", "y", "--date", "2025-01-01"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("error:"));
}

#[test]
fn quiet_suppresses_output() {
    let dir = workspace();
    statute(dir.path())
        .args([
            "--quiet",
            "eval",
            "--service",
            "TOESLAGEN",
            "--law",
            "test_toeslag",
            "--date",
            "2025-01-01",
            "--param",
            "income=25000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. laws and configuration
// ──────────────────────────────────────────────

#[test]
fn laws_lists_services() {
    let dir = workspace();
    statute(dir.path())
        .arg("laws")
        .assert()
        .success()
        .stdout(predicate::str::contains("TOESLAGEN\ttest_toeslag"))
        .stdout(predicate::str::contains("BELASTINGDIENST\tinkomstenbelasting"));
}

#[test]
fn laws_json() {
    let dir = workspace();
    let output = statute(dir.path())
        .args(["--output", "json", "laws"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["TOESLAGEN"], json!(["test_toeslag"]));
}

#[test]
fn missing_rules_dir_fails() {
    let dir = TempDir::new().unwrap();
    statute(dir.path())
        .arg("laws")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn config_file_sets_rules_dir_and_date() {
    let dir = TempDir::new().unwrap();
    write_json(&dir.path().join("specs/allowance.json"), &allowance_rule());
    fs::write(
        dir.path().join("statute.toml"),
        "rules_dir = \"specs\"\nreference_date = \"2024-03-01\"\n",
    )
    .unwrap();
    statute(dir.path())
        .args(["eval", "--service", "TOESLAGEN", "--law", "test_toeslag", "--param", "income=1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@ 2024-03-01"))
        .stdout(predicate::str::contains("allowance = 100"));
}

#[test]
fn rules_dir_flag_overrides_config() {
    let dir = workspace();
    fs::write(dir.path().join("statute.toml"), "rules_dir = \"missing\"\n").unwrap();
    statute(dir.path())
        .args(["--rules-dir", "rules", "laws"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TOESLAGEN"));
}

#[test]
fn explicit_missing_config_fails() {
    let dir = workspace();
    statute(dir.path())
        .args(["--config", "nope.toml", "laws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn invalid_config_date_fails() {
    let dir = workspace();
    fs::write(dir.path().join("statute.toml"), "reference_date = \"01-02-2024\"\n").unwrap();
    statute(dir.path())
        .arg("laws")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
