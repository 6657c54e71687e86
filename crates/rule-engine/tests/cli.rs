//! 命令行工具测试

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn rule_set_json() -> Value {
    json!({
        "operator": "OR",
        "rules": [
            { "key": "country", "operation": "EQUALS", "value": "US" },
            {
                "operator": "AND",
                "rules": [
                    { "key": "name", "operation": "EQUALS", "value": "John" },
                    { "key": "age", "operation": "GT", "value": 40 }
                ]
            }
        ]
    })
}

/// 在临时目录中写入规则文件和上下文文件
fn workspace(rules: &Value, context: &Value) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("rules.json"), rules.to_string()).unwrap();
    fs::write(dir.path().join("context.json"), context.to_string()).unwrap();
    dir
}

/// 指向临时目录的命令，配置目录为空，使用默认配置
#[allow(deprecated)]
fn rule_engine_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rule-engine").unwrap();
    cmd.current_dir(dir.path())
        .env("CONFIG_DIR", dir.path())
        .env("RUST_LOG", "error")
        .args(["--rules", "rules.json", "--context", "context.json"]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should be JSON")
}

#[test]
fn help_works() {
    let dir = workspace(&rule_set_json(), &json!({}));
    rule_engine_cmd(&dir).arg("--help").assert().success();
}

#[test]
fn evaluates_single_context() {
    let dir = workspace(
        &rule_set_json(),
        &json!({ "country": "CA", "name": "John", "age": 35 }),
    );

    let output = stdout_json(&mut rule_engine_cmd(&dir));

    let results = output.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "FAILED");
    assert_eq!(results[1]["status"], "FAILED");
    assert_eq!(results[0]["rule"]["key"], "country");
}

#[test]
fn failing_rules_still_exit_successfully() {
    let dir = workspace(&rule_set_json(), &json!({ "name": "John" }));

    let output = stdout_json(&mut rule_engine_cmd(&dir));

    assert_eq!(output[0]["error"]["kind"], "DataValueNotFound");
    assert_eq!(output[0]["message"], "Field country is missing or null");
}

#[test]
fn batch_evaluates_each_record() {
    let dir = workspace(
        &rule_set_json(),
        &json!([
            { "country": "US", "name": "Ann", "age": 20 },
            { "country": "CA", "name": "John", "age": 50 },
            { "country": "CA", "name": "Bob", "age": 50 }
        ]),
    );

    let output = stdout_json(rule_engine_cmd(&dir).arg("--batch"));

    let statuses: Vec<Vec<&str>> = output
        .as_array()
        .unwrap()
        .iter()
        .map(|record| {
            record
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r["status"].as_str().unwrap())
                .collect()
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            vec!["PASSED", "FAILED"],
            vec!["FAILED", "PASSED"],
            vec!["FAILED", "FAILED"],
        ]
    );
}

#[test]
fn batch_requires_array_context() {
    let dir = workspace(&rule_set_json(), &json!({ "country": "US" }));

    rule_engine_cmd(&dir)
        .arg("--batch")
        .assert()
        .failure()
        .stderr(contains("JSON 数组"));
}

#[test]
fn trace_prints_report() {
    let dir = workspace(
        &rule_set_json(),
        &json!({ "country": "US", "name": "Bob", "age": 50 }),
    );

    let output = stdout_json(rule_engine_cmd(&dir).arg("--trace"));

    assert_eq!(output["results"].as_array().unwrap().len(), 2);
    let trace = output["evaluation_trace"].as_array().unwrap();
    assert!(trace.iter().any(|t| t.as_str().unwrap().contains("短路")));
    assert!(output["evaluation_time_ms"].is_i64());
}

#[test]
fn pretty_output_is_indented() {
    let dir = workspace(&rule_set_json(), &json!({ "country": "US" }));

    rule_engine_cmd(&dir)
        .arg("--pretty")
        .assert()
        .success()
        .stdout(contains("\n  {"));
}

#[test]
fn invalid_inputs_fail() {
    let leaf_root = json!({ "key": "a", "operation": "EQUALS", "value": 1 });
    let dir = workspace(&leaf_root, &json!({}));
    rule_engine_cmd(&dir)
        .assert()
        .failure()
        .stderr(contains("rules.json"));

    let dir = workspace(&rule_set_json(), &json!({}));
    fs::remove_file(dir.path().join("context.json")).unwrap();
    rule_engine_cmd(&dir)
        .assert()
        .failure()
        .stderr(contains("context.json"));
}
