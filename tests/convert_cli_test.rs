use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, serde_json::to_string_pretty(value).expect("json")).expect("write");
}

fn read_json(path: &Path) -> Value {
    let raw = fs::read_to_string(path).expect("read");
    serde_json::from_str(&raw).expect("parse")
}

fn converter(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("syre-version-converter");
    cmd.current_dir(root)
        .env("SYRE_CONFIG_DIR", root.join("config"))
        .env("SYRE_CONVERTER_CONFIG_PATH", root.join("converter.toml"))
        .env_remove("SYRE_CONVERTER_CONTINUE_ON_ERROR")
        .env_remove("SYRE_CONVERTER_SCRIPT_EXTENSIONS")
        .env_remove("RUST_LOG");
    cmd
}

fn project_0_10_2(root: &Path, name: &str) -> PathBuf {
    let project = root.join(name);
    write_json(
        &project.join(".syre/project.json"),
        &json!({
            "rid": format!("{name}-rid"),
            "name": name,
            "data_root": "data",
            "creator": {"User": {"Id": "u1"}},
            "created": "2023-05-01T10:00:00Z"
        }),
    );
    write_json(
        &project.join(".syre/project_settings.json"),
        &json!({"permissions": [{"user": "u1", "read": true, "write": true, "execute": true}]}),
    );
    write_json(
        &project.join("data/.syre/container.json"),
        &json!({
            "rid": "c0",
            "creator": null,
            "created": "2023-05-01T10:00:00Z",
            "properties": {"name": "data"},
            "analyses": {"a1": {"autorun": true, "priority": 0}}
        }),
    );
    project
}

fn legacy_project(root: &Path) -> PathBuf {
    let project = root.join("legacy");
    fs::create_dir_all(project.join("scripts")).expect("mkdir");
    fs::write(project.join("scripts/fit.py"), "print('fit')\n").expect("script");
    write_json(
        &project.join("data/_container.json"),
        &json!({"name": "Root", "metadata": {"rig": {"id": 4}}}),
    );
    write_json(
        &project.join("data/_scripts.json"),
        &json!([{"script": "root:/../scripts/fit.py", "autorun": false, "priority": 1}]),
    );
    write_json(
        &project.join("data/trial/_asset.json"),
        &json!({"file": "trial.csv", "creator_type": "script", "creator": "fit.py"}),
    );
    fs::write(project.join("data/trial/trial.csv"), "1,2\n").expect("data");
    project
}

fn register(root: &Path, projects: &[&Path]) {
    let entries: Vec<Value> = projects
        .iter()
        .map(|p| Value::String(p.display().to_string()))
        .collect();
    write_json(
        &root.join("config/project_manifest.json"),
        &Value::Array(entries),
    );
}

#[test]
fn versions_lists_every_step() {
    let tmp = tempdir().expect("tempdir");
    converter(tmp.path())
        .arg("versions")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.9.x->0.10.0 available"))
        .stdout(predicate::str::contains("0.10.2->0.11.0 available"));
}

#[test]
fn unknown_version_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    converter(tmp.path())
        .args(["convert", "0.8.0", "0.11.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown version `0.8.0`"));
}

#[test]
fn backwards_conversion_has_nothing_to_do() {
    let tmp = tempdir().expect("tempdir");
    converter(tmp.path())
        .args(["convert", "0.11.0", "0.10.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to convert"));
}

#[test]
fn legacy_project_converts_to_latest() {
    let tmp = tempdir().expect("tempdir");
    let project = legacy_project(tmp.path());

    converter(tmp.path())
        .args(["convert", "0.9.x", "0.11.0", "-p"])
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("converted="));

    let analyses = read_json(&project.join(".syre/analyses.json"));
    let fit_rid = analyses[0]["rid"].clone();
    let container = read_json(&project.join("data/.syre/container.json"));
    assert_eq!(container["properties"]["metadata"], json!({"rig.id": 4}));
    assert_eq!(container["analyses"][0]["analysis"], fit_rid);

    let assets = read_json(&project.join("data/.syre/assets.json"));
    assert_eq!(assets[0]["path"], json!("trial.csv"));
    assert_eq!(assets[0]["properties"]["creator"], json!({"Script": fit_rid}));
    assert!(project.join("data/trial.csv").is_file());
    assert!(!project.join("data/trial").exists());
    assert!(project.join("analysis/fit.py").is_file());

    let before = fs::read(project.join("data/.syre/assets.json")).expect("read");
    converter(tmp.path())
        .args(["convert", "0.9.x", "0.11.0", "--project"])
        .arg(&project)
        .assert()
        .success();
    assert_eq!(
        fs::read(project.join("data/.syre/assets.json")).expect("read"),
        before
    );
}

#[test]
fn global_config_is_converted_with_backup() {
    let tmp = tempdir().expect("tempdir");
    let project = project_0_10_2(tmp.path(), "alpha");
    register(tmp.path(), &[&project]);
    write_json(
        &tmp.path().join("config/users.json"),
        &json!({"u1": {"rid": "u1", "name": "Ada", "email": "ada@example.com"}}),
    );
    write_json(
        &tmp.path().join("config/settings.json"),
        &json!({"active_user": "u1", "active_project": null}),
    );

    converter(tmp.path())
        .args(["convert", "0.10.2", "0.11.0"])
        .assert()
        .success();

    let users = read_json(&tmp.path().join("config/users.json"));
    assert_eq!(
        users,
        json!([{"rid": "u1", "name": "Ada", "email": "ada@example.com"}])
    );
    assert!(tmp.path().join("config/users.json.0.10.2.bak").is_file());
    assert_eq!(
        read_json(&tmp.path().join("config/local_config.json")),
        json!({"user": "u1"})
    );

    let settings = read_json(&project.join(".syre/project_settings.json"));
    assert_eq!(settings["creator"], json!({"User": {"Id": "u1"}}));
    assert_eq!(
        settings["permissions"],
        json!({"u1": {"read": true, "write": true, "execute": true}})
    );
    let properties = read_json(&project.join(".syre/project.json"));
    assert!(properties.get("creator").is_none());
    let container = read_json(&project.join("data/.syre/container.json"));
    assert_eq!(
        container["analyses"],
        json!([{"analysis": "a1", "autorun": true, "priority": 0}])
    );
}

#[test]
fn best_effort_keeps_going_but_still_fails() {
    let tmp = tempdir().expect("tempdir");
    let broken = tmp.path().join("broken");
    fs::create_dir_all(&broken).expect("mkdir");
    let good = project_0_10_2(tmp.path(), "good");
    register(tmp.path(), &[&broken, &good]);

    converter(tmp.path())
        .args(["convert", "0.10.2", "0.11.0", "--best-effort"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("issue:"))
        .stdout(predicate::str::contains("converted=1"));

    let settings = read_json(&good.join(".syre/project_settings.json"));
    assert_eq!(settings["created"], json!("2023-05-01T10:00:00Z"));
}

#[test]
fn stop_on_first_error_is_the_default() {
    let tmp = tempdir().expect("tempdir");
    let broken = tmp.path().join("broken");
    fs::create_dir_all(&broken).expect("mkdir");
    let good = project_0_10_2(tmp.path(), "good");
    register(tmp.path(), &[&broken, &good]);

    converter(tmp.path())
        .args(["convert", "0.10.2", "0.11.0"])
        .assert()
        .failure();

    let properties = read_json(&good.join(".syre/project.json"));
    assert!(properties.get("creator").is_some());
}

#[test]
fn status_reports_json() {
    let tmp = tempdir().expect("tempdir");
    let output = converter(tmp.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["command"], json!("status"));
    assert_eq!(report["ok"], json!(true));
    let details = report["details"].as_array().expect("details");
    assert!(
        details
            .iter()
            .any(|d| d.as_str().is_some_and(|s| s.starts_with("env SYRE_CONFIG_DIR=")))
    );
}
