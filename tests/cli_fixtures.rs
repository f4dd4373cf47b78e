//! CLI Fixture Runner Tests
//!
//! Runs the watch commands against fixture files on disk and checks the
//! reported state transitions.

use std::fs;
use std::path::PathBuf;

use livedoc::cli::{build_query, check_config, watch_document, watch_query};
use livedoc::config::LivedocConfig;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(content).unwrap()).unwrap();
    path
}

fn steps(lines: &[Value]) -> Vec<&str> {
    lines.iter().filter_map(|l| l["step"].as_str()).collect()
}

#[test]
fn test_watch_doc_reports_each_write() {
    let dir = TempDir::new().unwrap();
    let fixture = write_file(
        &dir,
        "fixture.json",
        &json!({
            "documents": {"users/u1": {"firstName": "Ann"}},
            "writes": [
                {"op": "update", "path": "users/u1", "data": {"firstName": "Anne"}},
                {"op": "delete", "path": "users/u1"}
            ]
        }),
    );

    let lines = watch_document(&fixture, "users/u1", None, &LivedocConfig::default()).unwrap();
    assert_eq!(
        steps(&lines),
        vec!["watch", "watch", "update users/u1", "delete users/u1", "summary"]
    );

    assert_eq!(
        lines[0]["state"],
        json!({"data": null, "isLoading": true, "error": null})
    );
    assert_eq!(
        lines[1]["state"],
        json!({"data": {"id": "u1", "firstName": "Ann"}, "isLoading": false, "error": null})
    );
    assert_eq!(lines[2]["state"]["data"]["firstName"], "Anne");
    assert_eq!(lines[3]["state"]["data"], Value::Null);
    assert_eq!(lines[3]["state"]["error"], Value::Null);
}

#[test]
fn test_watch_doc_denied_read_in_summary() {
    let dir = TempDir::new().unwrap();
    let fixture = write_file(
        &dir,
        "fixture.json",
        &json!({
            "policies": {"customers": {"type": "deny"}},
            "documents": {"orgs/org1/customers/cust1": {"name": "Acme"}}
        }),
    );

    let lines = watch_document(
        &fixture,
        "orgs/org1/customers/cust1",
        Some("u1".to_string()),
        &LivedocConfig::default(),
    )
    .unwrap();

    assert!(lines[0]["state"]["isLoading"].as_bool().unwrap());
    let error = &lines[1]["state"]["error"];
    assert_eq!(error["kind"], "permission");
    assert_eq!(error["operationKind"], "get");
    assert_eq!(error["resourcePath"], "orgs/org1/customers/cust1");
    assert_eq!(error["auth"]["uid"], "u1");

    let summary = lines.last().unwrap();
    assert_eq!(summary["diagnostics"]["summary"]["permission-error"], 1);
    assert_eq!(summary["metrics"]["permission_denials"], 1);
}

#[test]
fn test_watch_query_with_scoped_filter() {
    let dir = TempDir::new().unwrap();
    let fixture = write_file(
        &dir,
        "fixture.json",
        &json!({
            "identity": {"uid": "u1"},
            "policies": {"projects": {"type": "ownership", "owner_field": "ownerId"}},
            "documents": {
                "projects/p1": {"ownerId": "u1", "rank": 2},
                "projects/p2": {"ownerId": "u1", "rank": 1},
                "projects/p3": {"ownerId": "u2", "rank": 3}
            },
            "writes": [
                {"op": "add", "collection": "projects", "data": {"ownerId": "u2", "rank": 0}}
            ]
        }),
    );

    let query = build_query(
        "projects",
        &["ownerId=u1".to_string()],
        Some("rank".to_string()),
        false,
        None,
    )
    .unwrap();
    let lines = watch_query(&fixture, query, None, &LivedocConfig::default()).unwrap();

    let ids: Vec<&str> = lines[1]["state"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["p2", "p1"]);

    // Writing a document owned by someone else is denied and published,
    // but changes nothing the binding sees
    assert_eq!(steps(&lines), vec!["watch", "watch", "summary"]);
    let summary = lines.last().unwrap();
    let records = summary["diagnostics"]["records"].as_array().unwrap();
    assert_eq!(records[0]["error"]["operationKind"], "create");
    assert_eq!(summary["metrics"]["writes_failed"], 1);
}

#[test]
fn test_diagnostics_disabled_by_config() {
    let dir = TempDir::new().unwrap();
    let fixture = write_file(&dir, "fixture.json", &json!({}));
    let config = LivedocConfig::from_json(r#"{"diagnostics": {"enabled": false}}"#).unwrap();

    let lines = watch_document(&fixture, "users/u1", None, &config).unwrap();
    assert_eq!(lines[1]["state"]["data"], Value::Null);
    assert_eq!(lines[1]["state"]["isLoading"], false);
    assert_eq!(lines.last().unwrap()["diagnostics"], Value::Null);
}

#[test]
fn test_check_config() {
    let dir = TempDir::new().unwrap();
    let good = write_file(&dir, "good.json", &json!({"logging": {"min_severity": "error"}}));
    let bad = write_file(&dir, "bad.json", &json!({"diagnostics": {"capacity": 0}}));

    let report = check_config(&good).unwrap();
    assert_eq!(report["config"]["logging"]["min_severity"], "error");
    assert_eq!(report["config"]["diagnostics"]["capacity"], 64);

    let err = check_config(&bad).unwrap_err();
    assert_eq!(err.code_str(), "LIVEDOC_CLI_CONFIG_ERROR");
}

#[test]
fn test_missing_fixture() {
    let dir = TempDir::new().unwrap();
    let err = watch_document(
        &dir.path().join("absent.json"),
        "users/u1",
        None,
        &LivedocConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.code_str(), "LIVEDOC_CLI_FIXTURE_ERROR");
}
