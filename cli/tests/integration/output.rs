//! Output format contract tests for dcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;
use serde_json::Value;

fn run_json(fx: &TestFixture, source: &str, destination: &str) -> Value {
    let mut cmd = cargo_bin_cmd!("dcp");
    let output = cmd
        .arg("--output")
        .arg("json")
        .arg(fx.path(source))
        .arg(fx.path(destination))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_json_contract_for_uniform_copy() {
    let fx = TestFixture::new();
    fx.create_tree();

    let payload = run_json(&fx, "src", "copy");
    assert_eq!(payload["status"], 201);
    assert_eq!(payload["multistatus"], false);

    let items = payload["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    for item in items {
        assert!(item["href"].as_str().unwrap().starts_with("file://"));
        assert_eq!(item["status"], "created");
        assert_eq!(item["code"], 201);
        assert!(item["error"].is_null());
    }
    assert!(items[0]["href"].as_str().unwrap().ends_with("/copy/"));
}

#[test]
fn test_json_contract_for_mixed_outcome() {
    let fx = TestFixture::new();
    fx.create_tree();
    fx.write("copy/a.txt", "stale");

    let payload = run_json(&fx, "src", "copy");
    assert_eq!(payload["status"], 207);
    assert_eq!(payload["multistatus"], true);

    let items = payload["items"].as_array().unwrap();
    let overwritten: Vec<_> = items
        .iter()
        .filter(|item| item["status"] == "overwritten")
        .collect();
    assert_eq!(overwritten.len(), 2);
    assert!(overwritten.iter().all(|item| item["code"] == 204));
}

#[test]
fn test_xml_renders_multistatus() {
    let fx = TestFixture::new();
    fx.create_tree();
    fx.write("copy/b.txt", "stale");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--output")
        .arg("xml")
        .arg(fx.path("src"))
        .arg(fx.path("copy"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
        ))
        .stdout(predicate::str::contains(r#"<D:multistatus xmlns:D="DAV:">"#))
        .stdout(predicate::str::contains("<D:status>HTTP/1.1 201 Created</D:status>"))
        .stdout(predicate::str::contains(
            "<D:status>HTTP/1.1 204 No Content</D:status>",
        ));
}

#[test]
fn test_xml_is_empty_for_uniform_outcome() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--output")
        .arg("xml")
        .arg(fx.path("src/a.txt"))
        .arg(fx.path("a.txt"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_quiet_human_output_keeps_status_line() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("-q")
        .arg(fx.path("src/a.txt"))
        .arg(fx.path("a.txt"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("201 Created"))
        .stdout(predicate::str::contains("created: 1"));
}
