//! Error handling tests for dcp CLI.
//!
//! Requests that can never succeed exit with 2; the destination is left alone.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;

#[test]
fn test_missing_source() {
    let fx = TestFixture::new();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/nope.txt"))
        .arg(fx.path("copy.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[source_not_found]"));

    assert!(!fx.path("copy.txt").exists());
}

#[test]
fn test_missing_destination_parent() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/a.txt"))
        .arg(fx.path("missing/a.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[parent_not_found]"));
}

#[test]
fn test_destination_parent_is_a_file() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");
    fx.write("plain.txt", "not a collection");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/a.txt"))
        .arg(fx.path("plain.txt/a.txt"))
        .assert()
        .code(2);

    fx.assert_file_content("plain.txt", "not a collection");
}

#[test]
fn test_no_overwrite_refuses_existing_destination() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");
    fx.write("dst.txt", "original");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--no-overwrite")
        .arg(fx.path("src/a.txt"))
        .arg(fx.path("dst.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[request_rejected]"));

    fx.assert_file_content("dst.txt", "original");
}

#[test]
fn test_move_rejects_finite_depth() {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--move")
        .arg("--depth")
        .arg("1")
        .arg(fx.path("src"))
        .arg(fx.path("moved"))
        .assert()
        .code(2);

    assert!(fx.path("src/sub/c.txt").exists());
    assert!(!fx.path("moved").exists());
}

#[test]
fn test_invalid_depth_value() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--depth")
        .arg("deep")
        .arg(fx.path("src/a.txt"))
        .arg(fx.path("copy.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("deep"));
}

#[test]
fn test_copy_into_itself() {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src"))
        .arg(fx.path("src/sub/inner"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[request_rejected]"));

    assert!(!fx.path("src/sub/inner").exists());
}

#[test]
fn test_move_onto_ancestor_keeps_source() {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--move")
        .arg(fx.path("src/sub"))
        .arg(fx.path("src"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("contains the source"));

    fx.assert_file_content("src/sub/c.txt", "gamma");
    fx.assert_file_content("src/a.txt", "alpha");
}

#[test]
fn test_copy_onto_itself() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/a.txt"))
        .arg(fx.path("src/a.txt"))
        .assert()
        .code(2);

    fx.assert_file_content("src/a.txt", "alpha");
}

#[test]
fn test_invalid_destination_url() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/a.txt"))
        .arg("http://")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[invalid_input]"));
}
