//! Basic functionality integration tests for dcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;

#[test]
fn test_basic_file_copy() {
    let fx = TestFixture::new();
    fx.write("src/test.txt", "hello world");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src/test.txt"))
        .arg(fx.path("copy.txt"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("201 Created"));

    fx.assert_file_content("copy.txt", "hello world");
    fx.assert_file_content("src/test.txt", "hello world");
}

#[test]
fn test_recursive_directory_copy() {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("-q")
        .arg(fx.path("src"))
        .arg(fx.path("copied"))
        .assert()
        .success();

    fx.assert_file_content("copied/a.txt", "alpha");
    fx.assert_file_content("copied/b.txt", "beta");
    fx.assert_file_content("copied/sub/c.txt", "gamma");
    assert_eq!(fx.count_files_recursive("src"), 3);
}

#[test]
fn test_move_directory() {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--move")
        .arg(fx.path("src"))
        .arg(fx.path("moved"))
        .assert()
        .success();

    assert!(!fx.path("src").exists());
    fx.assert_file_content("moved/sub/c.txt", "gamma");
    assert_eq!(fx.count_files_recursive("moved"), 3);
}

#[test]
fn test_copy_overwrites_by_default() {
    let fx = TestFixture::new();
    fx.create_tree();
    fx.write("dst/a.txt", "stale");
    fx.write("dst/extra.txt", "kept");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg(fx.path("src"))
        .arg(fx.path("dst"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("207 Multi-Status"))
        .stdout(predicate::str::contains("overwritten: 2"))
        .stdout(predicate::str::contains("created: 3"));

    fx.assert_file_content("dst/a.txt", "alpha");
    fx.assert_file_content("dst/sub/c.txt", "gamma");
}

#[test]
fn test_relative_paths() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.current_dir(fx.root.path())
        .arg("src/a.txt")
        .arg("a-copy.txt")
        .assert()
        .success();

    fx.assert_file_content("a-copy.txt", "alpha");
}

#[rstest]
#[case::zero("0", 0)]
#[case::one("1", 2)]
#[case::infinity("infinity", 3)]
fn test_depth_limits_copy(#[case] depth: &str, #[case] expected_files: usize) {
    let fx = TestFixture::new();
    fx.create_tree();

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("--depth")
        .arg(depth)
        .arg(fx.path("src"))
        .arg(fx.path("copy"))
        .assert()
        .success();

    assert!(fx.path("copy").is_dir());
    assert_eq!(fx.count_files_recursive("copy"), expected_files);
    if depth == "1" {
        // The subcollection is created but left empty
        assert!(fx.path("copy/sub").is_dir());
        assert_eq!(fs::read_dir(fx.path("copy/sub")).unwrap().count(), 0);
    }
}

#[test]
fn test_verbose_lists_items() {
    let fx = TestFixture::new();
    fx.write("src/a.txt", "alpha");

    let mut cmd = cargo_bin_cmd!("dcp");
    cmd.arg("-v")
        .arg(fx.path("src"))
        .arg(fx.path("copy"))
        .assert()
        .success()
        .stdout(predicate::str::contains("file://"))
        .stdout(predicate::str::contains("copy/a.txt"));
}
