//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory holding a `src` tree; destinations go next to it.
pub struct TestFixture {
    pub root: TempDir,
}

impl TestFixture {
    /// Create a fixture with an empty `src` directory.
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(root.path().join("src")).expect("Failed to create source dir");
        Self { root }
    }

    /// Path below the fixture root.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Write `content` at `relative`, creating parents.
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    /// Populate `src` with two files at the top and one in `src/sub`.
    pub fn create_tree(&self) {
        self.write("src/a.txt", "alpha");
        self.write("src/b.txt", "beta");
        self.write("src/sub/c.txt", "gamma");
    }

    /// Check if a file exists and has the expected content.
    pub fn assert_file_content(&self, relative: &str, expected: &str) {
        let path = self.path(relative);
        assert!(path.exists(), "File does not exist: {:?}", path);
        let actual = fs::read_to_string(&path).expect("Failed to read file");
        assert_eq!(actual, expected, "File content mismatch");
    }

    /// Count all files below `relative` recursively.
    pub fn count_files_recursive(&self, relative: &str) -> usize {
        count_files(&self.path(relative))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    if dir.is_dir() {
        for entry in fs::read_dir(dir).expect("Failed to read directory") {
            let path = entry.expect("Failed to read entry").path();
            if path.is_dir() {
                count += count_files(&path);
            } else {
                count += 1;
            }
        }
    }
    count
}
