#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};

/// Scratch directory helper that cleans up automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path for a SQLite database file inside the workspace.
    pub fn db_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

/// Two-loan fixture used across the store and HTTP tests.
pub const SAMPLE_CSV: &str = "loanNumber,region,amt\nL1,East,100\nL2,West,200\n";
