//! Common test utilities for stowage integration tests.
//!
//! Provides `TestEnv` for isolated settings directories that don't touch
//! the user's real `~/.config` tree.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use stowage::{Locations, SettingsStore};
pub use tempfile::TempDir;

/// A test environment with an isolated settings directory.
///
/// Stores built through `store()` resolve every file below a dedicated
/// `TempDir`, so tests are parallel-safe and leave nothing behind.
pub struct TestEnv {
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an isolated directory.
    ///
    /// The first call also installs a test-writer tracing subscriber,
    /// so store diagnostics land in captured test output.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Build a store rooted at this environment's directory.
    pub fn store(&self) -> SettingsStore {
        SettingsStore::with_locations(
            Locations::new("stowage-test", None)
                .unwrap()
                .with_base_dir(self.path()),
        )
    }

    /// Get the path to the settings directory.
    pub fn path(&self) -> &Path {
        self.config_dir.path()
    }

    /// Path of a named settings file inside the environment.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Drop a raw settings file into the environment.
    pub fn seed(&self, name: &str, contents: &str) {
        fs::write(self.file(name), contents).unwrap();
    }

    /// Raw text of a settings file.
    pub fn raw(&self, name: &str) -> String {
        fs::read_to_string(self.file(name)).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
