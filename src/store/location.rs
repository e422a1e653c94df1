//! Config directory and settings file path resolution.

use std::env;
use std::path::PathBuf;

use crate::{Error, Result};

/// Resolves where settings files live for one application.
///
/// The directory is computed per call, in this order:
/// 1. the application's own override variable, when one is configured
/// 2. `$XDG_CONFIG_HOME/<dir-name>`
/// 3. `%APPDATA%\<dir-name>` on Windows
/// 4. `~/.config/<dir-name>`
///
/// [`Locations::with_base_dir`] pins the directory outright, which is how
/// tests isolate themselves without touching the process environment.
#[derive(Debug, Clone)]
pub struct Locations {
    dir_name: String,
    env_var: Option<String>,
    base_dir: Option<PathBuf>,
}

impl Locations {
    /// Resolver for the named application config directory, optionally
    /// honoring `env_var` as a whole-directory override.
    pub fn new(dir_name: impl Into<String>, env_var: Option<&str>) -> Result<Self> {
        let dir_name = dir_name.into();
        if dir_name.trim().is_empty() {
            return Err(Error::InvalidDirName);
        }
        Ok(Self {
            dir_name,
            env_var: env_var.map(str::to_string),
            base_dir: None,
        })
    }

    /// Pin the config directory, bypassing environment resolution.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// The directory settings files are stored in.
    pub fn config_dir(&self) -> PathBuf {
        if let Some(base) = &self.base_dir {
            return base.clone();
        }
        if let Some(var) = &self.env_var {
            if let Some(dir) = env_dir(var) {
                return dir;
            }
        }
        if let Some(dir) = env_dir("XDG_CONFIG_HOME") {
            return dir.join(&self.dir_name);
        }
        if cfg!(windows) {
            if let Some(dir) = env_dir("APPDATA") {
                return dir.join(&self.dir_name);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(&self.dir_name)
    }

    /// Path of the settings file for one `(space, partition, version)`.
    pub fn settings_file(&self, space: &str, partition: &str, version: u32) -> PathBuf {
        self.config_dir()
            .join(format!("{space}-{partition}-v{version}.json"))
    }
}

/// Read an environment variable as a directory, ignoring empty values.
fn env_dir(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
