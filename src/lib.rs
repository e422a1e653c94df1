//! Stowage - versioned settings persistence with typed migration.
//!
//! This library persists structured settings objects to per-version JSON
//! files under a platform config directory, and transparently migrates
//! older on-disk versions to the schema a caller currently expects using
//! a type-directed conversion engine.

pub mod document;
pub mod migration;
pub mod store;
pub mod versioned;

pub use document::{Document, DocumentCodec};
pub use migration::{AnyValue, MigratablePair, MigrationEngine, Migrator, TypeGraph, TypeKey};
pub use store::{Binding, DEFAULT_SPACE, Locations, SettingsModel, SettingsStore};
pub use versioned::{VersionConverter, VersionedCodec, VersionedModel};

/// Boxed error carried by migrator and converter callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Library-level error type for settings operations.
//
// `Display`, `Error`, and `From` are implemented by hand because the
// `MigratorNotFound`/`MigrationFailed` variants carry a `source: String`
// field (a type name, part of the public API), which a derive would
// misread as the error's `source()`.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),

    Json(serde_json::Error),

    Decode(String),

    InvalidDirName,

    BindingNotFound { type_name: String, space: String },

    BindingConflict {
        type_name: String,
        space: String,
        reason: String,
    },

    MigratorNotFound { source: String, target: String },

    MigrationFailed {
        source: String,
        target: String,
        cause: BoxError,
    },

    MissingVersion { field: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::Json(err) => write!(f, "JSON error: {err}"),
            Error::Decode(msg) => write!(f, "Decode error: {msg}"),
            Error::InvalidDirName => write!(f, "Settings directory name is empty"),
            Error::BindingNotFound { type_name, space } => {
                write!(f, "Binding not found for {type_name} in space {space}")
            }
            Error::BindingConflict {
                type_name,
                space,
                reason,
            } => {
                write!(f, "Binding conflict for {type_name} in space {space}: {reason}")
            }
            Error::MigratorNotFound { source, target } => {
                write!(f, "No migrator from {source} to {target}")
            }
            Error::MigrationFailed {
                source,
                target,
                cause,
            } => {
                write!(f, "Migration from {source} to {target} failed: {cause}")
            }
            Error::MissingVersion { field } => {
                write!(f, "Document carries no version marker in field `{field}`")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::MigrationFailed { cause, .. } => Some(&**cause),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// Result type alias for settings operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
