//! Versioned settings store.
//!
//! The store is the high-level surface: applications register settings
//! types against named partitions, then `read` and `write` them without
//! caring which schema generation is on disk. Each `(space, partition,
//! version)` triple maps to one JSON file under the resolved config
//! directory.
//!
//! ## Reading across versions
//!
//! `read::<T>` tries the file for `T`'s own version first, then files of
//! older registered versions in descending order. The first file found is
//! decoded as the version its marker declares (falling back to the
//! filename version when no marker is present) and run through the
//! migration engine when that differs from `T`'s version. Old files are
//! never rewritten by a read; the newer file appears on the next `write`.

pub mod location;
pub mod registry;

pub use location::Locations;
pub use registry::{Binding, DEFAULT_SPACE, SettingsModel};

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::document::DocumentCodec;
use crate::migration::{MigrationEngine, TypeKey};
use crate::{Error, Result};
use registry::{BindingRegistry, Registered};

/// High-level settings persistence facade.
///
/// Bindings and migrators are registered during initialization (`&mut
/// self` methods); `read` and `write` are read-only on the store and safe
/// to share across threads afterwards.
pub struct SettingsStore {
    locations: Locations,
    codec: DocumentCodec,
    registry: BindingRegistry,
    engine: MigrationEngine,
}

impl SettingsStore {
    /// Store writing under the resolved config directory for `dir_name`,
    /// with `env_var` honored as a whole-directory override.
    pub fn new(dir_name: &str, env_var: Option<&str>) -> Result<Self> {
        Ok(Self::with_locations(Locations::new(dir_name, env_var)?))
    }

    /// Store over a preconfigured location resolver.
    pub fn with_locations(locations: Locations) -> Self {
        Self {
            locations,
            codec: DocumentCodec::new(),
            registry: BindingRegistry::new(),
            engine: MigrationEngine::new(),
        }
    }

    /// Register a settings type through its [`SettingsModel`] constants.
    pub fn register<T: SettingsModel>(&mut self) -> Result<()> {
        self.registry.register::<T>(Binding::of::<T>())
    }

    /// Register a settings type with an explicit binding.
    pub fn register_with<T>(&mut self, binding: Binding) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Any + Send,
    {
        self.registry.register::<T>(binding)
    }

    /// Register an infallible migration from `S` to `T`.
    pub fn add_migrator<S, T>(&mut self, f: impl Fn(S) -> T + Send + Sync + 'static)
    where
        S: Any + Send,
        T: Any + Send,
    {
        self.engine.add_migrator(f);
    }

    /// The migration engine, for subtype edges, conditional migrators and
    /// direct conversions.
    pub fn migrations_mut(&mut self) -> &mut MigrationEngine {
        &mut self.engine
    }

    pub fn migrations(&self) -> &MigrationEngine {
        &self.engine
    }

    /// Bindings registered in `space`, partition-ordered then ascending by
    /// version.
    pub fn bindings(&self, space: Option<&str>) -> Vec<Binding> {
        self.registry
            .all(space.unwrap_or(DEFAULT_SPACE))
            .iter()
            .map(|r| r.binding.clone())
            .collect()
    }

    /// Directory the store reads and writes under.
    pub fn config_dir(&self) -> PathBuf {
        self.locations.config_dir()
    }

    /// Read the settings value bound to `T` from `space`.
    ///
    /// `Ok(None)` means no usable file exists: nothing was ever written,
    /// or the only files on disk hold versions with no migration path to
    /// `T` (those are skipped with a warning).
    pub fn read<T>(&self, space: Option<&str>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Any + Send,
    {
        let space = space.unwrap_or(DEFAULT_SPACE);
        let target_key = TypeKey::of::<T>();
        let bound = self.registry.lookup(space, target_key)?;

        for candidate in self.read_candidates(space, &bound) {
            let path = self.locations.settings_file(
                space,
                bound.binding.partition(),
                candidate.binding.version(),
            );
            if !path.exists() {
                debug!(path = %path.display(), "settings file not present");
                continue;
            }

            let mut document = self.codec.read_document(&path)?;
            let marker = document.extract_version(candidate.binding.version_field())?;
            let source_version = marker.unwrap_or(candidate.binding.version());

            if source_version == bound.binding.version() {
                return Ok(Some(self.codec.decode::<T>(document)?));
            }

            let source = self
                .registry
                .version_of(space, bound.binding.partition(), source_version)
                .ok_or_else(|| {
                    Error::Decode(format!(
                        "file {} declares v{source_version}, which is not registered for partition {}",
                        path.display(),
                        bound.binding.partition()
                    ))
                })?;
            if !self.engine.can_migrate(source.type_key, target_key) {
                warn!(
                    path = %path.display(),
                    source = source.type_key.name(),
                    target = target_key.name(),
                    "no migration path for settings file, skipping"
                );
                continue;
            }

            debug!(
                path = %path.display(),
                source = source.type_key.name(),
                target = target_key.name(),
                "migrating settings file"
            );
            let value = (source.decode)(&self.codec, document)?;
            let migrated = self.engine.migrate(value, source.type_key, target_key)?;
            let out = migrated.downcast::<T>().map_err(|_| Error::MigrationFailed {
                source: source.type_key.name().to_string(),
                target: target_key.name().to_string(),
                cause: "migrator produced a value of an unexpected type".into(),
            })?;
            return Ok(Some(*out));
        }

        Ok(None)
    }

    /// Read the settings value bound to `T`, producing `default` when no
    /// usable file exists.
    pub fn read_or_else<T, F>(&self, space: Option<&str>, default: F) -> Result<T>
    where
        T: DeserializeOwned + Any + Send,
        F: FnOnce() -> T,
    {
        Ok(self.read(space)?.unwrap_or_else(default))
    }

    /// Write a settings value under its bound version, stamping the
    /// version marker. The file is replaced atomically.
    pub fn write<T>(&self, value: &T, space: Option<&str>) -> Result<()>
    where
        T: Serialize + Any,
    {
        let space = space.unwrap_or(DEFAULT_SPACE);
        let bound = self.registry.lookup(space, TypeKey::of::<T>())?;

        let mut document = self.codec.encode(value)?;
        document.stamp_version(bound.binding.version_field(), bound.binding.version());

        let path = self.locations.settings_file(
            space,
            bound.binding.partition(),
            bound.binding.version(),
        );
        self.codec.write_document(&path, &document)
    }

    /// The bound version first, then older registered versions descending.
    fn read_candidates(&self, space: &str, bound: &Arc<Registered>) -> Vec<Arc<Registered>> {
        let mut candidates = vec![Arc::clone(bound)];
        let mut older: Vec<Arc<Registered>> = self
            .registry
            .partition_versions(space, bound.binding.partition())
            .into_iter()
            .filter(|r| r.binding.version() < bound.binding.version())
            .collect();
        older.sort_by(|a, b| b.binding.version().cmp(&a.binding.version()));
        candidates.extend(older);
        candidates
    }
}
