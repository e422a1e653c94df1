//! Declarative type bindings and the space/partition registry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::document::{Document, DocumentCodec};
use crate::migration::{AnyValue, TypeKey};
use crate::{Error, Result};

/// Space used when a binding or store call names none.
pub const DEFAULT_SPACE: &str = "default-space";

/// Declarative binding metadata for a settings type.
///
/// A type implementing this trait registers through `SettingsStore::register`
/// with no further arguments; everything the store needs is carried by the
/// associated constants. Types without a natural home for the constants can
/// register with an explicit [`Binding`] instead.
pub trait SettingsModel: Serialize + DeserializeOwned + Any + Send {
    /// Partition this type belongs to.
    const PARTITION: &'static str;
    /// Version of this type within the partition's version line.
    const VERSION: u32;
    /// Space the binding lives in; `None` means the default space.
    const SPACE: Option<&'static str> = None;
    /// Document field carrying the version marker.
    const VERSION_FIELD: &'static str = "version";
}

/// The registered association of a type to its space, partition, version
/// and version-marker field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    space: Option<String>,
    partition: String,
    version: u32,
    version_field: String,
}

impl Binding {
    /// Binding for `partition` at `version` in the default space, with the
    /// marker stored under `"version"`.
    pub fn new(partition: impl Into<String>, version: u32) -> Self {
        Self {
            space: None,
            partition: partition.into(),
            version,
            version_field: "version".to_string(),
        }
    }

    /// Binding derived from a [`SettingsModel`] implementation.
    pub fn of<T: SettingsModel>() -> Self {
        let mut binding = Self::new(T::PARTITION, T::VERSION).with_version_field(T::VERSION_FIELD);
        if let Some(space) = T::SPACE {
            binding = binding.with_space(space);
        }
        binding
    }

    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn with_version_field(mut self, field: impl Into<String>) -> Self {
        self.version_field = field.into();
        self
    }

    /// Space name with the default applied.
    pub fn space(&self) -> &str {
        self.space.as_deref().unwrap_or(DEFAULT_SPACE)
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn version_field(&self) -> &str {
        &self.version_field
    }
}

/// Decodes the type this binding names out of a document, erased so the
/// store can decode whichever version a file declares.
pub(crate) type DecodeHook =
    Arc<dyn Fn(&DocumentCodec, Document) -> Result<AnyValue> + Send + Sync>;

/// One registered binding with its erased decode hook.
pub(crate) struct Registered {
    pub(crate) binding: Binding,
    pub(crate) type_key: TypeKey,
    pub(crate) decode: DecodeHook,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("binding", &self.binding)
            .field("type_key", &self.type_key)
            .finish_non_exhaustive()
    }
}

/// Space -> partition -> type bindings.
///
/// Spaces and partitions iterate in name order, so looking up a type that
/// is bound in several partitions of one space resolves deterministically.
#[derive(Default)]
pub struct BindingRegistry {
    spaces: BTreeMap<String, BTreeMap<String, HashMap<TypeKey, Arc<Registered>>>>,
}

impl BindingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `binding`.
    ///
    /// Re-registering an identical binding is a no-op. A binding that
    /// disagrees with the existing one for the same type, or that claims a
    /// version already bound to another type of the partition, is a
    /// conflict.
    pub(crate) fn register<T>(&mut self, binding: Binding) -> Result<()>
    where
        T: DeserializeOwned + Any + Send,
    {
        let type_key = TypeKey::of::<T>();
        let space = binding.space().to_string();
        let partition = binding.partition().to_string();

        let types = self
            .spaces
            .entry(space.clone())
            .or_default()
            .entry(partition.clone())
            .or_default();

        if let Some(existing) = types.get(&type_key) {
            if existing.binding == binding {
                debug!(
                    type_name = type_key.name(),
                    space = %space,
                    "binding already registered"
                );
                return Ok(());
            }
            return Err(Error::BindingConflict {
                type_name: type_key.name().to_string(),
                space,
                reason: format!(
                    "already registered in partition {} as v{} (field `{}`)",
                    existing.binding.partition(),
                    existing.binding.version(),
                    existing.binding.version_field()
                ),
            });
        }
        if let Some(other) = types
            .values()
            .find(|r| r.binding.version() == binding.version())
        {
            return Err(Error::BindingConflict {
                type_name: type_key.name().to_string(),
                space,
                reason: format!(
                    "v{} of partition {} is already bound to {}",
                    binding.version(),
                    partition,
                    other.type_key.name()
                ),
            });
        }

        let decode: DecodeHook = Arc::new(|codec: &DocumentCodec, document: Document| {
            Ok(Box::new(codec.decode::<T>(document)?) as AnyValue)
        });
        debug!(
            type_name = type_key.name(),
            space = %space,
            partition = %partition,
            version = binding.version(),
            "registered settings binding"
        );
        types.insert(
            type_key,
            Arc::new(Registered {
                binding,
                type_key,
                decode,
            }),
        );
        Ok(())
    }

    /// Find the binding for `type_key` in `space`. Partitions are scanned
    /// in ascending name order.
    pub(crate) fn lookup(&self, space: &str, type_key: TypeKey) -> Result<Arc<Registered>> {
        self.spaces
            .get(space)
            .and_then(|partitions| partitions.values().find_map(|types| types.get(&type_key)))
            .cloned()
            .ok_or_else(|| Error::BindingNotFound {
                type_name: type_key.name().to_string(),
                space: space.to_string(),
            })
    }

    /// All bindings of one partition, ascending by version.
    pub(crate) fn partition_versions(&self, space: &str, partition: &str) -> Vec<Arc<Registered>> {
        let mut all: Vec<Arc<Registered>> = self
            .spaces
            .get(space)
            .and_then(|partitions| partitions.get(partition))
            .map(|types| types.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|r| r.binding.version());
        all
    }

    /// The binding of `partition` at exactly `version`.
    pub(crate) fn version_of(
        &self,
        space: &str,
        partition: &str,
        version: u32,
    ) -> Option<Arc<Registered>> {
        self.spaces
            .get(space)
            .and_then(|partitions| partitions.get(partition))
            .and_then(|types| types.values().find(|r| r.binding.version() == version))
            .cloned()
    }

    /// Every binding in `space`, ordered by partition name then version.
    pub(crate) fn all(&self, space: &str) -> Vec<Arc<Registered>> {
        let mut out = Vec::new();
        if let Some(partitions) = self.spaces.get(space) {
            for types in partitions.values() {
                let mut group: Vec<_> = types.values().cloned().collect();
                group.sort_by_key(|r| r.binding.version());
                out.extend(group);
            }
        }
        out
    }
}
