//! Declared type relationships used during migrator resolution.
//!
//! Rust has no runtime class hierarchy to walk, so "a migrator registered
//! for a parent type also serves its subtypes" is opted into explicitly:
//! [`TypeGraph::add_edge`] declares a `Child -> Parent` relationship
//! together with a projection closure that rewrites a child value into
//! the parent representation. Resolution walks these edges breadth-first,
//! so the nearest declared ancestor wins.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::{Error, Result};

/// Type-erased value moving through the migration engine.
pub type AnyValue = Box<dyn Any + Send>;

/// Identity of a type as seen by the registry and the migration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for a concrete type.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type path, used in errors and logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Projection applied when a value moves up one declared edge.
pub(crate) type CoerceFn = Arc<dyn Fn(AnyValue) -> Result<AnyValue> + Send + Sync>;

/// A reachable ancestor and the projections that carry a value to it.
#[derive(Clone)]
pub(crate) struct Ancestor {
    pub(crate) key: TypeKey,
    pub(crate) chain: Vec<CoerceFn>,
}

/// Statically declared subtype edges.
#[derive(Default)]
pub struct TypeGraph {
    /// Child -> (parent, projection) edges in declaration order.
    edges: HashMap<TypeKey, Vec<(TypeKey, CoerceFn)>>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `Child` values can stand in for `Parent` values,
    /// with `project` producing the parent representation.
    pub fn add_edge<Child, Parent>(
        &mut self,
        project: impl Fn(Child) -> Parent + Send + Sync + 'static,
    ) where
        Child: Any + Send,
        Parent: Any + Send,
    {
        let coerce: CoerceFn = Arc::new(move |value: AnyValue| {
            let child = value.downcast::<Child>().map_err(|_| Error::MigrationFailed {
                source: TypeKey::of::<Child>().name().to_string(),
                target: TypeKey::of::<Parent>().name().to_string(),
                cause: "value does not match the declared edge type".into(),
            })?;
            Ok(Box::new(project(*child)) as AnyValue)
        });
        self.edges
            .entry(TypeKey::of::<Child>())
            .or_default()
            .push((TypeKey::of::<Parent>(), coerce));
    }

    /// All types reachable from `origin`, nearest first. `origin` itself
    /// leads with an empty projection chain; each type appears once even
    /// when several edge paths reach it.
    pub(crate) fn ancestors(&self, origin: TypeKey) -> Vec<Ancestor> {
        let mut seen = HashSet::new();
        seen.insert(origin);
        let mut queue = VecDeque::new();
        queue.push_back(Ancestor {
            key: origin,
            chain: Vec::new(),
        });
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.edges.get(&current.key) {
                for (parent, coerce) in parents {
                    if seen.insert(*parent) {
                        let mut chain = current.chain.clone();
                        chain.push(coerce.clone());
                        queue.push_back(Ancestor {
                            key: *parent,
                            chain,
                        });
                    }
                }
            }
            out.push(current);
        }
        out
    }

    /// Whether `source` is `target` or reaches it through declared edges.
    pub fn is_assignable(&self, source: TypeKey, target: TypeKey) -> bool {
        source == target || self.ancestors(source).iter().any(|a| a.key == target)
    }
}
