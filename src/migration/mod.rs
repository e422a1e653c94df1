//! Type-directed migration engine.
//!
//! The engine is a type-pair-keyed registry of conversion functions with
//! hierarchy-aware lookup: given a source value and a target type it finds
//! the best registered migrator, falling back to a no-op when the source
//! is declared assignable to the target. Resolution outcomes, including
//! "no migrator exists", are cached per requested pair.
//!
//! ## Resolution order
//!
//! For a requested `(source, target)` pair the search walks the declared
//! ancestors of `source` (outer loop, nearest first) against the declared
//! ancestors of `target` (inner loop). At each candidate pair, migrators
//! registered for exactly that pair are consulted newest-first, then the
//! pair-less conditional migrators. The first migrator accepting the
//! requested pair wins. With no match anywhere, a source assignable to
//! the target passes through its projection chain unconverted.

pub mod graph;
pub mod migrator;

pub use graph::{AnyValue, TypeGraph, TypeKey};
pub use migrator::{MatchFn, MigratablePair, MigrateFn, Migrator};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::{BoxError, Error, Result};
use graph::CoerceFn;

/// Outcome of a successful resolution: the projections carrying the
/// source value to the matched candidate type, then the migrator itself
/// (`None` for the assignability pass-through).
struct Resolution {
    chain: Vec<CoerceFn>,
    migrator: Option<Arc<Migrator>>,
}

impl Resolution {
    fn apply(&self, mut value: AnyValue, requested: MigratablePair) -> Result<AnyValue> {
        for step in &self.chain {
            value = step(value)?;
        }
        match &self.migrator {
            Some(migrator) => {
                migrator
                    .convert(value, requested)
                    .map_err(|cause| Error::MigrationFailed {
                        source: requested.source().name().to_string(),
                        target: requested.target().name().to_string(),
                        cause,
                    })
            }
            None => Ok(value),
        }
    }
}

/// Registry and resolver for cross-version value conversions.
///
/// Migrators and subtype edges are registered during initialization
/// (`&mut self` methods); lookups and conversions are read-only and safe
/// to share across threads.
pub struct MigrationEngine {
    graph: TypeGraph,
    /// Pair-registered migrators, most recently registered first.
    by_pair: HashMap<MigratablePair, Vec<Arc<Migrator>>>,
    /// Pair-less conditional migrators, most recently registered first.
    globals: Vec<Arc<Migrator>>,
    /// Resolution outcomes keyed by the originally requested pair; `None`
    /// records that no migrator exists. Entries are never invalidated, so
    /// registering after the first lookup of a pair has no effect on it.
    cache: DashMap<MigratablePair, Option<Arc<Resolution>>>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an infallible conversion from `S` to `T`.
    pub fn add_migrator<S, T>(&mut self, f: impl Fn(S) -> T + Send + Sync + 'static)
    where
        S: Any + Send,
        T: Any + Send,
    {
        self.add_generic_migrator(Migrator::exact(f));
    }

    /// Register a conversion from `S` to `T` that may fail.
    pub fn add_fallible_migrator<S, T>(
        &mut self,
        f: impl Fn(S) -> Result<T, BoxError> + Send + Sync + 'static,
    ) where
        S: Any + Send,
        T: Any + Send,
    {
        self.add_generic_migrator(Migrator::fallible(f));
    }

    /// Register any migrator variant under its declared pairs.
    pub fn add_generic_migrator(&mut self, migrator: Migrator) {
        let migrator = Arc::new(migrator);
        let pairs = migrator.pairs().map(<[_]>::to_vec);
        match pairs {
            Some(pairs) => {
                for pair in pairs {
                    self.by_pair
                        .entry(pair)
                        .or_default()
                        .insert(0, Arc::clone(&migrator));
                }
            }
            None => self.globals.insert(0, migrator),
        }
    }

    /// Declare a subtype edge: a migrator registered for `Parent` then
    /// serves `Child` values through `project`.
    pub fn add_subtype<Child, Parent>(
        &mut self,
        project: impl Fn(Child) -> Parent + Send + Sync + 'static,
    ) where
        Child: Any + Send,
        Parent: Any + Send,
    {
        self.graph.add_edge(project);
    }

    /// Whether a conversion from `source` to `target` can be resolved.
    pub fn can_migrate(&self, source: TypeKey, target: TypeKey) -> bool {
        self.find(MigratablePair::new(source, target)).is_some()
    }

    /// Typed convenience over [`migrate`](Self::migrate).
    pub fn migrate_to<S, T>(&self, value: S) -> Result<T>
    where
        S: Any + Send,
        T: Any,
    {
        let out = self.migrate(Box::new(value), TypeKey::of::<S>(), TypeKey::of::<T>())?;
        out.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            Error::MigrationFailed {
                source: TypeKey::of::<S>().name().to_string(),
                target: TypeKey::of::<T>().name().to_string(),
                cause: "migrator produced a value of an unexpected type".into(),
            }
        })
    }

    /// Convert an erased value into the target type. `source` must name
    /// the concrete type of `value`.
    pub fn migrate(&self, value: AnyValue, source: TypeKey, target: TypeKey) -> Result<AnyValue> {
        if value.as_ref().type_id() != source.id() {
            return Err(Error::MigrationFailed {
                source: source.name().to_string(),
                target: target.name().to_string(),
                cause: "value is not an instance of the declared source type".into(),
            });
        }
        let requested = MigratablePair::new(source, target);
        match self.find(requested) {
            Some(resolution) => resolution.apply(value, requested),
            None => Err(Error::MigratorNotFound {
                source: source.name().to_string(),
                target: target.name().to_string(),
            }),
        }
    }

    fn find(&self, requested: MigratablePair) -> Option<Arc<Resolution>> {
        if let Some(cached) = self.cache.get(&requested) {
            return cached.value().clone();
        }
        let resolved = self.search(requested).map(Arc::new);
        self.cache.insert(requested, resolved.clone());
        resolved
    }

    fn search(&self, requested: MigratablePair) -> Option<Resolution> {
        let source_candidates = self.graph.ancestors(requested.source());
        let target_candidates = self.graph.ancestors(requested.target());

        for source_candidate in &source_candidates {
            for target_candidate in &target_candidates {
                let candidate = MigratablePair::new(source_candidate.key, target_candidate.key);
                if let Some(migrator) = self.registered_for(candidate, requested) {
                    debug!(
                        source = requested.source().name(),
                        target = requested.target().name(),
                        matched = %candidate,
                        "resolved migrator"
                    );
                    return Some(Resolution {
                        chain: source_candidate.chain.clone(),
                        migrator: Some(migrator),
                    });
                }
            }
        }

        // Default rule: a source assignable to the target passes through
        // its projection chain with no migrator.
        if let Some(ancestor) = source_candidates
            .iter()
            .find(|a| a.key == requested.target())
        {
            return Some(Resolution {
                chain: ancestor.chain.clone(),
                migrator: None,
            });
        }

        debug!(
            source = requested.source().name(),
            target = requested.target().name(),
            "no migrator found"
        );
        None
    }

    /// Migrators registered for `candidate`, newest first, then pair-less
    /// conditionals; the first one accepting the requested pair wins.
    fn registered_for(
        &self,
        candidate: MigratablePair,
        requested: MigratablePair,
    ) -> Option<Arc<Migrator>> {
        if let Some(registered) = self.by_pair.get(&candidate) {
            for migrator in registered {
                if migrator.accepts(requested) {
                    return Some(Arc::clone(migrator));
                }
            }
        }
        for migrator in &self.globals {
            if migrator.accepts(requested) {
                return Some(Arc::clone(migrator));
            }
        }
        None
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self {
            graph: TypeGraph::new(),
            by_pair: HashMap::new(),
            globals: Vec::new(),
            cache: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct PrefsV1 {
        field1: String,
    }
    #[derive(Debug, Clone, PartialEq)]
    struct PrefsV2 {
        field2: String,
    }
    #[derive(Debug, Clone, PartialEq)]
    struct AnyPrefs {
        raw: String,
    }

    fn upgrade(v1: PrefsV1) -> PrefsV2 {
        PrefsV2 { field2: v1.field1 }
    }

    // ==================== MigrationEngine Tests ====================

    #[test]
    fn exact_pair_migrates() {
        let mut engine = MigrationEngine::new();
        engine.add_migrator(upgrade);

        let out: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "value1".to_string(),
            })
            .unwrap();
        assert_eq!(out.field2, "value1");
    }

    #[test]
    fn later_registration_wins() {
        let mut engine = MigrationEngine::new();
        engine.add_migrator(|_: PrefsV1| PrefsV2 {
            field2: "old".to_string(),
        });
        engine.add_migrator(|_: PrefsV1| PrefsV2 {
            field2: "new".to_string(),
        });

        let out: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap();
        assert_eq!(out.field2, "new");
    }

    #[test]
    fn missing_migrator_is_an_error() {
        let engine = MigrationEngine::new();
        let err = engine
            .migrate_to::<PrefsV1, PrefsV2>(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::MigratorNotFound { .. }));
    }

    #[test]
    fn same_type_passes_through() {
        let engine = MigrationEngine::new();
        let out: PrefsV1 = engine
            .migrate_to(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap();
        assert_eq!(out.field1, "x");
    }

    #[test]
    fn subtype_uses_parent_migrator() {
        let mut engine = MigrationEngine::new();
        engine.add_subtype(|v1: PrefsV1| AnyPrefs { raw: v1.field1 });
        engine.add_migrator(|any: AnyPrefs| PrefsV2 { field2: any.raw });

        let out: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "value1".to_string(),
            })
            .unwrap();
        assert_eq!(out.field2, "value1");
    }

    #[test]
    fn exact_pair_beats_parent_pair() {
        let mut engine = MigrationEngine::new();
        engine.add_subtype(|v1: PrefsV1| AnyPrefs { raw: v1.field1 });
        engine.add_migrator(|_: AnyPrefs| PrefsV2 {
            field2: "via-parent".to_string(),
        });
        engine.add_migrator(|_: PrefsV1| PrefsV2 {
            field2: "via-exact".to_string(),
        });

        let out: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap();
        assert_eq!(out.field2, "via-exact");
    }

    #[test]
    fn subtype_reaches_supertype_without_migrator() {
        let mut engine = MigrationEngine::new();
        engine.add_subtype(|v1: PrefsV1| AnyPrefs { raw: v1.field1 });

        let out: AnyPrefs = engine
            .migrate_to(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap();
        assert_eq!(out.raw, "x");
    }

    #[test]
    fn resolution_is_cached() {
        let predicate_calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&predicate_calls);

        let mut engine = MigrationEngine::new();
        engine.add_generic_migrator(Migrator::conditional(
            move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                true
            },
            |v1: PrefsV1| Ok(upgrade(v1)),
        ));

        let _: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "a".to_string(),
            })
            .unwrap();
        let searches = predicate_calls.load(Ordering::SeqCst);

        let _: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "b".to_string(),
            })
            .unwrap();
        assert_eq!(predicate_calls.load(Ordering::SeqCst), searches);
    }

    #[test]
    fn no_match_results_are_cached() {
        let mut engine = MigrationEngine::new();
        assert!(!engine.can_migrate(TypeKey::of::<PrefsV1>(), TypeKey::of::<PrefsV2>()));

        // The failed lookup stays cached; registering afterwards does not
        // revive the pair, but pairs not yet looked up still resolve.
        engine.add_migrator(upgrade);
        assert!(!engine.can_migrate(TypeKey::of::<PrefsV1>(), TypeKey::of::<PrefsV2>()));
        assert!(engine.can_migrate(TypeKey::of::<PrefsV2>(), TypeKey::of::<PrefsV2>()));
    }

    #[test]
    fn conditional_predicate_gates_the_match() {
        let mut engine = MigrationEngine::new();
        engine.add_generic_migrator(Migrator::conditional(
            |_| false,
            |v1: PrefsV1| Ok(upgrade(v1)),
        ));

        let err = engine
            .migrate_to::<PrefsV1, PrefsV2>(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::MigratorNotFound { .. }));
    }

    #[test]
    fn global_migrator_serves_unregistered_pairs() {
        let mut engine = MigrationEngine::new();
        let convert: MigrateFn = Arc::new(|value, _| {
            let v1 = value
                .downcast::<PrefsV1>()
                .map_err(|_| -> BoxError { "not a PrefsV1".into() })?;
            Ok(Box::new(upgrade(*v1)) as AnyValue)
        });
        engine.add_generic_migrator(Migrator::global(
            |pair| pair.target() == TypeKey::of::<PrefsV2>(),
            convert,
        ));

        let out: PrefsV2 = engine
            .migrate_to(PrefsV1 {
                field1: "x".to_string(),
            })
            .unwrap();
        assert_eq!(out.field2, "x");
        assert!(!engine.can_migrate(TypeKey::of::<PrefsV2>(), TypeKey::of::<PrefsV1>()));
    }

    #[test]
    fn failing_migrator_wraps_the_cause() {
        let mut engine = MigrationEngine::new();
        engine.add_fallible_migrator(|_: PrefsV1| -> std::result::Result<PrefsV2, BoxError> {
            Err("field1 was empty".into())
        });

        let err = engine
            .migrate_to::<PrefsV1, PrefsV2>(PrefsV1 {
                field1: String::new(),
            })
            .unwrap_err();
        match err {
            Error::MigrationFailed { cause, .. } => {
                assert_eq!(cause.to_string(), "field1 was empty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let mut engine = MigrationEngine::new();
        engine.add_migrator(upgrade);

        let err = engine
            .migrate(
                Box::new(PrefsV2 {
                    field2: "x".to_string(),
                }),
                TypeKey::of::<PrefsV1>(),
                TypeKey::of::<PrefsV2>(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { .. }));
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MigrationEngine>();
    }
}
