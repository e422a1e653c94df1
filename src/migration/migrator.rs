//! Registered migrators and their applicability rules.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::graph::{AnyValue, TypeKey};
use crate::BoxError;

/// The (source, target) type pair a conversion is keyed under.
///
/// Two pairs are equal only when both component types match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MigratablePair {
    source: TypeKey,
    target: TypeKey,
}

impl MigratablePair {
    pub fn new(source: TypeKey, target: TypeKey) -> Self {
        Self { source, target }
    }

    /// Pair for two concrete types.
    pub fn of<S: Any, T: Any>() -> Self {
        Self::new(TypeKey::of::<S>(), TypeKey::of::<T>())
    }

    pub fn source(&self) -> TypeKey {
        self.source
    }

    pub fn target(&self) -> TypeKey {
        self.target
    }
}

impl fmt::Display for MigratablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.name(), self.target.name())
    }
}

/// Erased conversion function. Receives the (possibly projected) source
/// value plus the originally requested pair for diagnostics and branching.
pub type MigrateFn = Arc<dyn Fn(AnyValue, MigratablePair) -> Result<AnyValue, BoxError> + Send + Sync>;

/// Predicate deciding whether a conditional migrator applies to a pair.
pub type MatchFn = Arc<dyn Fn(MigratablePair) -> bool + Send + Sync>;

/// A registered conversion between two settings types.
pub enum Migrator {
    /// Applies to exactly its declared pairs.
    Exact {
        pairs: Vec<MigratablePair>,
        convert: MigrateFn,
    },
    /// Applies to its declared pairs, or with `pairs: None` to any pair,
    /// but only when the predicate accepts the requested conversion.
    Conditional {
        pairs: Option<Vec<MigratablePair>>,
        matches: MatchFn,
        convert: MigrateFn,
    },
}

impl Migrator {
    /// Single-pair migrator from an infallible closure.
    pub fn exact<S, T>(f: impl Fn(S) -> T + Send + Sync + 'static) -> Self
    where
        S: Any + Send,
        T: Any + Send,
    {
        Self::fallible(move |source: S| Ok(f(source)))
    }

    /// Single-pair migrator whose closure may fail.
    pub fn fallible<S, T>(f: impl Fn(S) -> Result<T, BoxError> + Send + Sync + 'static) -> Self
    where
        S: Any + Send,
        T: Any + Send,
    {
        Self::Exact {
            pairs: vec![MigratablePair::of::<S, T>()],
            convert: adapt(f),
        }
    }

    /// Single-pair migrator guarded by a runtime predicate.
    pub fn conditional<S, T>(
        matches: impl Fn(MigratablePair) -> bool + Send + Sync + 'static,
        f: impl Fn(S) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self
    where
        S: Any + Send,
        T: Any + Send,
    {
        Self::Conditional {
            pairs: Some(vec![MigratablePair::of::<S, T>()]),
            matches: Arc::new(matches),
            convert: adapt(f),
        }
    }

    /// Migrator consulted for every requested pair, guarded only by its
    /// predicate. The conversion function works on erased values.
    pub fn global(
        matches: impl Fn(MigratablePair) -> bool + Send + Sync + 'static,
        convert: MigrateFn,
    ) -> Self {
        Self::Conditional {
            pairs: None,
            matches: Arc::new(matches),
            convert,
        }
    }

    /// Migrator registered under an explicit set of pairs with an erased
    /// conversion function.
    pub fn for_pairs(pairs: Vec<MigratablePair>, convert: MigrateFn) -> Self {
        Self::Exact { pairs, convert }
    }

    /// The pairs this migrator is registered under; `None` means it is
    /// consulted for every pair.
    pub(crate) fn pairs(&self) -> Option<&[MigratablePair]> {
        match self {
            Self::Exact { pairs, .. } => Some(pairs),
            Self::Conditional { pairs, .. } => pairs.as_deref(),
        }
    }

    /// Whether this migrator accepts the requested pair.
    pub(crate) fn accepts(&self, requested: MigratablePair) -> bool {
        match self {
            Self::Exact { .. } => true,
            Self::Conditional { matches, .. } => matches(requested),
        }
    }

    pub(crate) fn convert(
        &self,
        value: AnyValue,
        requested: MigratablePair,
    ) -> Result<AnyValue, BoxError> {
        let convert = match self {
            Self::Exact { convert, .. } | Self::Conditional { convert, .. } => convert,
        };
        convert(value, requested)
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { pairs, .. } => f
                .debug_struct("Exact")
                .field("pairs", pairs)
                .finish_non_exhaustive(),
            Self::Conditional { pairs, .. } => f
                .debug_struct("Conditional")
                .field("pairs", pairs)
                .finish_non_exhaustive(),
        }
    }
}

/// Wrap a typed closure into an erased conversion function.
fn adapt<S, T>(f: impl Fn(S) -> Result<T, BoxError> + Send + Sync + 'static) -> MigrateFn
where
    S: Any + Send,
    T: Any + Send,
{
    Arc::new(move |value: AnyValue, requested: MigratablePair| {
        let source = value.downcast::<S>().map_err(|_| -> BoxError {
            format!(
                "value handed to the migrator for {requested} is not a {}",
                std::any::type_name::<S>()
            )
            .into()
        })?;
        Ok(Box::new(f(*source)?) as AnyValue)
    })
}
