//! # Stored Query Registry Module
//!
//! Name → stored-query lookup for the execution path.
//!
//! The registry is populated wholesale from the current [`SpecModel`]
//! whenever a load completes: a new snapshot map is built off to the side
//! and published by atomic swap, so concurrent readers always observe one
//! complete snapshot — old or new, never a partially-loaded mix.

use crate::types::{RespecError, SpecModel, StoredQuerySpec};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type Snapshot = Arc<BTreeMap<String, Arc<StoredQuerySpec>>>;

// =============================================================================
// REGISTRY
// =============================================================================

/// Snapshot-published index of stored-query definitions.
#[derive(Debug, Default)]
pub struct StoredQueryRegistry {
    snapshot: RwLock<Snapshot>,
}

impl StoredQueryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated from a model.
    #[must_use]
    pub fn from_model(model: &SpecModel) -> Self {
        let registry = Self::new();
        registry.publish(model);
        registry
    }

    /// Replace the entire snapshot with the model's stored queries.
    pub fn publish(&self, model: &SpecModel) {
        let next: Snapshot = Arc::new(
            model
                .stored_queries
                .iter()
                .map(|(name, spec)| (name.clone(), Arc::new(spec.clone())))
                .collect(),
        );
        // A poisoned lock means a writer panicked mid-swap; the snapshot it
        // held is still a complete map, so recover rather than propagate.
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Look up a stored query by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<StoredQuerySpec>, RespecError> {
        self.current()
            .get(name)
            .cloned()
            .ok_or_else(|| RespecError::QueryNotFound(name.to_string()))
    }

    /// Names of all registered queries, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.current().keys().cloned().collect()
    }

    /// Number of registered queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Whether no queries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn current(&self) -> Snapshot {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoredQuerySpec;

    fn model_with(names: &[&str]) -> SpecModel {
        let mut model = SpecModel::default();
        for name in names {
            model.stored_queries.insert(
                (*name).to_string(),
                StoredQuerySpec {
                    name: (*name).to_string(),
                    query: "RETURN 1".to_string(),
                    params: BTreeMap::new(),
                },
            );
        }
        model
    }

    #[test]
    fn lookup_unknown_is_not_found() {
        let registry = StoredQueryRegistry::new();
        let err = registry.lookup("nope").expect_err("must fail");
        assert!(matches!(err, RespecError::QueryNotFound(ref n) if n == "nope"));
    }

    #[test]
    fn publish_replaces_wholesale() {
        let registry = StoredQueryRegistry::from_model(&model_with(&["a", "b"]));
        assert_eq!(registry.names(), vec!["a", "b"]);

        registry.publish(&model_with(&["c"]));
        assert_eq!(registry.names(), vec!["c"]);
        assert!(registry.lookup("a").is_err());
        assert!(registry.lookup("c").is_ok());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let registry = StoredQueryRegistry::from_model(&model_with(&["a"]));
        let held = registry.lookup("a").expect("lookup");
        registry.publish(&model_with(&["b"]));
        // The Arc held by the reader survives the swap.
        assert_eq!(held.name, "a");
    }
}
