//! # Database Seam Module
//!
//! Traits through which the core talks to the underlying document/graph
//! datastore. The core never depends on a concrete driver: reconciliation
//! sees the schema side ([`SchemaAdmin`]), execution sees the query side
//! ([`QueryBackend`]).
//!
//! Implementations must propagate their own timeouts and cancellations as
//! errors rather than masking them; the core imposes no timeout policy of
//! its own.

use crate::types::{AnalyzerSpec, CollectionSpec, IndexSpec, RespecError, ViewSpec};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// INTROSPECTION
// =============================================================================

/// Observed schema state of the live database.
///
/// Reuses the spec definition types so the reconciler can diff desired
/// against observed structurally. Collection entries carry kind, schema and
/// edge endpoints; indexes are reported per collection in the separate map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseIntrospection {
    /// Live collections by name (the `indexes` field is always empty here).
    pub collections: BTreeMap<String, CollectionSpec>,
    /// Live indexes per collection.
    pub indexes: BTreeMap<String, Vec<IndexSpec>>,
    /// Live views by name.
    pub views: BTreeMap<String, ViewSpec>,
    /// Live analyzers by name.
    pub analyzers: BTreeMap<String, AnalyzerSpec>,
}

// =============================================================================
// SCHEMA ADMINISTRATION
// =============================================================================

/// Schema-side database operations used by the reconciler.
///
/// Every mutation is expected to be idempotent-friendly at the entity level:
/// the reconciler only issues an operation when the diff demands it, and a
/// failed operation is recorded, never retried within the pass.
pub trait SchemaAdmin {
    /// Report the current schema state.
    fn introspect(&self) -> Result<DatabaseIntrospection, RespecError>;

    /// Create a collection (documents or edges).
    fn create_collection(&mut self, spec: &CollectionSpec) -> Result<(), RespecError>;

    /// Alter a collection's field schema in place.
    ///
    /// Kind changes (document ↔ edge) are not alterable and must fail.
    fn update_collection_schema(&mut self, spec: &CollectionSpec) -> Result<(), RespecError>;

    /// Drop a collection and its documents. Prune mode only.
    fn drop_collection(&mut self, name: &str) -> Result<(), RespecError>;

    /// Create an index on a collection.
    fn create_index(&mut self, collection: &str, index: &IndexSpec) -> Result<(), RespecError>;

    /// Drop an index from a collection.
    fn drop_index(&mut self, collection: &str, index: &IndexSpec) -> Result<(), RespecError>;

    /// Create an analyzer.
    fn create_analyzer(&mut self, spec: &AnalyzerSpec) -> Result<(), RespecError>;

    /// Drop an analyzer. Fails while views still reference it.
    fn drop_analyzer(&mut self, name: &str) -> Result<(), RespecError>;

    /// Create a view, replacing any existing definition under the name.
    fn create_or_replace_view(&mut self, spec: &ViewSpec) -> Result<(), RespecError>;

    /// Drop a view.
    fn drop_view(&mut self, name: &str) -> Result<(), RespecError>;
}

// =============================================================================
// QUERY EXECUTION
// =============================================================================

/// A query template paired with its fully bound parameter map.
///
/// Constructed only by the executor after validation; by the time a
/// `BoundQuery` exists, every placeholder in the template has a value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    /// The stored query's template text, uninterpolated.
    pub template: String,
    /// Placeholder name → bound value.
    pub bind_vars: BTreeMap<String, Value>,
}

/// Query-side database operations used by the executor.
pub trait QueryBackend {
    /// Execute a bound query and return the matching documents.
    fn run(&self, query: &BoundQuery) -> Result<Vec<Value>, RespecError>;
}
