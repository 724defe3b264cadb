//! # Core Type Definitions
//!
//! This module contains all core types for the respec specification layer:
//! - The immutable specification snapshot (`SpecModel`)
//! - Per-category definitions (`CollectionSpec`, `ViewSpec`, `AnalyzerSpec`,
//!   `StoredQuerySpec`)
//! - Declared parameter schemas (`ParamSchema`, `ParamType`)
//! - Error types (`RespecError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use `BTreeMap`/`BTreeSet` only, for deterministic iteration order
//! - Are plain data: parsing and validation live in the loader, not here

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// SPEC MODEL
// =============================================================================

/// An immutable snapshot of one fetched specification release.
///
/// Built by the loader from a single checkout; never mutated afterwards.
/// Name uniqueness within each category is guaranteed by the map keys plus
/// duplicate detection at load time. Every cross-category reference
/// (view → analyzer, view → collection, edge → from/to) resolves within the
/// same model; the loader rejects dangling references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpecModel {
    /// Opaque release identifier for this snapshot.
    pub release_id: String,
    /// Collection definitions by name.
    pub collections: BTreeMap<String, CollectionSpec>,
    /// View definitions by name.
    pub views: BTreeMap<String, ViewSpec>,
    /// Analyzer definitions by name.
    pub analyzers: BTreeMap<String, AnalyzerSpec>,
    /// Stored-query definitions by name.
    pub stored_queries: BTreeMap<String, StoredQuerySpec>,
}

// =============================================================================
// COLLECTIONS
// =============================================================================

/// Kind of a collection: plain documents or graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// A document collection.
    Document,
    /// An edge collection linking documents across collections.
    Edge,
}

/// Constraint on a single document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field type name, passed through to the database (e.g. "string").
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether documents must carry this field.
    #[serde(default)]
    pub required: bool,
}

/// A secondary index on a collection.
///
/// Index identity is the pair (type, fields): indexes are never altered in
/// place, only created or dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index type name, passed through to the database (e.g. "persistent").
    #[serde(rename = "type")]
    pub index_type: String,
    /// Indexed fields, in declaration order.
    pub fields: Vec<String>,
}

/// A collection definition: document/edge kind, field schema, and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name, unique within the model.
    pub name: String,
    /// Document or edge collection.
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    /// Field constraints by field name.
    #[serde(default)]
    pub schema: BTreeMap<String, FieldSchema>,
    /// Ordered index declarations.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// For edge collections: collections edges may originate from.
    #[serde(default)]
    pub from: Vec<String>,
    /// For edge collections: collections edges may point to.
    #[serde(default)]
    pub to: Vec<String>,
}

// =============================================================================
// VIEWS & ANALYZERS
// =============================================================================

/// One collection link inside a view definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLink {
    /// Name of the linked collection; must exist in the model.
    pub collection: String,
    /// Analyzers applied to the indexed fields; must exist in the model.
    #[serde(default)]
    pub analyzers: Vec<String>,
    /// Fields of the collection indexed by this view.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// A search-index view over one or more collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    /// View name, unique within the model.
    pub name: String,
    /// View type name, passed through to the database (e.g. "search").
    #[serde(rename = "type")]
    pub view_type: String,
    /// Collection links; at least one is required.
    pub links: Vec<ViewLink>,
}

/// A text analyzer definition.
///
/// Properties are an opaque key → value map handed to the database unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerSpec {
    /// Analyzer name, unique within the model.
    pub name: String,
    /// Analyzer type name (e.g. "text").
    #[serde(rename = "type")]
    pub analyzer_type: String,
    /// Opaque configuration passed through to the database.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// STORED QUERIES
// =============================================================================

/// Declared type of a stored-query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// Epoch milliseconds as an integer.
    Timestamp,
    /// JSON array.
    List,
    /// JSON object.
    Object,
    /// A filter expression: disjunction of conjunction blocks.
    /// Compiled by the filter builder before binding.
    Filter,
}

impl ParamType {
    /// Human-readable name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Object => "object",
            Self::Filter => "filter",
        }
    }
}

/// Schema for one declared bind parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    /// Declared parameter type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the client must supply a value.
    #[serde(default)]
    pub required: bool,
    /// Static default substituted when the parameter is absent.
    /// `Timestamp` parameters without a default resolve to "now".
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// A named, parameterized query template with declared parameters.
///
/// The template text is opaque to the core; only its named placeholders
/// matter. Every placeholder must be bound before execution — the validator
/// guarantees a value (or default) for each declared parameter, and the
/// executor cross-checks the template's placeholders against the bound map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuerySpec {
    /// Query name, unique within the model.
    pub name: String,
    /// Query template with `@name` placeholders.
    pub query: String,
    /// Declared parameters by name.
    #[serde(default)]
    pub params: BTreeMap<String, ParamSchema>,
}

impl StoredQuerySpec {
    /// Named placeholders referenced by the template, deduplicated and sorted.
    ///
    /// A placeholder is `@` followed by `[A-Za-z0-9_]+`. The `@@name` form
    /// (collection placeholders) yields `@name` as the bound key, matching
    /// the wire convention of the underlying datastore.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        let mut out = std::collections::BTreeSet::new();
        let bytes = self.query.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'@' {
                let double = i + 1 < bytes.len() && bytes[i + 1] == b'@';
                let start = if double { i + 2 } else { i + 1 };
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    let name = &self.query[start..end];
                    if double {
                        out.insert(format!("@{name}"));
                    } else {
                        out.insert(name.to_string());
                    }
                }
                i = end.max(i + 1);
            } else {
                i += 1;
            }
        }
        out.into_iter().collect()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the respec system.
///
/// - Client input errors (`UnknownParameter`, `MissingRequiredParameter`,
///   `TypeMismatch`, `QueryNotFound`) are always recoverable and user-facing.
/// - `SpecParse` is fatal to one reconciliation attempt and never touches
///   the database.
/// - The CORE never panics; all errors must be recoverable.
#[derive(Debug, Error)]
pub enum RespecError {
    /// A specification file is malformed, duplicated, or dangling.
    #[error("spec parse error in {file}: {reason}")]
    SpecParse {
        /// Offending file (or category summary for aggregated errors).
        file: String,
        /// The specific structural defect.
        reason: String,
    },

    /// The spec source could not produce a checkout.
    #[error("spec source unavailable: {0}")]
    SourceUnavailable(String),

    /// No stored query with the given name exists.
    #[error("stored query not found: {0}")]
    QueryNotFound(String),

    /// A supplied parameter is not declared by the stored query.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A required parameter was not supplied.
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),

    /// A supplied parameter value does not match the declared type.
    #[error("type mismatch for parameter {param}: expected {expected}, got {got}")]
    TypeMismatch {
        /// The violated parameter.
        param: String,
        /// Declared type name.
        expected: &'static str,
        /// Description of the supplied value.
        got: String,
    },

    /// A template placeholder has no bound value.
    /// Indicates a defective stored-query definition, never client input.
    #[error("query {query} has unbound placeholder: {placeholder}")]
    UnboundPlaceholder {
        /// The stored query name.
        query: String,
        /// The unbound placeholder.
        placeholder: String,
    },

    /// A reconciliation pass is already running for this target.
    #[error("reconciliation in progress")]
    ReconcileInProgress,

    /// A schema or query operation failed in the database layer.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
