//! # respec-core
//!
//! The deterministic specification reconciliation core for respec - THE LOGIC.
//!
//! This crate implements the CORE substrate: loading versioned declarative
//! schema definitions (collections, views, analyzers, stored queries),
//! diffing them against live database state, converging the database toward
//! the spec, and binding/executing stored queries against declared
//! parameter schemas.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is pure and deterministic: same spec + same live state = same plan
//! - Talks to the datastore only through the seams in `backend`
//! - Never interpolates client input into query text; values only ever
//!   travel as bind parameters
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
pub mod executor;
pub mod filter;
pub mod loader;
pub mod params;
pub mod primitives;
pub mod reconcile;
pub mod registry;
pub mod release;
pub mod source;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AnalyzerSpec, CollectionKind, CollectionSpec, FieldSchema, IndexSpec, ParamSchema, ParamType,
    RespecError, SpecModel, StoredQuerySpec, ViewLink, ViewSpec,
};

// =============================================================================
// RE-EXPORTS: Spec Pipeline
// =============================================================================

pub use loader::SpecLoader;
pub use reconcile::{
    EntityKey, EntityKind, OpReport, OpStatus, PlanOp, PlannedOp, ReconcileMode, ReconcileOutcome,
    ReconciliationPlan, Report, SchemaReconciler, SyncOptions, SyncOutcome, sync_once,
};
pub use release::{ReleaseStamp, ReleaseTracker};
pub use source::{LocalDirSource, SpecCheckout, SpecSource};

// =============================================================================
// RE-EXPORTS: Query Execution
// =============================================================================

pub use backend::{BoundQuery, DatabaseIntrospection, QueryBackend, SchemaAdmin};
pub use executor::{PagedResult, StoredQueryExecutor};
pub use filter::{CompiledFilter, FilterCondition, FilterExpressionBuilder};
pub use params::ParameterValidator;
pub use registry::StoredQueryRegistry;
pub use storage::MemoryDatabase;
