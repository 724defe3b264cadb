//! # Schema Reconciliation Module
//!
//! Diffs a loaded [`SpecModel`] against live database introspection and
//! converges the database toward the spec:
//! - `plan` computes an ordered list of schema operations (pure, no I/O)
//! - `apply` executes a plan through a [`SchemaAdmin`], recording per-op
//!   outcomes without rollback
//! - `sync_once` runs the whole pipeline: fetch, load, gate on the release
//!   tracker, plan, apply, publish the query registry
//!
//! ## Ordering
//!
//! Creates run analyzers → collections → indexes → views, so every entity
//! exists before anything referencing it. Prune drops run in the reverse
//! direction: views → indexes → analyzers → collections.
//!
//! ## Failure Semantics
//!
//! Operations are independent: a failed op is recorded and the pass
//! continues, but ops that depend on the failed entity are skipped rather
//! than attempted against a known-bad prerequisite, and a skipped entity
//! blocks its own dependents in turn. The release tracker is
//! only advanced on a fully `Complete` pass, so a partial pass is retried
//! on the next cycle.

use crate::backend::{DatabaseIntrospection, SchemaAdmin};
use crate::loader::SpecLoader;
use crate::registry::StoredQueryRegistry;
use crate::release::ReleaseTracker;
use crate::source::SpecSource;
use crate::types::{AnalyzerSpec, CollectionKind, CollectionSpec, IndexSpec, RespecError, SpecModel, ViewSpec};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// ENTITIES
// =============================================================================

/// Category of a schema entity, used for dependency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    /// A text analyzer.
    Analyzer,
    /// A document or edge collection.
    Collection,
    /// A secondary index on a collection.
    Index,
    /// A search view.
    View,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyzer => "analyzer",
            Self::Collection => "collection",
            Self::Index => "index",
            Self::View => "view",
        };
        write!(f, "{s}")
    }
}

/// Identity of one schema entity within a plan.
///
/// Indexes are identified by `collection/type(fields)` since they carry no
/// name of their own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityKey {
    /// Entity category.
    pub kind: EntityKind,
    /// Entity identity within the category.
    pub name: String,
}

impl EntityKey {
    fn analyzer(name: &str) -> Self {
        Self {
            kind: EntityKind::Analyzer,
            name: name.to_string(),
        }
    }

    fn collection(name: &str) -> Self {
        Self {
            kind: EntityKind::Collection,
            name: name.to_string(),
        }
    }

    fn index(collection: &str, index: &IndexSpec) -> Self {
        Self {
            kind: EntityKind::Index,
            name: format!(
                "{collection}/{}({})",
                index.index_type,
                index.fields.join(",")
            ),
        }
    }

    fn view(name: &str) -> Self {
        Self {
            kind: EntityKind::View,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

// =============================================================================
// PLAN
// =============================================================================

/// One schema operation the reconciler intends to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    /// Create a missing analyzer.
    CreateAnalyzer(AnalyzerSpec),
    /// Drop an analyzer (changed definition, or prune).
    DropAnalyzer(String),
    /// Create a missing collection.
    CreateCollection(CollectionSpec),
    /// Alter an existing collection's field schema in place.
    UpdateCollectionSchema(CollectionSpec),
    /// Drop a collection. Prune mode only.
    DropCollection(String),
    /// Create a missing index.
    CreateIndex {
        /// Owning collection.
        collection: String,
        /// Index definition.
        index: IndexSpec,
    },
    /// Drop a stale index. Prune mode only.
    DropIndex {
        /// Owning collection.
        collection: String,
        /// Index definition.
        index: IndexSpec,
    },
    /// Create or overwrite a view definition.
    CreateOrReplaceView(ViewSpec),
    /// Drop a view (analyzer recreation, or prune).
    DropView(String),
}

impl PlanOp {
    /// Short action label for reports and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateAnalyzer(_) => "create analyzer",
            Self::DropAnalyzer(_) => "drop analyzer",
            Self::CreateCollection(_) => "create collection",
            Self::UpdateCollectionSchema(_) => "update collection schema",
            Self::DropCollection(_) => "drop collection",
            Self::CreateIndex { .. } => "create index",
            Self::DropIndex { .. } => "drop index",
            Self::CreateOrReplaceView(_) => "create or replace view",
            Self::DropView(_) => "drop view",
        }
    }
}

/// A planned operation plus the entities it depends on.
///
/// An op is skipped at apply time when any dependency has already failed
/// within the same pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOp {
    /// The operation to perform.
    pub op: PlanOp,
    /// The entity this op creates, alters, or drops.
    pub entity: EntityKey,
    /// Entities whose ops must have succeeded earlier in the pass.
    pub deps: Vec<EntityKey>,
}

/// An ordered, executable schema plan for one release.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciliationPlan {
    /// Release identifier the plan converges toward.
    pub release_id: String,
    /// Operations in execution order.
    pub ops: Vec<PlannedOp>,
}

impl ReconciliationPlan {
    /// Whether the database already matches the spec.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of planned operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// One human-readable line per operation, in execution order.
    #[must_use]
    pub fn summary(&self) -> Vec<String> {
        self.ops
            .iter()
            .map(|p| format!("{} {}", p.op.label(), p.entity.name))
            .collect()
    }
}

/// How the reconciler treats live entities absent from the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Create and update only; live-only entities are left alone.
    #[default]
    Additive,
    /// Also drop live entities the spec no longer declares.
    Prune,
}

// =============================================================================
// REPORT
// =============================================================================

/// Outcome of one applied operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OpStatus {
    /// The operation succeeded.
    Applied,
    /// The operation failed with the given error message.
    Failed(String),
    /// The operation was not attempted because a dependency failed.
    Skipped {
        /// The failed entity this op depended on.
        dependency: EntityKey,
    },
}

/// Per-operation record in a reconciliation report.
#[derive(Debug, Clone, PartialEq)]
pub struct OpReport {
    /// The entity operated on.
    pub entity: EntityKey,
    /// Action label (e.g. "create analyzer").
    pub action: &'static str,
    /// What happened.
    pub status: OpStatus,
}

/// Overall outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every planned operation was applied.
    Complete,
    /// At least one operation failed or was skipped.
    Partial,
    /// The plan was empty; nothing to do.
    Noop,
}

/// The full record of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Release identifier the pass converged toward.
    pub release_id: String,
    /// Per-operation records, in execution order.
    pub ops: Vec<OpReport>,
    /// Overall outcome.
    pub outcome: ReconcileOutcome,
}

impl Report {
    /// Number of applied operations.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.ops
            .iter()
            .filter(|o| matches!(o.status, OpStatus::Applied))
            .count()
    }

    /// Number of failed operations.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.ops
            .iter()
            .filter(|o| matches!(o.status, OpStatus::Failed(_)))
            .count()
    }

    /// Number of skipped operations.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.ops
            .iter()
            .filter(|o| matches!(o.status, OpStatus::Skipped { .. }))
            .count()
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Pure planner and sequential executor for schema convergence.
pub struct SchemaReconciler;

impl SchemaReconciler {
    /// Compute the ordered operations that converge `live` toward `model`.
    ///
    /// Pure: no I/O, deterministic for a given (model, live, mode) triple.
    #[must_use]
    pub fn plan(
        model: &SpecModel,
        live: &DatabaseIntrospection,
        mode: ReconcileMode,
    ) -> ReconciliationPlan {
        let mut ops = Vec::new();

        // Analyzers whose live definition differs must be dropped and
        // recreated; their dependent views are dropped first and recreated
        // after, since the datastore refuses to drop a referenced analyzer.
        let changed_analyzers: BTreeSet<&str> = model
            .analyzers
            .iter()
            .filter(|(name, spec)| live.analyzers.get(*name).is_some_and(|l| l != *spec))
            .map(|(name, _)| name.as_str())
            .collect();

        let mut recreate_views: BTreeSet<&str> = BTreeSet::new();
        for (view_name, view) in &live.views {
            let references_changed = view.links.iter().any(|link| {
                link.analyzers
                    .iter()
                    .any(|a| changed_analyzers.contains(a.as_str()))
            });
            // Only spec-managed views are recreated; a live-only view that
            // pins a changed analyzer will surface as a drop_analyzer failure.
            if references_changed && model.views.contains_key(view_name) {
                recreate_views.insert(view_name.as_str());
            }
        }

        for view_name in &recreate_views {
            ops.push(PlannedOp {
                op: PlanOp::DropView((*view_name).to_string()),
                entity: EntityKey::view(view_name),
                deps: Vec::new(),
            });
        }

        for name in &changed_analyzers {
            let blocking_views: Vec<EntityKey> = recreate_views
                .iter()
                .filter(|v| {
                    live.views.get(**v).is_some_and(|view| {
                        view.links
                            .iter()
                            .any(|link| link.analyzers.iter().any(|a| a == name))
                    })
                })
                .map(|v| EntityKey::view(v))
                .collect();
            ops.push(PlannedOp {
                op: PlanOp::DropAnalyzer((*name).to_string()),
                entity: EntityKey::analyzer(name),
                deps: blocking_views,
            });
        }

        for (name, spec) in &model.analyzers {
            if !live.analyzers.contains_key(name) {
                ops.push(PlannedOp {
                    op: PlanOp::CreateAnalyzer(spec.clone()),
                    entity: EntityKey::analyzer(name),
                    deps: Vec::new(),
                });
            } else if changed_analyzers.contains(name.as_str()) {
                // Recreate after the drop; skipped if the drop failed.
                ops.push(PlannedOp {
                    op: PlanOp::CreateAnalyzer(spec.clone()),
                    entity: EntityKey::analyzer(name),
                    deps: vec![EntityKey::analyzer(name)],
                });
            }
        }

        // Collections: documents before edges so edge endpoints exist.
        let new_collections: BTreeSet<&str> = model
            .collections
            .keys()
            .filter(|name| !live.collections.contains_key(*name))
            .map(String::as_str)
            .collect();

        let create_order = model
            .collections
            .values()
            .filter(|c| new_collections.contains(c.name.as_str()))
            .filter(|c| c.kind == CollectionKind::Document)
            .chain(
                model
                    .collections
                    .values()
                    .filter(|c| new_collections.contains(c.name.as_str()))
                    .filter(|c| c.kind == CollectionKind::Edge),
            );
        for spec in create_order {
            let deps: Vec<EntityKey> = spec
                .from
                .iter()
                .chain(spec.to.iter())
                .filter(|endpoint| new_collections.contains(endpoint.as_str()))
                .map(|endpoint| EntityKey::collection(endpoint))
                .collect();
            ops.push(PlannedOp {
                op: PlanOp::CreateCollection(spec.clone()),
                entity: EntityKey::collection(&spec.name),
                deps,
            });
        }

        for (name, spec) in &model.collections {
            if let Some(live_coll) = live.collections.get(name)
                && Self::collection_changed(spec, live_coll)
            {
                ops.push(PlannedOp {
                    op: PlanOp::UpdateCollectionSchema(spec.clone()),
                    entity: EntityKey::collection(name),
                    deps: Vec::new(),
                });
            }
        }

        // Indexes: identity is (type, fields); missing ones are created.
        let no_indexes = Vec::new();
        for (name, spec) in &model.collections {
            let live_indexes = live.indexes.get(name).unwrap_or(&no_indexes);
            for index in &spec.indexes {
                if !live_indexes.contains(index) {
                    let deps = if new_collections.contains(name.as_str()) {
                        vec![EntityKey::collection(name)]
                    } else {
                        Vec::new()
                    };
                    ops.push(PlannedOp {
                        op: PlanOp::CreateIndex {
                            collection: name.clone(),
                            index: index.clone(),
                        },
                        entity: EntityKey::index(name, index),
                        deps,
                    });
                }
            }
        }

        // Views: new, changed, or forced by an analyzer recreation.
        for (name, spec) in &model.views {
            let needs_apply = match live.views.get(name) {
                None => true,
                Some(live_view) => live_view != spec || recreate_views.contains(name.as_str()),
            };
            if needs_apply {
                let mut deps = Vec::new();
                for link in &spec.links {
                    if new_collections.contains(link.collection.as_str()) {
                        deps.push(EntityKey::collection(&link.collection));
                    }
                    for analyzer in &link.analyzers {
                        if changed_analyzers.contains(analyzer.as_str())
                            || !live.analyzers.contains_key(analyzer)
                        {
                            deps.push(EntityKey::analyzer(analyzer));
                        }
                    }
                }
                deps.sort();
                deps.dedup();
                ops.push(PlannedOp {
                    op: PlanOp::CreateOrReplaceView(spec.clone()),
                    entity: EntityKey::view(name),
                    deps,
                });
            }
        }

        if mode == ReconcileMode::Prune {
            Self::plan_prune(model, live, &mut ops);
        }

        ReconciliationPlan {
            release_id: model.release_id.clone(),
            ops,
        }
    }

    /// Append drops of live entities the spec no longer declares.
    /// Drop order is the reverse of create order.
    fn plan_prune(model: &SpecModel, live: &DatabaseIntrospection, ops: &mut Vec<PlannedOp>) {
        let dropped_views: BTreeSet<&str> = live
            .views
            .keys()
            .filter(|name| !model.views.contains_key(*name))
            .map(String::as_str)
            .collect();
        for name in &dropped_views {
            ops.push(PlannedOp {
                op: PlanOp::DropView((*name).to_string()),
                entity: EntityKey::view(name),
                deps: Vec::new(),
            });
        }

        for (collection, live_indexes) in &live.indexes {
            let Some(spec) = model.collections.get(collection) else {
                // The whole collection is dropped below; its indexes go with it.
                continue;
            };
            for index in live_indexes {
                if !spec.indexes.contains(index) {
                    ops.push(PlannedOp {
                        op: PlanOp::DropIndex {
                            collection: collection.clone(),
                            index: index.clone(),
                        },
                        entity: EntityKey::index(collection, index),
                        deps: Vec::new(),
                    });
                }
            }
        }

        for name in live.analyzers.keys() {
            if !model.analyzers.contains_key(name) {
                let blocking: Vec<EntityKey> = dropped_views
                    .iter()
                    .filter(|v| {
                        live.views.get(**v).is_some_and(|view| {
                            view.links
                                .iter()
                                .any(|link| link.analyzers.iter().any(|a| a == name))
                        })
                    })
                    .map(|v| EntityKey::view(v))
                    .collect();
                ops.push(PlannedOp {
                    op: PlanOp::DropAnalyzer(name.clone()),
                    entity: EntityKey::analyzer(name),
                    deps: blocking,
                });
            }
        }

        for name in live.collections.keys() {
            if !model.collections.contains_key(name) {
                let blocking: Vec<EntityKey> = dropped_views
                    .iter()
                    .filter(|v| {
                        live.views.get(**v).is_some_and(|view| {
                            view.links.iter().any(|link| &link.collection == name)
                        })
                    })
                    .map(|v| EntityKey::view(v))
                    .collect();
                ops.push(PlannedOp {
                    op: PlanOp::DropCollection(name.clone()),
                    entity: EntityKey::collection(name),
                    deps: blocking,
                });
            }
        }
    }

    /// Whether a collection's alterable definition differs from live.
    /// The `indexes` field is diffed separately and ignored here.
    fn collection_changed(spec: &CollectionSpec, live: &CollectionSpec) -> bool {
        spec.kind != live.kind
            || spec.schema != live.schema
            || spec.from != live.from
            || spec.to != live.to
    }

    /// Execute a plan sequentially, recording each operation's outcome.
    ///
    /// No rollback: a failed op is recorded and later ops continue, except
    /// those depending on a failed or skipped entity, which are skipped.
    /// A skipped op blocks its dependents the same way a failed one does:
    /// its entity never reached the planned state.
    pub fn apply(plan: &ReconciliationPlan, admin: &mut dyn SchemaAdmin) -> Report {
        let mut blocked: BTreeSet<EntityKey> = BTreeSet::new();
        let mut ops = Vec::with_capacity(plan.ops.len());

        for planned in &plan.ops {
            if let Some(dependency) = planned.deps.iter().find(|d| blocked.contains(*d)) {
                blocked.insert(planned.entity.clone());
                ops.push(OpReport {
                    entity: planned.entity.clone(),
                    action: planned.op.label(),
                    status: OpStatus::Skipped {
                        dependency: dependency.clone(),
                    },
                });
                continue;
            }

            let result = match &planned.op {
                PlanOp::CreateAnalyzer(spec) => admin.create_analyzer(spec),
                PlanOp::DropAnalyzer(name) => admin.drop_analyzer(name),
                PlanOp::CreateCollection(spec) => admin.create_collection(spec),
                PlanOp::UpdateCollectionSchema(spec) => admin.update_collection_schema(spec),
                PlanOp::DropCollection(name) => admin.drop_collection(name),
                PlanOp::CreateIndex { collection, index } => {
                    admin.create_index(collection, index)
                }
                PlanOp::DropIndex { collection, index } => admin.drop_index(collection, index),
                PlanOp::CreateOrReplaceView(spec) => admin.create_or_replace_view(spec),
                PlanOp::DropView(name) => admin.drop_view(name),
            };

            let status = match result {
                Ok(()) => OpStatus::Applied,
                Err(e) => {
                    blocked.insert(planned.entity.clone());
                    OpStatus::Failed(e.to_string())
                }
            };
            ops.push(OpReport {
                entity: planned.entity.clone(),
                action: planned.op.label(),
                status,
            });
        }

        let outcome = if ops.is_empty() {
            ReconcileOutcome::Noop
        } else if ops.iter().all(|o| matches!(o.status, OpStatus::Applied)) {
            ReconcileOutcome::Complete
        } else {
            ReconcileOutcome::Partial
        };

        Report {
            release_id: plan.release_id.clone(),
            ops,
            outcome,
        }
    }
}

// =============================================================================
// SYNC PIPELINE
// =============================================================================

/// Knobs for one sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Reconcile even when the tracker says the release is current.
    pub force: bool,
    /// Whether live-only entities are dropped.
    pub mode: ReconcileMode,
    /// Plan only; do not touch the database or the tracker.
    pub dry_run: bool,
}

/// Result of one sync pass.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The tracked release matches the source; reconciliation was skipped.
    UpToDate {
        /// The already-reconciled release identifier.
        release_id: String,
    },
    /// Dry run: the plan that would have been applied.
    Planned {
        /// The computed plan.
        plan: ReconciliationPlan,
        /// The loaded model (for inspection).
        model: SpecModel,
    },
    /// The plan was applied (fully or partially).
    Applied {
        /// Per-operation outcomes.
        report: Report,
        /// The loaded model now serving queries.
        model: SpecModel,
    },
}

/// Fetch, load, and reconcile one release end to end.
///
/// The stored-query registry is republished from the loaded model even when
/// reconciliation is skipped, so a fresh process serves queries immediately.
/// The tracker only advances on a `Complete` (or `Noop`) apply.
///
/// Callers are responsible for serializing concurrent passes against the
/// same database; the pipeline itself takes exclusive admin access.
pub fn sync_once(
    source: &dyn SpecSource,
    admin: &mut dyn SchemaAdmin,
    tracker: &mut ReleaseTracker,
    registry: &StoredQueryRegistry,
    options: &SyncOptions,
) -> Result<SyncOutcome, RespecError> {
    let checkout = source.fetch()?;
    let model = SpecLoader::load(&checkout)?;
    registry.publish(&model);

    if !options.force && tracker.is_current(&model.release_id)? {
        return Ok(SyncOutcome::UpToDate {
            release_id: model.release_id,
        });
    }

    let live = admin.introspect()?;
    let plan = SchemaReconciler::plan(&model, &live, options.mode);

    if options.dry_run {
        return Ok(SyncOutcome::Planned { plan, model });
    }

    let report = SchemaReconciler::apply(&plan, admin);
    if matches!(
        report.outcome,
        ReconcileOutcome::Complete | ReconcileOutcome::Noop
    ) {
        tracker.mark_complete(&model.release_id)?;
    }

    Ok(SyncOutcome::Applied { report, model })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::MemoryDatabase;
    use crate::types::ViewLink;
    use std::collections::BTreeMap;

    fn analyzer(name: &str) -> AnalyzerSpec {
        AnalyzerSpec {
            name: name.to_string(),
            analyzer_type: "text".to_string(),
            properties: BTreeMap::new(),
        }
    }

    fn collection(name: &str) -> CollectionSpec {
        CollectionSpec {
            name: name.to_string(),
            kind: CollectionKind::Document,
            schema: BTreeMap::new(),
            indexes: Vec::new(),
            from: Vec::new(),
            to: Vec::new(),
        }
    }

    fn view(name: &str, coll: &str, analyzers: &[&str]) -> ViewSpec {
        ViewSpec {
            name: name.to_string(),
            view_type: "search".to_string(),
            links: vec![ViewLink {
                collection: coll.to_string(),
                analyzers: analyzers.iter().map(|s| (*s).to_string()).collect(),
                fields: vec!["scientific_name".to_string()],
            }],
        }
    }

    fn model() -> SpecModel {
        let mut m = SpecModel {
            release_id: "v1".to_string(),
            ..SpecModel::default()
        };
        m.analyzers.insert("text_en".to_string(), analyzer("text_en"));
        m.collections.insert("taxon".to_string(), collection("taxon"));
        m.views.insert(
            "taxon_search".to_string(),
            view("taxon_search", "taxon", &["text_en"]),
        );
        m
    }

    #[test]
    fn empty_everything_plans_nothing() {
        let plan = SchemaReconciler::plan(
            &SpecModel::default(),
            &DatabaseIntrospection::default(),
            ReconcileMode::Additive,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn fresh_database_creates_in_dependency_order() {
        let plan = SchemaReconciler::plan(
            &model(),
            &DatabaseIntrospection::default(),
            ReconcileMode::Additive,
        );
        let kinds: Vec<EntityKind> = plan.ops.iter().map(|o| o.entity.kind).collect();
        assert_eq!(
            kinds,
            vec![EntityKind::Analyzer, EntityKind::Collection, EntityKind::View]
        );
        // The view waits on both the new analyzer and the new collection.
        let view_op = plan.ops.last().expect("view op");
        assert!(view_op.deps.contains(&EntityKey::analyzer("text_en")));
        assert!(view_op.deps.contains(&EntityKey::collection("taxon")));
    }

    #[test]
    fn apply_then_replan_is_empty() {
        let mut db = MemoryDatabase::new();
        let m = model();
        let plan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        let report = SchemaReconciler::apply(&plan, &mut db);
        assert_eq!(report.outcome, ReconcileOutcome::Complete);

        let replan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        assert!(replan.is_empty(), "unexpected ops: {:?}", replan.summary());
    }

    #[test]
    fn changed_analyzer_recreates_dependent_view() {
        let mut db = MemoryDatabase::new();
        let mut m = model();
        let first = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        SchemaReconciler::apply(&first, &mut db);

        // Change the analyzer definition.
        m.analyzers
            .get_mut("text_en")
            .expect("analyzer")
            .properties
            .insert("locale".to_string(), serde_json::json!("en.utf-8"));

        let plan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        let labels: Vec<&str> = plan.ops.iter().map(|o| o.op.label()).collect();
        assert_eq!(
            labels,
            vec![
                "drop view",
                "drop analyzer",
                "create analyzer",
                "create or replace view"
            ]
        );

        let report = SchemaReconciler::apply(&plan, &mut db);
        assert_eq!(report.outcome, ReconcileOutcome::Complete);
        let replan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        assert!(replan.is_empty());
    }

    #[test]
    fn failed_dependency_skips_dependents() {
        let mut db = MemoryDatabase::new();
        db.fail_on("text_en");
        let plan = SchemaReconciler::plan(
            &model(),
            &db.introspect().expect("introspect"),
            ReconcileMode::Additive,
        );
        let report = SchemaReconciler::apply(&plan, &mut db);
        assert_eq!(report.outcome, ReconcileOutcome::Partial);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        // The collection does not depend on the analyzer and still lands.
        assert_eq!(report.applied(), 1);

        let skipped = report
            .ops
            .iter()
            .find(|o| matches!(o.status, OpStatus::Skipped { .. }))
            .expect("skipped op");
        assert_eq!(skipped.entity, EntityKey::view("taxon_search"));
        match &skipped.status {
            OpStatus::Skipped { dependency } => {
                assert_eq!(*dependency, EntityKey::analyzer("text_en"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn skipped_dependency_blocks_transitively() {
        let mut db = MemoryDatabase::new();
        let mut m = model();
        let first = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        SchemaReconciler::apply(&first, &mut db);

        // Changing the analyzer plans: drop view, drop analyzer,
        // create analyzer, create or replace view.
        m.analyzers
            .get_mut("text_en")
            .expect("analyzer")
            .properties
            .insert("locale".to_string(), serde_json::json!("en.utf-8"));
        let plan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);

        // The view drop fails, so the analyzer drop is skipped. The analyzer
        // recreate must then be skipped too, not issued against the still
        // existing old analyzer.
        db.fail_on("taxon_search");
        let report = SchemaReconciler::apply(&plan, &mut db);
        assert_eq!(report.outcome, ReconcileOutcome::Partial);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.applied(), 0);

        let statuses: Vec<(&str, &OpStatus)> = report
            .ops
            .iter()
            .map(|o| (o.action, &o.status))
            .collect();
        assert!(matches!(statuses[0], ("drop view", OpStatus::Failed(_))));
        assert!(matches!(statuses[1], ("drop analyzer", OpStatus::Skipped { .. })));
        assert!(matches!(statuses[2], ("create analyzer", OpStatus::Skipped { .. })));
        assert!(matches!(
            statuses[3],
            ("create or replace view", OpStatus::Skipped { .. })
        ));

        // The old analyzer and view survive untouched for the retry.
        let live = db.introspect().expect("introspect");
        assert!(live.analyzers["text_en"].properties.is_empty());
        assert!(live.views.contains_key("taxon_search"));
    }

    #[test]
    fn additive_mode_leaves_live_only_entities() {
        let mut db = MemoryDatabase::new();
        db.create_collection(&collection("legacy")).expect("create");
        let plan = SchemaReconciler::plan(
            &model(),
            &db.introspect().expect("introspect"),
            ReconcileMode::Additive,
        );
        assert!(
            !plan
                .ops
                .iter()
                .any(|o| matches!(o.op, PlanOp::DropCollection(_)))
        );
    }

    #[test]
    fn prune_mode_drops_live_only_in_reverse_order() {
        let mut db = MemoryDatabase::new();
        let m = model();
        let first = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        SchemaReconciler::apply(&first, &mut db);

        // Empty spec: everything live becomes prunable.
        let empty = SpecModel {
            release_id: "v2".to_string(),
            ..SpecModel::default()
        };
        let plan = SchemaReconciler::plan(
            &empty,
            &db.introspect().expect("introspect"),
            ReconcileMode::Prune,
        );
        let labels: Vec<&str> = plan.ops.iter().map(|o| o.op.label()).collect();
        assert_eq!(labels, vec!["drop view", "drop analyzer", "drop collection"]);

        let report = SchemaReconciler::apply(&plan, &mut db);
        assert_eq!(report.outcome, ReconcileOutcome::Complete);
        let live = db.introspect().expect("introspect");
        assert!(live.collections.is_empty());
        assert!(live.views.is_empty());
        assert!(live.analyzers.is_empty());
    }

    #[test]
    fn edge_collections_created_after_endpoints() {
        let mut m = SpecModel {
            release_id: "v1".to_string(),
            ..SpecModel::default()
        };
        m.collections.insert("taxon".to_string(), collection("taxon"));
        let mut edge = collection("child_of");
        edge.kind = CollectionKind::Edge;
        edge.from = vec!["taxon".to_string()];
        edge.to = vec!["taxon".to_string()];
        m.collections.insert("child_of".to_string(), edge);

        let plan = SchemaReconciler::plan(
            &m,
            &DatabaseIntrospection::default(),
            ReconcileMode::Additive,
        );
        let names: Vec<&str> = plan.ops.iter().map(|o| o.entity.name.as_str()).collect();
        assert_eq!(names, vec!["taxon", "child_of"]);
        assert_eq!(plan.ops[1].deps, vec![EntityKey::collection("taxon")]);
    }

    #[test]
    fn schema_change_updates_in_place() {
        let mut db = MemoryDatabase::new();
        let mut m = model();
        let first = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        SchemaReconciler::apply(&first, &mut db);

        m.collections
            .get_mut("taxon")
            .expect("collection")
            .schema
            .insert(
                "rank".to_string(),
                crate::types::FieldSchema {
                    field_type: "string".to_string(),
                    required: true,
                },
            );
        let plan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.ops[0].op.label(), "update collection schema");
    }

    #[test]
    fn missing_index_is_created() {
        let mut db = MemoryDatabase::new();
        let mut m = model();
        let first = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        SchemaReconciler::apply(&first, &mut db);

        m.collections
            .get_mut("taxon")
            .expect("collection")
            .indexes
            .push(IndexSpec {
                index_type: "persistent".to_string(),
                fields: vec!["id".to_string()],
            });
        let plan = SchemaReconciler::plan(&m, &db.introspect().expect("introspect"), ReconcileMode::Additive);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.ops[0].op.label(), "create index");
        // Existing collection: the index op carries no dependency.
        assert!(plan.ops[0].deps.is_empty());
    }
}
