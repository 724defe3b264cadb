//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use respec_core::{OpStatus, PagedResult, Report, RespecError, StoredQuerySpec, SyncOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Server status: tracked release plus schema/query counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Last fully reconciled release, if any.
    pub release_id: Option<String>,
    /// Completion time of that reconciliation, epoch milliseconds.
    pub applied_at_ms: Option<i64>,
    pub stored_queries: usize,
    pub collections: usize,
    pub views: usize,
    pub analyzers: usize,
}

// =============================================================================
// STORED QUERY LISTING
// =============================================================================

/// Names of all registered stored queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryListResponse {
    pub queries: Vec<String>,
}

/// One stored query's declared interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDetailResponse {
    pub name: String,
    /// Declared parameter schemas, by name.
    pub params: Value,
    /// Placeholders referenced by the template.
    pub placeholders: Vec<String>,
}

impl QueryDetailResponse {
    pub fn from_spec(spec: &StoredQuerySpec) -> Self {
        Self {
            name: spec.name.clone(),
            params: serde_json::to_value(&spec.params).unwrap_or(Value::Null),
            placeholders: spec.placeholders(),
        }
    }
}

// =============================================================================
// QUERY EXECUTION
// =============================================================================

/// Stored query execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Name of the stored query to run.
    pub stored_query: String,
    /// Client parameter map, validated against the declared schema.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Stored query execution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub results: Vec<Value>,
    pub count: u64,
    pub has_more: bool,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn success(page: PagedResult) -> Self {
        Self {
            success: true,
            results: page.results,
            count: page.count,
            has_more: page.has_more,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            results: vec![],
            count: 0,
            has_more: false,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// DOCUMENT INSERTION
// =============================================================================

/// Bulk document insertion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsRequest {
    /// Target collection; must exist in the reconciled schema.
    pub collection: String,
    /// Documents to insert, validated against the collection schema.
    pub documents: Vec<Value>,
}

/// Bulk document insertion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub success: bool,
    pub inserted: usize,
    pub error: Option<String>,
}

impl DocumentsResponse {
    pub fn success(inserted: usize) -> Self {
        Self {
            success: true,
            inserted,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            inserted: 0,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// SYNC
// =============================================================================

/// Reconciliation trigger request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    /// Reconcile even when the tracker says the release is current.
    pub force: bool,
    /// Also drop live entities the spec no longer declares.
    pub prune: bool,
    /// Plan only; report without touching the database.
    pub dry_run: bool,
}

/// Per-operation record in a sync response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOpJson {
    pub action: String,
    pub entity: String,
    pub status: String,
}

/// Reconciliation trigger response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    /// One of "up_to_date", "planned", "complete", "partial", "noop".
    pub outcome: String,
    pub release_id: Option<String>,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub operations: Vec<SyncOpJson>,
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn from_outcome(outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::UpToDate { release_id } => Self {
                success: true,
                outcome: "up_to_date".to_string(),
                release_id: Some(release_id.clone()),
                applied: 0,
                failed: 0,
                skipped: 0,
                operations: vec![],
                error: None,
            },
            SyncOutcome::Planned { plan, model } => Self {
                success: true,
                outcome: "planned".to_string(),
                release_id: Some(model.release_id.clone()),
                applied: 0,
                failed: 0,
                skipped: 0,
                operations: plan
                    .ops
                    .iter()
                    .map(|op| SyncOpJson {
                        action: op.op.label().to_string(),
                        entity: op.entity.to_string(),
                        status: "planned".to_string(),
                    })
                    .collect(),
                error: None,
            },
            SyncOutcome::Applied { report, .. } => Self::from_report(report),
        }
    }

    fn from_report(report: &Report) -> Self {
        let outcome = match report.outcome {
            respec_core::ReconcileOutcome::Complete => "complete",
            respec_core::ReconcileOutcome::Partial => "partial",
            respec_core::ReconcileOutcome::Noop => "noop",
        };
        Self {
            success: report.failed() == 0,
            outcome: outcome.to_string(),
            release_id: Some(report.release_id.clone()),
            applied: report.applied(),
            failed: report.failed(),
            skipped: report.skipped(),
            operations: report
                .ops
                .iter()
                .map(|op| SyncOpJson {
                    action: op.action.to_string(),
                    entity: op.entity.to_string(),
                    status: match &op.status {
                        OpStatus::Applied => "applied".to_string(),
                        OpStatus::Failed(e) => format!("failed: {e}"),
                        OpStatus::Skipped { dependency } => {
                            format!("skipped: dependency {dependency} failed")
                        }
                    },
                })
                .collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: "error".to_string(),
            release_id: None,
            applied: 0,
            failed: 0,
            skipped: 0,
            operations: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

/// Map a core error to the HTTP status it should surface as.
#[must_use]
pub fn status_for(error: &RespecError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match error {
        RespecError::QueryNotFound(_) => StatusCode::NOT_FOUND,
        RespecError::UnknownParameter(_)
        | RespecError::MissingRequiredParameter(_)
        | RespecError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
        RespecError::ReconcileInProgress => StatusCode::CONFLICT,
        RespecError::SpecParse { .. } | RespecError::SourceUnavailable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RespecError::UnboundPlaceholder { .. }
        | RespecError::Storage(_)
        | RespecError::Serialization(_)
        | RespecError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
