//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        DocumentsRequest, DocumentsResponse, HealthResponse, QueryDetailResponse,
        QueryListResponse, QueryRequest, QueryResponse, StatusResponse, SyncRequest, SyncResponse,
        status_for,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use respec_core::{
    ReconcileMode, RespecError, SchemaAdmin, StoredQueryExecutor, SyncOptions, sync_once,
};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Tracked release and live schema counts.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stamp = {
        let tracker = state.tracker.lock().await;
        tracker.stamp()
    };
    let stamp = match stamp {
        Ok(stamp) => stamp,
        Err(e) => {
            return (
                status_for(&e),
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };
    let db = state.db.read().await;
    let live = match db.introspect() {
        Ok(live) => live,
        Err(e) => {
            return (
                status_for(&e),
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };

    let response = StatusResponse {
        release_id: stamp.as_ref().map(|s| s.release_id.clone()),
        applied_at_ms: stamp.as_ref().map(|s| s.applied_at_ms),
        stored_queries: state.registry.len(),
        collections: live.collections.len(),
        views: live.views.len(),
        analyzers: live.analyzers.len(),
    };
    (
        StatusCode::OK,
        Json(serde_json::to_value(&response).unwrap_or_default()),
    )
}

// =============================================================================
// STORED QUERY LISTING
// =============================================================================

/// List the names of all registered stored queries.
pub async fn queries_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(QueryListResponse {
        queries: state.registry.names(),
    })
}

/// Describe one stored query's declared parameters and placeholders.
pub async fn query_detail_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QueryDetailResponse>, (StatusCode, String)> {
    match state.registry.lookup(&name) {
        Ok(spec) => Ok(Json(QueryDetailResponse::from_spec(&spec))),
        Err(e) => Err((status_for(&e), e.to_string())),
    }
}

// =============================================================================
// QUERY EXECUTION HANDLER
// =============================================================================

/// Execute a stored query with client parameters.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let db = state.db.read().await;
    let executor = StoredQueryExecutor::new(&state.registry, &*db);
    match executor.execute(&request.stored_query, &request.params) {
        Ok(page) => (StatusCode::OK, Json(QueryResponse::success(page))),
        Err(e) => (status_for(&e), Json(QueryResponse::error(e.to_string()))),
    }
}

// =============================================================================
// DOCUMENT INSERTION HANDLER
// =============================================================================

/// Insert documents into a reconciled collection.
pub async fn documents_handler(
    State(state): State<AppState>,
    Json(request): Json<DocumentsRequest>,
) -> impl IntoResponse {
    let mut db = state.db.write().await;
    match db.insert_docs(&request.collection, request.documents) {
        Ok(inserted) => (StatusCode::OK, Json(DocumentsResponse::success(inserted))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(DocumentsResponse::error(e.to_string())),
        ),
    }
}

// =============================================================================
// SYNC HANDLER
// =============================================================================

/// Trigger one reconciliation pass.
///
/// Passes are serialized per process: a second request while one is running
/// gets 409 instead of queuing behind the first.
pub async fn sync_handler(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let Ok(_gate) = state.sync_gate.try_lock() else {
        let err = RespecError::ReconcileInProgress;
        return (status_for(&err), Json(SyncResponse::error(err.to_string())));
    };

    let options = SyncOptions {
        force: request.force,
        mode: if request.prune {
            ReconcileMode::Prune
        } else {
            ReconcileMode::Additive
        },
        dry_run: request.dry_run,
    };

    let mut db = state.db.write().await;
    let mut tracker = state.tracker.lock().await;
    match sync_once(
        &*state.source,
        &mut *db,
        &mut tracker,
        &state.registry,
        &options,
    ) {
        Ok(outcome) => (StatusCode::OK, Json(SyncResponse::from_outcome(&outcome))),
        Err(e) => (status_for(&e), Json(SyncResponse::error(e.to_string()))),
    }
}
