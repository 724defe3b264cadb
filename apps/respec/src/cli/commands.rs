//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! All commands except `server` are one-shot: they build their state from
//! the spec directory and the (optionally persistent) release tracker, act,
//! print, and exit.

use crate::api;
use crate::config::AppConfig;
use respec_core::{
    LocalDirSource, MemoryDatabase, ReconcileMode, ReleaseTracker, RespecError, SpecLoader,
    SpecSource, StoredQueryExecutor, StoredQueryRegistry, SyncOptions, SyncOutcome,
    sync_once,
};
use serde_json::Value;
use std::path::Path;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum seed-data file size (100 MB).
///
/// Prevents memory exhaustion from malicious or accidental large files.
const MAX_DATA_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate a seed-data file before reading it: resolve symlinks and "..",
/// require a regular file, and cap the size.
fn validate_data_file(path: &Path) -> Result<std::path::PathBuf, RespecError> {
    let canonical = path.canonicalize().map_err(|e| {
        RespecError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(RespecError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| RespecError::Io(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > MAX_DATA_FILE_SIZE {
        return Err(RespecError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_DATA_FILE_SIZE
        )));
    }
    Ok(canonical)
}

// =============================================================================
// SHARED SETUP
// =============================================================================

fn open_tracker(config: &AppConfig) -> Result<ReleaseTracker, RespecError> {
    match &config.tracker_path {
        Some(path) => ReleaseTracker::open(path),
        None => Ok(ReleaseTracker::in_memory()),
    }
}

fn source_for(config: &AppConfig) -> LocalDirSource {
    LocalDirSource::new(&config.spec_dir)
}

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig) -> Result<(), RespecError> {
    let tracker = open_tracker(config)?;
    let source = source_for(config);

    println!("respec server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.bind_addr());
    println!("  Spec dir: {}", config.spec_dir.display());
    println!(
        "  Tracker:  {}",
        config
            .tracker_path
            .as_ref()
            .map_or("in-memory".to_string(), |p| p.display().to_string())
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health    - Health check");
    println!("  GET  /status    - Tracked release and schema counts");
    println!("  GET  /queries   - List stored queries");
    println!("  POST /query     - Execute a stored query");
    println!("  POST /documents - Insert documents");
    println!("  POST /sync      - Trigger a reconciliation pass");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.bind_addr(), source, tracker).await
}

// =============================================================================
// SYNC COMMAND
// =============================================================================

/// Run one reconciliation pass against an embedded database.
pub fn cmd_sync(
    config: &AppConfig,
    force: bool,
    prune: bool,
    dry_run: bool,
    json_mode: bool,
) -> Result<(), RespecError> {
    let source = source_for(config);
    let mut tracker = open_tracker(config)?;
    let mut db = MemoryDatabase::new();
    let registry = StoredQueryRegistry::new();

    let options = SyncOptions {
        force,
        mode: if prune {
            ReconcileMode::Prune
        } else {
            ReconcileMode::Additive
        },
        dry_run,
    };

    let outcome = sync_once(&source, &mut db, &mut tracker, &registry, &options)?;
    let response = api::SyncResponse::from_outcome(&outcome);

    if json_mode {
        print_json(&serde_json::to_value(&response).unwrap_or_default());
        return Ok(());
    }

    match &outcome {
        SyncOutcome::UpToDate { release_id } => {
            println!("Release {} already reconciled; nothing to do.", release_id);
        }
        SyncOutcome::Planned { plan, model } => {
            println!("Plan for release {} ({} ops):", model.release_id, plan.len());
            for line in plan.summary() {
                println!("  {}", line);
            }
        }
        SyncOutcome::Applied { report, .. } => {
            println!(
                "Release {}: {} ({} applied, {} failed, {} skipped)",
                report.release_id,
                response.outcome,
                report.applied(),
                report.failed(),
                report.skipped()
            );
            for op in &response.operations {
                println!("  {} {} -> {}", op.action, op.entity, op.status);
            }
        }
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Parse and validate the spec release without touching anything.
pub fn cmd_validate(config: &AppConfig, json_mode: bool) -> Result<(), RespecError> {
    let checkout = source_for(config).fetch()?;
    let model = SpecLoader::load(&checkout)?;

    if json_mode {
        print_json(&serde_json::json!({
            "release_id": model.release_id,
            "collections": model.collections.len(),
            "views": model.views.len(),
            "analyzers": model.analyzers.len(),
            "stored_queries": model.stored_queries.len(),
        }));
        return Ok(());
    }

    println!("Release {} is valid.", model.release_id);
    println!("  Collections:    {}", model.collections.len());
    println!("  Views:          {}", model.views.len());
    println!("  Analyzers:      {}", model.analyzers.len());
    println!("  Stored queries: {}", model.stored_queries.len());
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show tracked release and spec summary.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), RespecError> {
    let tracker = open_tracker(config)?;
    let stamp = tracker.stamp()?;
    let source_release = source_for(config)
        .fetch()
        .map(|c| c.release_id)
        .unwrap_or_else(|_| "<unavailable>".to_string());

    if json_mode {
        print_json(&serde_json::json!({
            "tracked_release": stamp.as_ref().map(|s| s.release_id.clone()),
            "applied_at_ms": stamp.as_ref().map(|s| s.applied_at_ms),
            "source_release": source_release,
            "spec_dir": config.spec_dir.to_string_lossy(),
        }));
        return Ok(());
    }

    println!("respec status");
    println!("=============");
    println!("Spec dir:        {}", config.spec_dir.display());
    println!("Source release:  {}", source_release);
    match stamp {
        Some(stamp) => {
            println!("Tracked release: {}", stamp.release_id);
            println!("Applied at:      {} (epoch ms)", stamp.applied_at_ms);
        }
        None => println!("Tracked release: <none>"),
    }
    Ok(())
}

// =============================================================================
// QUERIES COMMAND
// =============================================================================

/// List stored queries in the current release.
pub fn cmd_queries(config: &AppConfig, json_mode: bool) -> Result<(), RespecError> {
    let checkout = source_for(config).fetch()?;
    let model = SpecLoader::load(&checkout)?;

    if json_mode {
        let queries: Vec<Value> = model
            .stored_queries
            .values()
            .map(|q| serde_json::to_value(api::QueryDetailResponse::from_spec(q)).unwrap_or_default())
            .collect();
        print_json(&Value::Array(queries));
        return Ok(());
    }

    println!("Stored queries in release {}:", model.release_id);
    for query in model.stored_queries.values() {
        let params: Vec<&str> = query.params.keys().map(String::as_str).collect();
        println!("  {} ({})", query.name, params.join(", "));
    }
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Execute a stored query against an embedded database.
///
/// The database is built fresh from the spec release; `--data-file` seeds
/// collections with documents before the query runs.
pub fn cmd_query(
    config: &AppConfig,
    name: &str,
    params: Option<&str>,
    data_file: Option<&Path>,
    json_mode: bool,
) -> Result<(), RespecError> {
    let source = source_for(config);
    let mut db = MemoryDatabase::new();
    let mut tracker = ReleaseTracker::in_memory();
    let registry = StoredQueryRegistry::new();
    sync_once(
        &source,
        &mut db,
        &mut tracker,
        &registry,
        &SyncOptions::default(),
    )?;

    if let Some(path) = data_file {
        let path = validate_data_file(path)?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| RespecError::Io(format!("{}: {}", path.display(), e)))?;
        let seed: Value = serde_json::from_str(&raw)
            .map_err(|e| RespecError::Serialization(format!("seed data: {e}")))?;
        let Value::Object(collections) = seed else {
            return Err(RespecError::Serialization(
                "seed data must be an object mapping collection names to document arrays"
                    .to_string(),
            ));
        };
        for (collection, docs) in collections {
            let Value::Array(docs) = docs else {
                return Err(RespecError::Serialization(format!(
                    "seed data for '{collection}' must be an array"
                )));
            };
            let inserted = db.insert_docs(&collection, docs)?;
            tracing::debug!("seeded {} documents into {}", inserted, collection);
        }
    }

    let client_params = match params {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| RespecError::Serialization(format!("params: {e}")))?,
        None => serde_json::Map::new(),
    };

    let executor = StoredQueryExecutor::new(&registry, &db);
    let page = executor.execute(name, &client_params)?;

    if json_mode {
        print_json(&serde_json::to_value(api::QueryResponse::success(page)).unwrap_or_default());
        return Ok(());
    }

    println!("{} results (has_more: {}):", page.count, page.has_more);
    for doc in &page.results {
        println!("  {}", serde_json::to_string(doc).unwrap_or_default());
    }
    Ok(())
}
