//! # Query Execution Integration Tests
//!
//! Full pipeline tests: load a release from disk, reconcile an in-memory
//! database, insert documents, and execute the release's stored queries
//! through the executor.

#![allow(clippy::unwrap_used, clippy::panic)]

use respec_core::{
    LocalDirSource, MemoryDatabase, ReleaseTracker, RespecError, StoredQueryExecutor,
    StoredQueryRegistry, SyncOptions, sync_once,
};
use serde_json::{Map, Value, json};
use std::path::Path;

// =============================================================================
// FIXTURES
// =============================================================================

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn write_release(root: &Path) {
    write(root, ".release_id", "2024.05");
    write(
        root,
        "collections/ncbi_taxon.json",
        r#"{
            "name": "ncbi_taxon",
            "type": "document",
            "schema": {"scientific_name": {"type": "string", "required": true}}
        }"#,
    );
    write(
        root,
        "stored_queries/fulltext_search.json",
        r#"{
            "name": "fulltext_search",
            "query": "FOR d IN @@coll SEARCH TOKENS(@search_text) IN d.@search_attrkey FILTER d.created == null || d.created <= @ts FILTER MATCHES_EXPR(d, @filter_attr_expr) LIMIT @offset, @limit RETURN d",
            "params": {
                "@coll": {"type": "string", "required": true},
                "search_attrkey": {"type": "string", "required": true},
                "search_text": {"type": "string", "required": true},
                "ts": {"type": "timestamp"},
                "filter_attr_expr": {"type": "filter"}
            }
        }"#,
    );
}

fn pipeline() -> (StoredQueryRegistry, MemoryDatabase) {
    let dir = tempfile::tempdir().unwrap();
    write_release(dir.path());

    let source = LocalDirSource::new(dir.path());
    let mut db = MemoryDatabase::new();
    let mut tracker = ReleaseTracker::in_memory();
    let registry = StoredQueryRegistry::new();
    sync_once(
        &source,
        &mut db,
        &mut tracker,
        &registry,
        &SyncOptions::default(),
    )
    .unwrap();

    db.insert_docs(
        "ncbi_taxon",
        vec![
            json!({"scientific_name": "Escherichia coli", "rank": "species"}),
            json!({"scientific_name": "Escherichia coli K-12", "rank": "strain", "strain": true}),
            json!({"scientific_name": "Escherichia virus T4", "rank": "species"}),
            json!({"scientific_name": "Homo sapiens", "rank": "species"}),
        ],
    )
    .unwrap();

    (registry, db)
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn fulltext_search_end_to_end() {
    let (registry, db) = pipeline();
    let executor = StoredQueryExecutor::new(&registry, &db);

    let page = executor
        .execute(
            "fulltext_search",
            &params(json!({
                "@coll": "ncbi_taxon",
                "search_attrkey": "scientific_name",
                "search_text": "Escherichia coli",
                "ts": null,
                "filter_attr_expr": null,
            })),
        )
        .unwrap();

    // Both "Escherichia coli" documents match; the virus lacks "coli".
    assert_eq!(page.count, 2);
    assert!(!page.has_more);
    assert!(page.results.iter().all(|d| {
        d["scientific_name"]
            .as_str()
            .unwrap()
            .contains("Escherichia coli")
    }));
}

#[test]
fn filter_blocks_or_together() {
    let (registry, db) = pipeline();
    let executor = StoredQueryExecutor::new(&registry, &db);

    let page = executor
        .execute(
            "fulltext_search",
            &params(json!({
                "@coll": "ncbi_taxon",
                "search_attrkey": "scientific_name",
                "search_text": "Escherichia",
                "filter_attr_expr": [{"rank": "species"}, {"rank": "strain", "strain": true}],
            })),
        )
        .unwrap();

    // E. coli (species), K-12 (strain+true), virus T4 (species).
    assert_eq!(page.count, 3);
}

#[test]
fn pagination_fills_pages_and_signals_more() {
    let (registry, db) = pipeline();
    let executor = StoredQueryExecutor::new(&registry, &db);

    let base = json!({
        "@coll": "ncbi_taxon",
        "search_attrkey": "scientific_name",
        "search_text": "Escherichia",
    });

    let mut first = params(base.clone());
    first.insert("limit".to_string(), json!(2));
    let page = executor.execute("fulltext_search", &first).unwrap();
    assert_eq!(page.count, 2);
    assert!(page.has_more);

    let mut last = params(base.clone());
    last.insert("limit".to_string(), json!(2));
    last.insert("offset".to_string(), json!(2));
    let page = executor.execute("fulltext_search", &last).unwrap();
    assert_eq!(page.count, 1);
    assert!(!page.has_more);

    // Exact multiple: the final page reports more even though none exists.
    let mut exact = params(base);
    exact.insert("limit".to_string(), json!(3));
    let page = executor.execute("fulltext_search", &exact).unwrap();
    assert_eq!(page.count, 3);
    assert!(page.has_more);
}

#[test]
fn validation_errors_surface_before_execution() {
    let (registry, db) = pipeline();
    let executor = StoredQueryExecutor::new(&registry, &db);

    let err = executor
        .execute(
            "fulltext_search",
            &params(json!({
                "@coll": "ncbi_taxon",
                "search_attrkey": "scientific_name",
                // missing required search_text
            })),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RespecError::MissingRequiredParameter(ref p) if p == "search_text"
    ));

    let err = executor
        .execute(
            "fulltext_search",
            &params(json!({
                "@coll": "ncbi_taxon",
                "search_attrkey": "scientific_name",
                "search_text": "coli",
                "ts": "yesterday",
            })),
        )
        .unwrap_err();
    assert!(matches!(err, RespecError::TypeMismatch { ref param, .. } if param == "ts"));
}

#[test]
fn select_control_projects_fields() {
    let (registry, db) = pipeline();
    let executor = StoredQueryExecutor::new(&registry, &db);

    let mut p = params(json!({
        "@coll": "ncbi_taxon",
        "search_attrkey": "scientific_name",
        "search_text": "Homo sapiens",
    }));
    p.insert("select".to_string(), json!("scientific_name"));
    let page = executor.execute("fulltext_search", &p).unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0], json!({"scientific_name": "Homo sapiens"}));
}
