//! # In-Memory Database Backend
//!
//! An embedded implementation of both database seams, used by tests, the
//! CLI, and the demo server.
//!
//! The query side is not a query-language interpreter: it executes the
//! bound-parameter protocol of the bundled stored queries directly
//! (attribute search, compiled filters, scalar equality, offset/limit).
//! The template text is carried but never parsed.
//!
//! For reconciler failure tests, individual entities can be armed to fail
//! on mutation via [`MemoryDatabase::fail_on`].

use crate::backend::{BoundQuery, DatabaseIntrospection, QueryBackend, SchemaAdmin};
use crate::filter::CompiledFilter;
use crate::types::{AnalyzerSpec, CollectionKind, CollectionSpec, IndexSpec, RespecError, ViewSpec};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Bind variables interpreted by the protocol itself, not as equality
/// conditions on document attributes.
const PROTOCOL_BINDS: [&str; 6] = [
    "@coll",
    "search_attrkey",
    "search_text",
    "ts",
    "offset",
    "limit",
];

// =============================================================================
// MEMORY DATABASE
// =============================================================================

/// In-memory schema + document store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    collections: BTreeMap<String, CollectionSpec>,
    docs: BTreeMap<String, Vec<Value>>,
    indexes: BTreeMap<String, Vec<IndexSpec>>,
    views: BTreeMap<String, ViewSpec>,
    analyzers: BTreeMap<String, AnalyzerSpec>,
    fail_entities: BTreeSet<String>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm an entity name to fail on any schema mutation touching it.
    pub fn fail_on(&mut self, entity: impl Into<String>) {
        self.fail_entities.insert(entity.into());
    }

    /// Insert documents into a collection, enforcing required fields.
    pub fn insert_docs(&mut self, collection: &str, docs: Vec<Value>) -> Result<usize, RespecError> {
        let spec = self.collections.get(collection).ok_or_else(|| {
            RespecError::Storage(format!("collection '{collection}' does not exist"))
        })?;

        for doc in &docs {
            if !doc.is_object() {
                return Err(RespecError::Storage(format!(
                    "collection '{collection}' accepts JSON objects only"
                )));
            }
            for (field, schema) in &spec.schema {
                if schema.required && doc.get(field).is_none_or(Value::is_null) {
                    return Err(RespecError::Storage(format!(
                        "document missing required field '{field}' of collection '{collection}'"
                    )));
                }
            }
            if spec.kind == CollectionKind::Edge {
                for endpoint in ["_from", "_to"] {
                    if doc.get(endpoint).is_none_or(Value::is_null) {
                        return Err(RespecError::Storage(format!(
                            "edge document missing '{endpoint}' in collection '{collection}'"
                        )));
                    }
                }
            }
        }

        let count = docs.len();
        self.docs.entry(collection.to_string()).or_default().extend(docs);
        Ok(count)
    }

    /// Number of documents stored in a collection.
    #[must_use]
    pub fn doc_count(&self, collection: &str) -> usize {
        self.docs.get(collection).map_or(0, Vec::len)
    }

    fn check_injected(&self, entity: &str) -> Result<(), RespecError> {
        if self.fail_entities.contains(entity) {
            return Err(RespecError::Storage(format!(
                "injected failure for entity '{entity}'"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SCHEMA ADMINISTRATION
// =============================================================================

impl SchemaAdmin for MemoryDatabase {
    fn introspect(&self) -> Result<DatabaseIntrospection, RespecError> {
        // Collections are reported without their index declarations; indexes
        // live in the dedicated map so the diff stays per-category.
        let collections = self
            .collections
            .iter()
            .map(|(name, spec)| {
                let mut stripped = spec.clone();
                stripped.indexes = Vec::new();
                (name.clone(), stripped)
            })
            .collect();
        Ok(DatabaseIntrospection {
            collections,
            indexes: self.indexes.clone(),
            views: self.views.clone(),
            analyzers: self.analyzers.clone(),
        })
    }

    fn create_collection(&mut self, spec: &CollectionSpec) -> Result<(), RespecError> {
        self.check_injected(&spec.name)?;
        if self.collections.contains_key(&spec.name) {
            return Err(RespecError::Storage(format!(
                "collection '{}' already exists",
                spec.name
            )));
        }
        let mut stored = spec.clone();
        stored.indexes = Vec::new();
        self.collections.insert(spec.name.clone(), stored);
        self.docs.entry(spec.name.clone()).or_default();
        self.indexes.entry(spec.name.clone()).or_default();
        Ok(())
    }

    fn update_collection_schema(&mut self, spec: &CollectionSpec) -> Result<(), RespecError> {
        self.check_injected(&spec.name)?;
        let existing = self.collections.get_mut(&spec.name).ok_or_else(|| {
            RespecError::Storage(format!("collection '{}' does not exist", spec.name))
        })?;
        if existing.kind != spec.kind {
            return Err(RespecError::Storage(format!(
                "collection '{}' kind cannot be altered; manual migration required",
                spec.name
            )));
        }
        existing.schema = spec.schema.clone();
        existing.from = spec.from.clone();
        existing.to = spec.to.clone();
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<(), RespecError> {
        self.check_injected(name)?;
        if self.collections.remove(name).is_none() {
            return Err(RespecError::Storage(format!(
                "collection '{name}' does not exist"
            )));
        }
        self.docs.remove(name);
        self.indexes.remove(name);
        Ok(())
    }

    fn create_index(&mut self, collection: &str, index: &IndexSpec) -> Result<(), RespecError> {
        self.check_injected(collection)?;
        if !self.collections.contains_key(collection) {
            return Err(RespecError::Storage(format!(
                "collection '{collection}' does not exist"
            )));
        }
        let entry = self.indexes.entry(collection.to_string()).or_default();
        if entry.contains(index) {
            return Err(RespecError::Storage(format!(
                "index {:?} already exists on '{collection}'",
                index.fields
            )));
        }
        entry.push(index.clone());
        Ok(())
    }

    fn drop_index(&mut self, collection: &str, index: &IndexSpec) -> Result<(), RespecError> {
        self.check_injected(collection)?;
        let entry = self.indexes.get_mut(collection).ok_or_else(|| {
            RespecError::Storage(format!("collection '{collection}' does not exist"))
        })?;
        let before = entry.len();
        entry.retain(|i| i != index);
        if entry.len() == before {
            return Err(RespecError::Storage(format!(
                "index {:?} does not exist on '{collection}'",
                index.fields
            )));
        }
        Ok(())
    }

    fn create_analyzer(&mut self, spec: &AnalyzerSpec) -> Result<(), RespecError> {
        self.check_injected(&spec.name)?;
        if self.analyzers.contains_key(&spec.name) {
            return Err(RespecError::Storage(format!(
                "analyzer '{}' already exists",
                spec.name
            )));
        }
        self.analyzers.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn drop_analyzer(&mut self, name: &str) -> Result<(), RespecError> {
        self.check_injected(name)?;
        let referenced_by: Vec<&str> = self
            .views
            .values()
            .filter(|v| v.links.iter().any(|l| l.analyzers.iter().any(|a| a == name)))
            .map(|v| v.name.as_str())
            .collect();
        if !referenced_by.is_empty() {
            return Err(RespecError::Storage(format!(
                "analyzer '{name}' still referenced by views: {}",
                referenced_by.join(", ")
            )));
        }
        if self.analyzers.remove(name).is_none() {
            return Err(RespecError::Storage(format!(
                "analyzer '{name}' does not exist"
            )));
        }
        Ok(())
    }

    fn create_or_replace_view(&mut self, spec: &ViewSpec) -> Result<(), RespecError> {
        self.check_injected(&spec.name)?;
        for link in &spec.links {
            if !self.collections.contains_key(&link.collection) {
                return Err(RespecError::Storage(format!(
                    "view '{}' links missing collection '{}'",
                    spec.name, link.collection
                )));
            }
            for analyzer in &link.analyzers {
                if !self.analyzers.contains_key(analyzer) {
                    return Err(RespecError::Storage(format!(
                        "view '{}' links missing analyzer '{analyzer}'",
                        spec.name
                    )));
                }
            }
        }
        self.views.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn drop_view(&mut self, name: &str) -> Result<(), RespecError> {
        self.check_injected(name)?;
        if self.views.remove(name).is_none() {
            return Err(RespecError::Storage(format!("view '{name}' does not exist")));
        }
        Ok(())
    }
}

// =============================================================================
// QUERY EXECUTION
// =============================================================================

impl QueryBackend for MemoryDatabase {
    fn run(&self, query: &BoundQuery) -> Result<Vec<Value>, RespecError> {
        let collection = match query.bind_vars.get("@coll") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(RespecError::Storage(format!(
                    "@coll bind must be a collection name, got {other}"
                )));
            }
            // Single-collection databases may omit @coll in simple queries.
            None => match self.collections.keys().next() {
                Some(name) if self.collections.len() == 1 => name.clone(),
                _ => {
                    return Err(RespecError::Storage(
                        "query does not bind @coll and collection is ambiguous".to_string(),
                    ));
                }
            },
        };

        let docs = self.docs.get(&collection).ok_or_else(|| {
            RespecError::Storage(format!("collection '{collection}' does not exist"))
        })?;

        let search = match (
            query.bind_vars.get("search_attrkey"),
            query.bind_vars.get("search_text"),
        ) {
            (Some(Value::String(attr)), Some(Value::String(text))) => {
                Some((attr.clone(), tokenize(text)))
            }
            _ => None,
        };

        // Compiled filters and scalar equality conditions from the remaining
        // bind variables.
        let mut filters: Vec<CompiledFilter> = Vec::new();
        let mut equals: Vec<(&String, &Value)> = Vec::new();
        for (name, value) in &query.bind_vars {
            if PROTOCOL_BINDS.contains(&name.as_str()) {
                continue;
            }
            match value {
                Value::Null => {}
                Value::Array(_) => {
                    if let Some(filter) = CompiledFilter::from_bind_value(value) {
                        if !filter.is_unfiltered() {
                            filters.push(filter);
                        }
                    }
                }
                scalar => equals.push((name, scalar)),
            }
        }

        let mut hits: Vec<Value> = docs
            .iter()
            .filter(|doc| {
                if let Some((attr, tokens)) = &search {
                    let Some(Value::String(hay)) = doc.get(attr) else {
                        return false;
                    };
                    let hay_tokens = tokenize(hay);
                    if !tokens.iter().all(|t| hay_tokens.contains(t)) {
                        return false;
                    }
                }
                if !filters.iter().all(|f| f.matches(doc)) {
                    return false;
                }
                equals
                    .iter()
                    .all(|(attr, expected)| doc.get(*attr) == Some(*expected))
            })
            .cloned()
            .collect();

        let offset = bind_u64(&query.bind_vars, "offset").unwrap_or(0) as usize;
        let limit = bind_u64(&query.bind_vars, "limit").map(|l| l as usize);

        if offset > 0 {
            hits = hits.split_off(offset.min(hits.len()));
        }
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

fn bind_u64(bind_vars: &BTreeMap<String, Value>, name: &str) -> Option<u64> {
    bind_vars.get(name).and_then(Value::as_u64)
}

/// Lowercased alphanumeric tokens of a string.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_collection(name: &str) -> CollectionSpec {
        serde_json::from_value(json!({
            "name": name,
            "type": "document",
            "schema": {"scientific_name": {"type": "string", "required": true}},
        }))
        .expect("collection")
    }

    fn populated() -> MemoryDatabase {
        let mut db = MemoryDatabase::new();
        db.create_collection(&doc_collection("ncbi_taxon")).expect("create");
        db.insert_docs(
            "ncbi_taxon",
            vec![
                json!({"scientific_name": "Escherichia coli", "rank": "species"}),
                json!({"scientific_name": "Escherichia coli K-12", "rank": "strain", "strain": true}),
                json!({"scientific_name": "Homo sapiens", "rank": "species"}),
            ],
        )
        .expect("insert");
        db
    }

    fn bound(bind_vars: Value) -> BoundQuery {
        BoundQuery {
            template: "FOR d IN @@coll RETURN d".to_string(),
            bind_vars: serde_json::from_value(bind_vars).expect("binds"),
        }
    }

    #[test]
    fn required_field_enforced_on_insert() {
        let mut db = MemoryDatabase::new();
        db.create_collection(&doc_collection("taxon")).expect("create");
        let err = db
            .insert_docs("taxon", vec![json!({"rank": "species"})])
            .expect_err("must fail");
        assert!(err.to_string().contains("scientific_name"));
    }

    #[test]
    fn search_matches_token_superset() {
        let db = populated();
        let hits = db
            .run(&bound(json!({
                "@coll": "ncbi_taxon",
                "search_attrkey": "scientific_name",
                "search_text": "Escherichia coli",
            })))
            .expect("run");
        // Both E. coli docs contain all the search tokens.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn compiled_filter_applied_from_bind_vars() {
        let db = populated();
        let filter = crate::filter::FilterExpressionBuilder::parse(
            "f",
            &json!([{"rank": "species"}, {"rank": "strain", "strain": true}]),
        )
        .expect("parse");
        let hits = db
            .run(&bound(json!({
                "@coll": "ncbi_taxon",
                "filter_attr_expr": filter.to_bind_value(),
            })))
            .expect("run");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn offset_and_limit_applied() {
        let db = populated();
        let hits = db
            .run(&bound(json!({"@coll": "ncbi_taxon", "offset": 1, "limit": 1})))
            .expect("run");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn analyzer_drop_blocked_by_view() {
        let mut db = MemoryDatabase::new();
        db.create_collection(&doc_collection("taxon")).expect("create");
        db.create_analyzer(&serde_json::from_value(json!({"name": "tok", "type": "text"})).expect("a"))
            .expect("create analyzer");
        db.create_or_replace_view(
            &serde_json::from_value(json!({
                "name": "v", "type": "search",
                "links": [{"collection": "taxon", "analyzers": ["tok"], "fields": ["scientific_name"]}],
            }))
            .expect("v"),
        )
        .expect("create view");

        assert!(db.drop_analyzer("tok").is_err());
        db.drop_view("v").expect("drop view");
        db.drop_analyzer("tok").expect("drop analyzer");
    }

    #[test]
    fn injected_failure_surfaces() {
        let mut db = MemoryDatabase::new();
        db.fail_on("taxon");
        let err = db.create_collection(&doc_collection("taxon")).expect_err("must fail");
        assert!(err.to_string().contains("injected"));
    }
}
