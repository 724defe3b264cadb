//! # Stored Query Execution Module
//!
//! Runs a named stored query against a [`QueryBackend`]:
//! 1. Look the query up in the registry
//! 2. Peel off reserved result controls (`offset`, `limit`, `select`)
//! 3. Validate and coerce the remaining parameters against the declared schema
//! 4. Compile filter-typed parameters into their bind form
//! 5. Bind pagination, cross-check template placeholders, run the backend
//! 6. Apply the `select` projection and report pagination state
//!
//! Reserved controls are only special when the query does not declare them:
//! a declared `offset`/`limit`/`select` goes through schema validation like
//! any other parameter and then feeds the same controls.

use crate::backend::{BoundQuery, QueryBackend};
use crate::filter::FilterExpressionBuilder;
use crate::params::ParameterValidator;
use crate::primitives::{DEFAULT_RESULT_LIMIT, DEFAULT_RESULT_OFFSET, MAX_RESULT_LIMIT};
use crate::registry::StoredQueryRegistry;
use crate::types::{ParamType, RespecError};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Parameter names the executor interprets itself when a query leaves them
/// undeclared.
const RESERVED_CONTROLS: [&str; 3] = ["offset", "limit", "select"];

// =============================================================================
// RESULTS
// =============================================================================

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult {
    /// Matching documents, post-projection.
    pub results: Vec<Value>,
    /// Number of documents in this page.
    pub count: u64,
    /// Whether another page may exist.
    ///
    /// Heuristic: a page filled exactly to the limit signals more; the next
    /// fetch may come back empty when the total is an exact multiple.
    pub has_more: bool,
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Binds, paginates, and executes stored queries.
pub struct StoredQueryExecutor<'a> {
    registry: &'a StoredQueryRegistry,
    backend: &'a dyn QueryBackend,
}

impl<'a> StoredQueryExecutor<'a> {
    /// Create an executor over a registry snapshot source and a backend.
    #[must_use]
    pub fn new(registry: &'a StoredQueryRegistry, backend: &'a dyn QueryBackend) -> Self {
        Self { registry, backend }
    }

    /// Execute the named stored query with the supplied client parameters.
    pub fn execute(
        &self,
        name: &str,
        supplied: &Map<String, Value>,
    ) -> Result<PagedResult, RespecError> {
        let spec = self.registry.lookup(name)?;

        // Reserved controls bypass the declared-parameter check only when
        // the query does not declare them itself.
        let mut reserved: BTreeMap<&str, Value> = BTreeMap::new();
        let mut declared_input = Map::new();
        for (key, value) in supplied {
            let control = RESERVED_CONTROLS.iter().find(|c| **c == key.as_str());
            if let Some(control) = control
                && !spec.params.contains_key(key)
            {
                reserved.insert(control, value.clone());
            } else {
                declared_input.insert(key.clone(), value.clone());
            }
        }

        let mut bound = ParameterValidator::validate(&spec, &declared_input)?;

        // Filter-typed parameters compile to their bind structure.
        for (param, schema) in &spec.params {
            if schema.param_type != ParamType::Filter {
                continue;
            }
            let compiled = match bound.get(param) {
                Some(value) => FilterExpressionBuilder::compile(param, value)?,
                None => continue,
            };
            bound.insert(param.clone(), compiled);
        }

        let offset = control_u64(
            "offset",
            reserved.get("offset").or_else(|| bound.get("offset")),
            DEFAULT_RESULT_OFFSET,
        )?;
        let limit = control_u64(
            "limit",
            reserved.get("limit").or_else(|| bound.get("limit")),
            DEFAULT_RESULT_LIMIT,
        )?
        .min(MAX_RESULT_LIMIT);
        let select = parse_select(reserved.get("select").or_else(|| bound.get("select")))?;

        // Pagination is always bound, clamped, whether declared or reserved.
        bound.insert("offset".to_string(), Value::Number(Number::from(offset)));
        bound.insert("limit".to_string(), Value::Number(Number::from(limit)));

        // A placeholder without a bound value is a defect in the stored
        // query definition; refuse to execute rather than guess.
        for placeholder in spec.placeholders() {
            if !bound.contains_key(&placeholder) {
                return Err(RespecError::UnboundPlaceholder {
                    query: spec.name.clone(),
                    placeholder,
                });
            }
        }

        let query = BoundQuery {
            template: spec.query.clone(),
            bind_vars: bound,
        };
        let mut results = self.backend.run(&query)?;

        if let Some(fields) = &select {
            for doc in &mut results {
                project(doc, fields);
            }
        }

        let count = results.len() as u64;
        Ok(PagedResult {
            results,
            count,
            has_more: count == limit,
        })
    }
}

/// Resolve a numeric result control to a non-negative integer.
fn control_u64(name: &'static str, value: Option<&Value>, default: u64) -> Result<u64, RespecError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| RespecError::TypeMismatch {
            param: name.to_string(),
            expected: "number",
            got: format!("non-negative integer required, got {n}"),
        }),
        Some(other) => Err(RespecError::TypeMismatch {
            param: name.to_string(),
            expected: "number",
            got: type_name(other).to_string(),
        }),
    }
}

/// Resolve the `select` control: a field name or a list of field names.
fn parse_select(value: Option<&Value>) -> Result<Option<Vec<String>>, RespecError> {
    let mismatch = |got: String| RespecError::TypeMismatch {
        param: "select".to_string(),
        expected: "string",
        got,
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(field)) => Ok(Some(vec![field.clone()])),
        Some(Value::Array(fields)) => {
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                match field {
                    Value::String(s) => out.push(s.clone()),
                    other => return Err(mismatch(format!("list with {}", type_name(other)))),
                }
            }
            Ok(Some(out))
        }
        Some(other) => Err(mismatch(type_name(other).to_string())),
    }
}

/// Strip a result document down to the selected fields.
/// Non-object results pass through unchanged.
fn project(doc: &mut Value, fields: &[String]) {
    if let Value::Object(map) = doc {
        map.retain(|key, _| fields.iter().any(|f| f == key));
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SchemaAdmin;
    use crate::storage::MemoryDatabase;
    use crate::types::{SpecModel, StoredQuerySpec};
    use serde_json::json;

    fn search_query() -> StoredQuerySpec {
        StoredQuerySpec {
            name: "attribute_search".to_string(),
            query: "FOR d IN @@coll SEARCH TOKENS(@search_text) IN d.@search_attrkey \
                    FILTER d.ts == null || d.ts <= @ts \
                    FILTER MATCHES_EXPR(d, @filter_attr_expr) \
                    LIMIT @offset, @limit RETURN d"
                .to_string(),
            params: serde_json::from_value(json!({
                "@coll": {"type": "string", "required": true},
                "search_attrkey": {"type": "string", "required": true},
                "search_text": {"type": "string", "required": true},
                "ts": {"type": "timestamp"},
                "filter_attr_expr": {"type": "filter"},
            }))
            .expect("params"),
        }
    }

    fn fixture() -> (StoredQueryRegistry, MemoryDatabase) {
        let mut model = SpecModel::default();
        model
            .stored_queries
            .insert("attribute_search".to_string(), search_query());
        let registry = StoredQueryRegistry::from_model(&model);

        let mut db = MemoryDatabase::new();
        db.create_collection(
            &serde_json::from_value(json!({
                "name": "ncbi_taxon",
                "type": "document",
                "schema": {"scientific_name": {"type": "string", "required": true}},
            }))
            .expect("collection"),
        )
        .expect("create");
        db.insert_docs(
            "ncbi_taxon",
            vec![
                json!({"scientific_name": "Escherichia coli", "rank": "species", "id": "562"}),
                json!({"scientific_name": "Escherichia coli K-12", "rank": "strain", "strain": true, "id": "83333"}),
                json!({"scientific_name": "Escherichia coli O157:H7", "rank": "strain", "strain": false, "id": "83334"}),
            ],
        )
        .expect("insert");
        (registry, db)
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn search_with_null_optionals_uses_defaults() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let page = executor
            .execute(
                "attribute_search",
                &params(json!({
                    "@coll": "ncbi_taxon",
                    "search_attrkey": "scientific_name",
                    "search_text": "Escherichia coli",
                    "ts": null,
                    "filter_attr_expr": null,
                })),
            )
            .expect("execute");
        assert_eq!(page.count, 3);
        assert!(!page.has_more);
    }

    #[test]
    fn filter_narrows_results() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let page = executor
            .execute(
                "attribute_search",
                &params(json!({
                    "@coll": "ncbi_taxon",
                    "search_attrkey": "scientific_name",
                    "search_text": "Escherichia coli",
                    "filter_attr_expr": [{"rank": "species"}, {"rank": "strain", "strain": true}],
                })),
            )
            .expect("execute");
        assert_eq!(page.count, 2);
        let ranks: Vec<&str> = page
            .results
            .iter()
            .filter_map(|d| d.get("rank").and_then(Value::as_str))
            .collect();
        assert!(ranks.contains(&"species"));
        assert!(ranks.contains(&"strain"));
    }

    #[test]
    fn reserved_pagination_pages_through() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let base = json!({
            "@coll": "ncbi_taxon",
            "search_attrkey": "scientific_name",
            "search_text": "Escherichia coli",
        });

        let mut first = params(base.clone());
        first.insert("limit".to_string(), json!(2));
        let page = executor.execute("attribute_search", &first).expect("execute");
        assert_eq!(page.count, 2);
        // Page filled to the limit: more may exist.
        assert!(page.has_more);

        let mut second = params(base);
        second.insert("limit".to_string(), json!(2));
        second.insert("offset".to_string(), json!(2));
        let page = executor.execute("attribute_search", &second).expect("execute");
        assert_eq!(page.count, 1);
        assert!(!page.has_more);
    }

    #[test]
    fn limit_clamped_to_maximum() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let mut p = params(json!({
            "@coll": "ncbi_taxon",
            "search_attrkey": "scientific_name",
            "search_text": "Escherichia",
        }));
        p.insert("limit".to_string(), json!(1_000_000));
        // Clamped silently; the page just reports what came back.
        let page = executor.execute("attribute_search", &p).expect("execute");
        assert_eq!(page.count, 3);
        assert!(!page.has_more);
    }

    #[test]
    fn select_projects_result_fields() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let mut p = params(json!({
            "@coll": "ncbi_taxon",
            "search_attrkey": "scientific_name",
            "search_text": "Escherichia coli K-12",
        }));
        p.insert("select".to_string(), json!(["id", "scientific_name"]));
        let page = executor.execute("attribute_search", &p).expect("execute");
        assert_eq!(page.count, 1);
        assert_eq!(
            page.results[0],
            json!({"id": "83333", "scientific_name": "Escherichia coli K-12"})
        );
    }

    #[test]
    fn negative_offset_rejected() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let mut p = params(json!({
            "@coll": "ncbi_taxon",
            "search_attrkey": "scientific_name",
            "search_text": "coli",
        }));
        p.insert("offset".to_string(), json!(-5));
        let err = executor.execute("attribute_search", &p).expect_err("must fail");
        assert!(matches!(err, RespecError::TypeMismatch { ref param, .. } if param == "offset"));
    }

    #[test]
    fn unknown_query_not_found() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let err = executor
            .execute("nope", &Map::new())
            .expect_err("must fail");
        assert!(matches!(err, RespecError::QueryNotFound(_)));
    }

    #[test]
    fn unknown_parameter_rejected_before_backend() {
        let (registry, db) = fixture();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let err = executor
            .execute(
                "attribute_search",
                &params(json!({
                    "@coll": "ncbi_taxon",
                    "search_attrkey": "scientific_name",
                    "search_text": "coli",
                    "evil": "1 == 1",
                })),
            )
            .expect_err("must fail");
        assert!(matches!(err, RespecError::UnknownParameter(ref k) if k == "evil"));
    }

    #[test]
    fn unbound_placeholder_refused() {
        let mut model = SpecModel::default();
        model.stored_queries.insert(
            "broken".to_string(),
            StoredQuerySpec {
                name: "broken".to_string(),
                query: "FOR d IN c FILTER d.x == @undeclared RETURN d".to_string(),
                params: BTreeMap::new(),
            },
        );
        let registry = StoredQueryRegistry::from_model(&model);
        let db = MemoryDatabase::new();
        let executor = StoredQueryExecutor::new(&registry, &db);
        let err = executor.execute("broken", &Map::new()).expect_err("must fail");
        assert!(matches!(
            err,
            RespecError::UnboundPlaceholder { ref placeholder, .. } if placeholder == "undeclared"
        ));
    }
}
