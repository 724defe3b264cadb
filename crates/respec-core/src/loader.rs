//! # Spec Loader Module
//!
//! Parses a checkout directory tree into an immutable [`SpecModel`].
//!
//! - Parsing is total and side-effect-free: the loader never touches the
//!   live database.
//! - Files within one category parse independently; there is no ordering
//!   dependency inside a category.
//! - Cross-category reference resolution runs as a final pass so that every
//!   dangling reference is reported together, instead of short-circuiting on
//!   the first one.

use crate::primitives::{
    MAX_PARAM_NAME_LENGTH, MAX_QUERY_NAME_LENGTH, SPEC_CATEGORIES, SPEC_IGNORED_SUBTREES,
};
use crate::source::SpecCheckout;
use crate::types::{
    AnalyzerSpec, CollectionKind, CollectionSpec, RespecError, SpecModel, StoredQuerySpec,
    ViewSpec,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Reserved placeholder names bound by the executor, not by declared params.
const EXECUTOR_PLACEHOLDERS: [&str; 2] = ["offset", "limit"];

// =============================================================================
// LOADER
// =============================================================================

/// Parses and validates specification checkouts.
pub struct SpecLoader;

impl SpecLoader {
    /// Parse the checkout into a [`SpecModel`], or fail with a
    /// [`RespecError::SpecParse`] naming the offending file and defect.
    pub fn load(checkout: &SpecCheckout) -> Result<SpecModel, RespecError> {
        let root = &checkout.root;
        Self::check_layout(root)?;

        let analyzers: BTreeMap<String, AnalyzerSpec> =
            Self::load_category(root, "analyzers", |a: &AnalyzerSpec| a.name.clone())?;
        let collections: BTreeMap<String, CollectionSpec> =
            Self::load_category(root, "collections", |c: &CollectionSpec| c.name.clone())?;
        let views: BTreeMap<String, ViewSpec> =
            Self::load_category(root, "views", |v: &ViewSpec| v.name.clone())?;
        let stored_queries: BTreeMap<String, StoredQuerySpec> =
            Self::load_category(root, "stored_queries", |q: &StoredQuerySpec| q.name.clone())?;

        let model = SpecModel {
            release_id: checkout.release_id.clone(),
            collections,
            views,
            analyzers,
            stored_queries,
        };

        Self::resolve_references(&model)?;
        Ok(model)
    }

    /// Reject checkouts with no recognized category subtree at all.
    ///
    /// A wrong path (empty directory, bad mount) would otherwise load as a
    /// valid-but-empty model and silently reconcile nothing.
    fn check_layout(root: &Path) -> Result<(), RespecError> {
        let any_known = SPEC_CATEGORIES
            .iter()
            .chain(SPEC_IGNORED_SUBTREES.iter())
            .any(|c| root.join(c).is_dir());
        if !any_known {
            return Err(RespecError::SpecParse {
                file: root.display().to_string(),
                reason: "no spec category subdirectory found".to_string(),
            });
        }
        Ok(())
    }

    /// Parse every `*.json` file in one category directory.
    ///
    /// The file stem must match the declared name; a declared name that
    /// collides with another file in the category is a duplicate.
    fn load_category<T, F>(
        root: &Path,
        category: &str,
        name_of: F,
    ) -> Result<BTreeMap<String, T>, RespecError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> String,
    {
        let dir = root.join(category);
        let mut out = BTreeMap::new();
        if !dir.is_dir() {
            // Absent categories load as empty: a release may ship, say, no views.
            return Ok(out);
        }

        let mut files: Vec<_> = std::fs::read_dir(&dir)
            .map_err(|e| RespecError::Io(format!("{}: {}", dir.display(), e)))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let display = path.display().to_string();
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| RespecError::Io(format!("{display}: {e}")))?;
            let parsed: T = serde_json::from_str(&raw).map_err(|e| RespecError::SpecParse {
                file: display.clone(),
                reason: format!("malformed definition: {e}"),
            })?;

            let name = name_of(&parsed);
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if name != stem {
                return Err(RespecError::SpecParse {
                    file: display,
                    reason: format!("declared name '{name}' does not match file stem '{stem}'"),
                });
            }
            if out.insert(name.clone(), parsed).is_some() {
                return Err(RespecError::SpecParse {
                    file: display,
                    reason: format!("duplicate {category} name '{name}'"),
                });
            }
        }
        Ok(out)
    }

    /// Final pass: resolve every cross-category reference, collecting ALL
    /// defects before failing so a broken release is fixable in one round.
    fn resolve_references(model: &SpecModel) -> Result<(), RespecError> {
        let mut defects: Vec<String> = Vec::new();

        for (name, coll) in &model.collections {
            match coll.kind {
                CollectionKind::Edge => {
                    if coll.from.is_empty() || coll.to.is_empty() {
                        defects.push(format!(
                            "edge collection '{name}' must declare from and to collections"
                        ));
                    }
                    for target in coll.from.iter().chain(coll.to.iter()) {
                        if !model.collections.contains_key(target) {
                            defects.push(format!(
                                "edge collection '{name}' references unknown collection '{target}'"
                            ));
                        }
                    }
                }
                CollectionKind::Document => {
                    if !coll.from.is_empty() || !coll.to.is_empty() {
                        defects.push(format!(
                            "document collection '{name}' must not declare from/to"
                        ));
                    }
                }
            }
        }

        for (name, view) in &model.views {
            if view.links.is_empty() {
                defects.push(format!("view '{name}' must declare at least one link"));
            }
            for link in &view.links {
                if !model.collections.contains_key(&link.collection) {
                    defects.push(format!(
                        "view '{name}' references unknown collection '{}'",
                        link.collection
                    ));
                }
                for analyzer in &link.analyzers {
                    if !model.analyzers.contains_key(analyzer) {
                        defects.push(format!(
                            "view '{name}' references unknown analyzer '{analyzer}'"
                        ));
                    }
                }
            }
        }

        for (name, query) in &model.stored_queries {
            if name.len() > MAX_QUERY_NAME_LENGTH {
                defects.push(format!(
                    "stored query name exceeds {MAX_QUERY_NAME_LENGTH} bytes"
                ));
            }
            for param in query.params.keys() {
                if param.len() > MAX_PARAM_NAME_LENGTH {
                    defects.push(format!(
                        "stored query '{name}' parameter name exceeds {MAX_PARAM_NAME_LENGTH} bytes"
                    ));
                }
            }
            for placeholder in query.placeholders() {
                let declared = query.params.contains_key(&placeholder);
                let reserved = EXECUTOR_PLACEHOLDERS.contains(&placeholder.as_str());
                if !declared && !reserved {
                    defects.push(format!(
                        "stored query '{name}' placeholder '@{placeholder}' has no declared parameter"
                    ));
                }
            }
        }

        if defects.is_empty() {
            Ok(())
        } else {
            Err(RespecError::SpecParse {
                file: "<references>".to_string(),
                reason: defects.join("; "),
            })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
