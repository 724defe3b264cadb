//! # Filter Expression Module
//!
//! Compiles the structured filter expression accepted from clients into the
//! bound-parameter form consumed by query templates.
//!
//! Semantics:
//! - The expression is a sequence of blocks: a match on ANY block suffices (OR).
//! - Within one block, every attribute condition must hold (AND).
//! - A list value means membership ("attribute is one of these"), not equality.
//! - An absent expression, JSON `null`, and an empty block list all mean
//!   "no filtering" — never "match nothing".
//!
//! The builder never interpolates attribute names or values into template
//! text; it only produces a structure bound under the parameter's name.

use crate::primitives::{MAX_FILTER_BLOCKS, MAX_FILTER_VALUES};
use crate::types::RespecError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// COMPILED FORM
// =============================================================================

/// One attribute condition: the document value must equal one of `values`.
///
/// Equality is the single-element case of membership, so both wire forms
/// compile to the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Attribute name the condition applies to.
    pub attr: String,
    /// Accepted scalar values.
    pub values: Vec<Value>,
}

/// A compiled filter: OR across blocks, AND across conditions within a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompiledFilter {
    /// Conjunction blocks, in client order.
    pub blocks: Vec<Vec<FilterCondition>>,
}

impl CompiledFilter {
    /// Whether a document satisfies this filter.
    ///
    /// Used by backends that evaluate the bound structure directly.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        self.blocks.iter().any(|block| {
            block.iter().all(|cond| {
                doc.get(&cond.attr)
                    .is_some_and(|v| cond.values.iter().any(|allowed| allowed == v))
            })
        })
    }

    /// The bind-parameter value placed into the bound map.
    #[must_use]
    pub fn to_bind_value(&self) -> Value {
        serde_json::to_value(&self.blocks).unwrap_or(Value::Null)
    }

    /// Recover a compiled filter from a bind value.
    ///
    /// `Null` is "no filtering". Returns `None` for bind values that do not
    /// carry a compiled filter shape.
    #[must_use]
    pub fn from_bind_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(Self::default());
        }
        serde_json::from_value(value.clone())
            .ok()
            .map(|blocks| Self { blocks })
    }

    /// True when this filter accepts every document.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.blocks.is_empty()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Compiles client-supplied filter expressions.
pub struct FilterExpressionBuilder;

impl FilterExpressionBuilder {
    /// Compile a client value into its bind-parameter form.
    ///
    /// `null` and `[]` compile to `Null` (no filtering). Anything else must
    /// be an array of attribute → scalar-or-list objects.
    pub fn compile(param: &str, value: &Value) -> Result<Value, RespecError> {
        let filter = Self::parse(param, value)?;
        if filter.is_unfiltered() {
            Ok(Value::Null)
        } else {
            Ok(filter.to_bind_value())
        }
    }

    /// Parse and validate a client value into a [`CompiledFilter`].
    pub fn parse(param: &str, value: &Value) -> Result<CompiledFilter, RespecError> {
        let blocks_in = match value {
            Value::Null => return Ok(CompiledFilter::default()),
            Value::Array(blocks) => blocks,
            other => {
                return Err(RespecError::TypeMismatch {
                    param: param.to_string(),
                    expected: "filter",
                    got: type_name(other).to_string(),
                });
            }
        };

        if blocks_in.len() > MAX_FILTER_BLOCKS {
            return Err(RespecError::TypeMismatch {
                param: param.to_string(),
                expected: "filter",
                got: format!("{} blocks (max {MAX_FILTER_BLOCKS})", blocks_in.len()),
            });
        }

        let mut blocks = Vec::with_capacity(blocks_in.len());
        for block in blocks_in {
            let Value::Object(map) = block else {
                return Err(RespecError::TypeMismatch {
                    param: param.to_string(),
                    expected: "filter",
                    got: format!("block of type {}", type_name(block)),
                });
            };
            let mut conditions = Vec::with_capacity(map.len());
            for (attr, raw) in map {
                let values = match raw {
                    Value::Array(list) => {
                        if list.len() > MAX_FILTER_VALUES {
                            return Err(RespecError::TypeMismatch {
                                param: param.to_string(),
                                expected: "filter",
                                got: format!(
                                    "{} membership values for '{attr}' (max {MAX_FILTER_VALUES})",
                                    list.len()
                                ),
                            });
                        }
                        for item in list {
                            require_scalar(param, attr, item)?;
                        }
                        list.clone()
                    }
                    scalar => {
                        require_scalar(param, attr, scalar)?;
                        vec![scalar.clone()]
                    }
                };
                conditions.push(FilterCondition {
                    attr: attr.clone(),
                    values,
                });
            }
            blocks.push(conditions);
        }
        Ok(CompiledFilter { blocks })
    }
}

fn require_scalar(param: &str, attr: &str, value: &Value) -> Result<(), RespecError> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(()),
        other => Err(RespecError::TypeMismatch {
            param: param.to_string(),
            expected: "filter",
            got: format!("non-scalar condition value for '{attr}': {}", type_name(other)),
        }),
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
