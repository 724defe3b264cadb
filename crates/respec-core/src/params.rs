//! # Parameter Validation Module
//!
//! Translates untrusted, loosely-typed client parameter maps into fully
//! bound parameter maps against a stored query's declared schema.
//!
//! This pass is the system's primary injection defense: no key reaches a
//! query template unless it was declared, and every declared parameter ends
//! up bound (by value or by default) so the template is never executed with
//! a partially-bound placeholder.
//!
//! A supplied JSON `null` is treated as "not supplied": clients on the wire
//! send explicit nulls for parameters they want defaulted.

use crate::types::{ParamSchema, ParamType, RespecError, StoredQuerySpec};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// VALIDATOR
// =============================================================================

/// Validates and coerces client parameter maps.
pub struct ParameterValidator;

impl ParameterValidator {
    /// Validate `supplied` against the query's declared parameters.
    ///
    /// On success the returned map contains exactly the declared parameter
    /// names, each bound to a coerced value or a default.
    pub fn validate(
        spec: &StoredQuerySpec,
        supplied: &Map<String, Value>,
    ) -> Result<BTreeMap<String, Value>, RespecError> {
        Self::validate_at(spec, supplied, now_epoch_ms())
    }

    /// Like [`validate`](Self::validate), with an explicit clock for
    /// computed timestamp defaults. Exposed for deterministic tests.
    pub fn validate_at(
        spec: &StoredQuerySpec,
        supplied: &Map<String, Value>,
        now_ms: i64,
    ) -> Result<BTreeMap<String, Value>, RespecError> {
        // Reject undeclared keys first: silent passthrough is never allowed.
        for key in supplied.keys() {
            if !spec.params.contains_key(key) {
                return Err(RespecError::UnknownParameter(key.clone()));
            }
        }

        let mut bound = BTreeMap::new();
        for (name, schema) in &spec.params {
            let value = match supplied.get(name) {
                Some(v) if !v.is_null() => coerce(name, schema.param_type, v)?,
                _ => default_for(name, schema, now_ms)?,
            };
            bound.insert(name.clone(), value);
        }
        Ok(bound)
    }
}

/// Current wall-clock time in epoch milliseconds.
fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Resolve the value for an absent (or null) parameter.
fn default_for(name: &str, schema: &ParamSchema, now_ms: i64) -> Result<Value, RespecError> {
    if schema.required {
        return Err(RespecError::MissingRequiredParameter(name.to_string()));
    }
    if let Some(default) = &schema.default {
        return Ok(default.clone());
    }
    // Computed defaults: a timestamp with no declared default means "now".
    match schema.param_type {
        ParamType::Timestamp => Ok(Value::Number(Number::from(now_ms))),
        _ => Ok(Value::Null),
    }
}

/// Coerce a supplied value to the canonical representation for its type.
fn coerce(name: &str, ty: ParamType, value: &Value) -> Result<Value, RespecError> {
    let mismatch = |got: String| RespecError::TypeMismatch {
        param: name.to_string(),
        expected: ty.name(),
        got,
    };

    match ty {
        ParamType::String => match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(mismatch(describe(other))),
        },
        ParamType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            // Numeric strings coerce only when the schema says number.
            Value::String(s) => parse_number(s)
                .map(Value::Number)
                .ok_or_else(|| mismatch(format!("non-numeric string \"{s}\""))),
            other => Err(mismatch(describe(other))),
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            other => Err(mismatch(describe(other))),
        },
        ParamType::Timestamp => match value {
            // Timestamps are epoch-milliseconds integers on the wire.
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(_) => Err(mismatch("fractional number".to_string())),
            other => Err(mismatch(describe(other))),
        },
        ParamType::List => match value {
            Value::Array(_) => Ok(value.clone()),
            other => Err(mismatch(describe(other))),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            other => Err(mismatch(describe(other))),
        },
        // Structure is validated in depth when the executor compiles the
        // expression; here only the outer shape is checked.
        ParamType::Filter => match value {
            Value::Array(_) | Value::Null => Ok(value.clone()),
            other => Err(mismatch(describe(other))),
        },
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.trim().parse::<i64>() {
        return Some(Number::from(i));
    }
    s.trim().parse::<f64>().ok().and_then(Number::from_f64)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(params: Value) -> StoredQuerySpec {
        StoredQuerySpec {
            name: "q".to_string(),
            query: "RETURN 1".to_string(),
            params: serde_json::from_value(params).expect("params"),
        }
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn unknown_parameter_rejected() {
        let q = query(json!({"a": {"type": "string", "required": true}}));
        let err = ParameterValidator::validate(&q, &map(json!({"a": "x", "bogus": 1})))
            .expect_err("must fail");
        assert!(matches!(err, RespecError::UnknownParameter(ref k) if k == "bogus"));
    }

    #[test]
    fn missing_required_rejected() {
        let q = query(json!({"a": {"type": "string", "required": true}}));
        let err = ParameterValidator::validate(&q, &Map::new()).expect_err("must fail");
        assert!(matches!(err, RespecError::MissingRequiredParameter(ref k) if k == "a"));
    }

    #[test]
    fn null_means_absent() {
        let q = query(json!({"a": {"type": "string", "required": true}}));
        let err =
            ParameterValidator::validate(&q, &map(json!({"a": null}))).expect_err("must fail");
        assert!(matches!(err, RespecError::MissingRequiredParameter(_)));
    }

    #[test]
    fn every_declared_param_is_bound() {
        let q = query(json!({
            "a": {"type": "string", "default": "x"},
            "b": {"type": "number"},
            "c": {"type": "timestamp"},
        }));
        let bound = ParameterValidator::validate_at(&q, &Map::new(), 1_700_000_000_000)
            .expect("validate");
        assert_eq!(bound.len(), 3);
        assert_eq!(bound["a"], json!("x"));
        assert_eq!(bound["b"], Value::Null);
        assert_eq!(bound["c"], json!(1_700_000_000_000i64));
    }

    #[test]
    fn timestamp_defaults_to_now() {
        let q = query(json!({"ts": {"type": "timestamp"}}));
        let bound =
            ParameterValidator::validate_at(&q, &Map::new(), 42).expect("validate");
        assert_eq!(bound["ts"], json!(42));
    }

    #[test]
    fn numeric_string_coerces_for_number_only() {
        let q = query(json!({"n": {"type": "number"}, "s": {"type": "string"}}));
        let bound = ParameterValidator::validate(&q, &map(json!({"n": "12", "s": "12"})))
            .expect("validate");
        assert_eq!(bound["n"], json!(12));
        assert_eq!(bound["s"], json!("12"));

        let err = ParameterValidator::validate(&q, &map(json!({"n": "twelve"})))
            .expect_err("must fail");
        assert!(matches!(err, RespecError::TypeMismatch { .. }));
    }

    #[test]
    fn fractional_timestamp_rejected() {
        let q = query(json!({"ts": {"type": "timestamp"}}));
        let err = ParameterValidator::validate(&q, &map(json!({"ts": 1.5})))
            .expect_err("must fail");
        assert!(err.to_string().contains("ts"));
    }

    #[test]
    fn filter_accepts_null_and_array_only() {
        let q = query(json!({"f": {"type": "filter"}}));
        assert!(ParameterValidator::validate(&q, &map(json!({"f": [{"rank": "species"}]}))).is_ok());
        assert!(ParameterValidator::validate(&q, &map(json!({"f": "rank"}))).is_err());
    }
}
