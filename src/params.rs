//! Hyperparameter values and the literal coercion applied before estimators see them

use crate::error::{MetaMlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value as declared in a catalog or knowledgebase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Parameter name to value mapping; ordered so its string form is stable
pub type ParamMap = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Convert the string literals `true`, `false` and `none` (any case) into
    /// their typed values. Every other value is returned unchanged.
    pub fn coerce_literal(self) -> Self {
        match self {
            ParamValue::Str(s) => match s.to_lowercase().as_str() {
                "true" => ParamValue::Bool(true),
                "false" => ParamValue::Bool(false),
                "none" => ParamValue::Null,
                _ => ParamValue::Str(s),
            },
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Apply [`ParamValue::coerce_literal`] to every entry of a parameter map
pub fn coerce_literals(params: &ParamMap) -> ParamMap {
    params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().coerce_literal()))
        .collect()
}

/// Canonical string form of a parameter map, used as the identity of a
/// candidate together with its algorithm name
pub fn parameter_key(params: &ParamMap) -> String {
    let body: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{:?}: {}", k, v))
        .collect();
    format!("{{{}}}", body.join(", "))
}

pub(crate) fn invalid_parameter(name: &str, value: &ParamValue, reason: &str) -> MetaMlError {
    MetaMlError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn expect_usize(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_i64() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(invalid_parameter(name, value, "expected a non-negative integer")),
    }
}

pub(crate) fn expect_optional_usize(name: &str, value: &ParamValue) -> Result<Option<usize>> {
    if value.is_null() {
        return Ok(None);
    }
    expect_usize(name, value).map(Some)
}

pub(crate) fn expect_f64(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid_parameter(name, value, "expected a finite number"))
}

pub(crate) fn expect_bool(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid_parameter(name, value, "expected a boolean"))
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid_parameter(name, value, "expected a string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_literal_case_insensitive() {
        assert_eq!(ParamValue::from("TRUE").coerce_literal(), ParamValue::Bool(true));
        assert_eq!(ParamValue::from("False").coerce_literal(), ParamValue::Bool(false));
        assert_eq!(ParamValue::from("none").coerce_literal(), ParamValue::Null);
        assert_eq!(ParamValue::from("NoNe").coerce_literal(), ParamValue::Null);
    }

    #[test]
    fn test_coerce_literal_passthrough() {
        assert_eq!(ParamValue::from("gini").coerce_literal(), ParamValue::from("gini"));
        assert_eq!(ParamValue::from("truthy").coerce_literal(), ParamValue::from("truthy"));
        assert_eq!(ParamValue::Int(3).coerce_literal(), ParamValue::Int(3));
    }

    #[test]
    fn test_untagged_deserialization() {
        let params: ParamMap =
            serde_json::from_str(r#"{"a": 1, "b": 0.5, "c": "gini", "d": null, "e": true}"#)
                .unwrap();
        assert_eq!(params["a"], ParamValue::Int(1));
        assert_eq!(params["b"], ParamValue::Float(0.5));
        assert_eq!(params["c"], ParamValue::from("gini"));
        assert_eq!(params["d"], ParamValue::Null);
        assert_eq!(params["e"], ParamValue::Bool(true));
    }

    #[test]
    fn test_parameter_key_is_order_independent() {
        let mut a = ParamMap::new();
        a.insert("max_depth".into(), ParamValue::Int(3));
        a.insert("criterion".into(), ParamValue::from("gini"));

        let mut b = ParamMap::new();
        b.insert("criterion".into(), ParamValue::from("gini"));
        b.insert("max_depth".into(), ParamValue::Int(3));

        assert_eq!(parameter_key(&a), parameter_key(&b));
        assert_eq!(parameter_key(&a), r#"{"criterion": "gini", "max_depth": 3}"#);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(expect_usize("k", &ParamValue::Int(5)).unwrap(), 5);
        assert_eq!(expect_usize("k", &ParamValue::Float(5.0)).unwrap(), 5);
        assert!(expect_usize("k", &ParamValue::Int(-1)).is_err());
        assert_eq!(expect_optional_usize("d", &ParamValue::Null).unwrap(), None);
        assert!(expect_bool("b", &ParamValue::from("yes")).is_err());
        assert!(expect_f64("c", &ParamValue::Float(f64::NAN)).is_err());
    }
}
