//! Filter input values and the clause normalizer.
//!
//! Filter parameters arrive in loosely-typed shapes (bare scalars, lists,
//! nested maps, case-fold fragments). Classification into the [`FilterValue`]
//! union happens once here, at the boundary; the compiler stages downstream
//! only ever match on the tagged variants.

use crate::error::{CompileError, CompileResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Key of the last-N pagination filter. The normalizer always moves this
/// clause to the end of the clause list, because its handler must see the
/// fully-filtered, fully-joined query.
pub const LAST_FILTER: &str = "last";

/// A single scalar filter operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Classify a JSON scalar. Returns `None` for arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Case-fold modifier applied to a column before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFold {
    Lower,
    Upper,
}

/// A filter value in one of its legal shapes.
///
/// A [`FilterValue::Map`] is interpreted by context: on a field key it is an
/// operator map (`{gte: 3, lt: 10}`), on an association key it is a nested
/// filter compiled against the joined entity.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Map(IndexMap<String, FilterValue>),
    /// Case-folded scalar comparison, e.g. `lower("Billy")`.
    Fragment(CaseFold, Scalar),
}

impl FilterValue {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn lower(value: impl Into<Scalar>) -> Self {
        Self::Fragment(CaseFold::Lower, value.into())
    }

    pub fn upper(value: impl Into<Scalar>) -> Self {
        Self::Fragment(CaseFold::Upper, value.into())
    }

    /// Classify a JSON value into a filter value. Arrays must contain only
    /// scalars; nested maps classify recursively. Fragments have no JSON
    /// form and are built with [`FilterValue::lower`] / [`FilterValue::upper`].
    pub fn from_json(key: &str, value: &serde_json::Value) -> CompileResult<Self> {
        match value {
            serde_json::Value::Array(items) => {
                let mut scalars = Vec::with_capacity(items.len());
                for item in items {
                    match Scalar::from_json(item) {
                        Some(s) => scalars.push(s),
                        None => {
                            return Err(CompileError::invalid_filter(
                                key,
                                "list filters may only contain scalar values",
                            ))
                        }
                    }
                }
                Ok(Self::List(scalars))
            }
            serde_json::Value::Object(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (subkey, subvalue) in entries {
                    map.insert(subkey.clone(), Self::from_json(subkey, subvalue)?);
                }
                Ok(Self::Map(map))
            }
            other => match Scalar::from_json(other) {
                Some(s) => Ok(Self::Scalar(s)),
                None => Err(CompileError::invalid_filter(key, "unsupported value shape")),
            },
        }
    }
}

impl From<Scalar> for FilterValue {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<Vec<Scalar>> for FilterValue {
    fn from(v: Vec<Scalar>) -> Self {
        Self::List(v)
    }
}

/// One `(key, value)` pair of a filter. Clause order is preserved through
/// normalization; AND is commutative so it only matters for `last`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub key: String,
    pub value: FilterValue,
}

impl FilterClause {
    pub fn new(key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Filter input as handed to [`compile`](crate::compiler::QueryCompiler::compile):
/// either an insertion-ordered map or an explicit clause list.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterParams {
    Map(IndexMap<String, FilterValue>),
    List(Vec<FilterClause>),
}

impl FilterParams {
    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(m) => m.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }

    /// Classify a JSON object into filter params, e.g. straight out of an
    /// HTTP request body.
    pub fn from_json(value: &serde_json::Value) -> CompileResult<Self> {
        match value {
            serde_json::Value::Object(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, subvalue) in entries {
                    map.insert(key.clone(), FilterValue::from_json(key, subvalue)?);
                }
                Ok(Self::Map(map))
            }
            _ => Err(CompileError::invalid_filter(
                "<params>",
                "filter params must be a map of key/value pairs",
            )),
        }
    }
}

impl From<IndexMap<String, FilterValue>> for FilterParams {
    fn from(map: IndexMap<String, FilterValue>) -> Self {
        Self::Map(map)
    }
}

impl From<Vec<FilterClause>> for FilterParams {
    fn from(clauses: Vec<FilterClause>) -> Self {
        Self::List(clauses)
    }
}

impl From<Vec<(String, FilterValue)>> for FilterParams {
    fn from(pairs: Vec<(String, FilterValue)>) -> Self {
        Self::List(
            pairs
                .into_iter()
                .map(|(key, value)| FilterClause { key, value })
                .collect(),
        )
    }
}

/// Normalize filter params into an ordered clause list.
///
/// Relative order of clauses is preserved, with one exception: a `last`
/// clause is moved to the final position so the last-N subquery wrap is
/// compiled after every other predicate, join and ordering.
pub fn normalize(params: FilterParams) -> Vec<FilterClause> {
    let clauses: Vec<FilterClause> = match params {
        FilterParams::Map(map) => map
            .into_iter()
            .map(|(key, value)| FilterClause { key, value })
            .collect(),
        FilterParams::List(list) => list,
    };

    let (mut rest, last): (Vec<_>, Vec<_>) =
        clauses.into_iter().partition(|c| c.key != LAST_FILTER);
    rest.extend(last);
    rest
}
