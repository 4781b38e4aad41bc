//! Comparison compiler: one field + one filter value → predicates.
//!
//! ## Value shape rules
//!
//! ```text
//! compile_comparison(alias, field, type, value)
//!   ├─ Scalar(null)        → error (ambiguous; use {eq: null} / {ne: null})
//!   ├─ Scalar(v)           → Eq            (array column: ArrayContains)
//!   ├─ List(vs)            → In            (array column: array equality)
//!   ├─ Fragment(fold, v)   → Eq on the case-folded column
//!   └─ Map{op → operand}   → one predicate per pair, ANDed
//!        ├─ eq/ne null     → IsNull / NotNull
//!        ├─ eq/ne list     → In / NotIn    (array column: array equality)
//!        ├─ eq/ne fragment → compare against the case-folded column
//!        ├─ gt/lt/gte/lte  → non-null scalar operand required
//!        └─ like/ilike     → string operand, wrapped in %…%
//! ```

use crate::ast::{ColumnRef, Operand, Predicate};
use crate::error::{CompileError, CompileResult};
use crate::filter::{FilterValue, Scalar};
use crate::schema::TypeTag;

/// Comparison operators accepted inside an operator map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    ILike,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "ilike" => Some(Self::ILike),
            _ => None,
        }
    }
}

/// Compile a single field comparison into the ANDed predicate set it
/// denotes. `alias` qualifies the column in the resulting predicates.
pub fn compile_comparison(
    alias: &str,
    field: &str,
    type_tag: TypeTag,
    value: &FilterValue,
) -> CompileResult<Vec<Predicate>> {
    let column = ColumnRef::new(alias, field);

    match value {
        FilterValue::Scalar(Scalar::Null) => Err(CompileError::invalid_filter(
            field,
            "direct null comparison is ambiguous, use {eq: null} or {ne: null}",
        )),
        FilterValue::Scalar(scalar) => {
            if type_tag.is_array() {
                Ok(vec![Predicate::ArrayContains(column, scalar.clone())])
            } else {
                Ok(vec![Predicate::Eq(column, Operand::Value(scalar.clone()))])
            }
        }
        FilterValue::List(scalars) => {
            if type_tag.is_array() {
                Ok(vec![Predicate::Eq(column, Operand::List(scalars.clone()))])
            } else {
                Ok(vec![Predicate::In(column, scalars.clone())])
            }
        }
        FilterValue::Fragment(fold, scalar) => Ok(vec![Predicate::Eq(
            ColumnRef::folded(alias, field, *fold),
            Operand::Value(scalar.clone()),
        )]),
        FilterValue::Map(operators) => {
            let mut predicates = Vec::with_capacity(operators.len());
            for (name, operand) in operators {
                let operator = Operator::parse(name).ok_or_else(|| {
                    CompileError::invalid_filter(
                        field,
                        format!("unknown comparison operator `{name}`"),
                    )
                })?;
                predicates.push(compile_operator(alias, field, type_tag, operator, operand)?);
            }
            Ok(predicates)
        }
    }
}

fn compile_operator(
    alias: &str,
    field: &str,
    type_tag: TypeTag,
    operator: Operator,
    operand: &FilterValue,
) -> CompileResult<Predicate> {
    let column = ColumnRef::new(alias, field);

    match operator {
        Operator::Eq => match operand {
            FilterValue::Scalar(Scalar::Null) => Ok(Predicate::IsNull(column)),
            FilterValue::Scalar(s) => Ok(Predicate::Eq(column, Operand::Value(s.clone()))),
            FilterValue::List(l) => {
                if type_tag.is_array() {
                    Ok(Predicate::Eq(column, Operand::List(l.clone())))
                } else {
                    Ok(Predicate::In(column, l.clone()))
                }
            }
            FilterValue::Fragment(fold, s) => Ok(Predicate::Eq(
                ColumnRef::folded(alias, field, *fold),
                Operand::Value(s.clone()),
            )),
            FilterValue::Map(_) => Err(nested_map(field, "eq")),
        },
        Operator::Ne => match operand {
            FilterValue::Scalar(Scalar::Null) => Ok(Predicate::NotNull(column)),
            FilterValue::Scalar(s) => Ok(Predicate::Ne(column, Operand::Value(s.clone()))),
            FilterValue::List(l) => {
                if type_tag.is_array() {
                    Ok(Predicate::Ne(column, Operand::List(l.clone())))
                } else {
                    Ok(Predicate::NotIn(column, l.clone()))
                }
            }
            FilterValue::Fragment(fold, s) => Ok(Predicate::Ne(
                ColumnRef::folded(alias, field, *fold),
                Operand::Value(s.clone()),
            )),
            FilterValue::Map(_) => Err(nested_map(field, "ne")),
        },
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
            let scalar = match operand {
                FilterValue::Scalar(s) if !s.is_null() => s.clone(),
                _ => {
                    return Err(CompileError::invalid_filter(
                        field,
                        "ordering comparisons require a non-null scalar operand",
                    ))
                }
            };
            Ok(match operator {
                Operator::Gt => Predicate::Gt(column, scalar),
                Operator::Lt => Predicate::Lt(column, scalar),
                Operator::Gte => Predicate::Gte(column, scalar),
                _ => Predicate::Lte(column, scalar),
            })
        }
        Operator::Like | Operator::ILike => {
            let pattern = match operand {
                FilterValue::Scalar(Scalar::String(s)) => format!("%{s}%"),
                _ => {
                    return Err(CompileError::invalid_filter(
                        field,
                        "like/ilike require a string operand",
                    ))
                }
            };
            Ok(if operator == Operator::Like {
                Predicate::Like(column, pattern)
            } else {
                Predicate::ILike(column, pattern)
            })
        }
    }
}

fn nested_map(field: &str, operator: &str) -> CompileError {
    CompileError::invalid_filter(field, format!("`{operator}` operand may not be a nested map"))
}
