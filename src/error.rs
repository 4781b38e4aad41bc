//! Typed errors for the filter compiler.

use thiserror::Error;

/// Compilation errors. All variants are fatal: compilation stops at the
/// first one and no partial AST is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The filter value has an illegal shape for the key it was given to:
    /// a direct null comparison, a non-map association filter, an unknown
    /// comparison operator, a malformed common-filter argument.
    #[error("invalid filter on `{field}`: {reason}")]
    InvalidFilter { field: String, reason: String },

    /// An operation that only makes sense on a to-many association was
    /// applied to a to-one association.
    #[error("association `{association}` is to-one, operation requires to-many")]
    AssociationCardinality { association: String },

    /// The clause key matches no field, association, or common filter.
    /// Only raised in strict mode; lax mode logs and skips the clause.
    #[error("unknown field or association `{field}` on `{entity}`")]
    UnknownField { entity: String, field: String },

    /// A join alias is already bound to a different association path.
    /// Unreachable under path-derived alias naming, checked anyway so a
    /// binding is never silently overwritten.
    #[error("join alias `{alias}` already bound to path {existing_path:?}, cannot rebind to {new_path:?}")]
    AliasCollision {
        alias: String,
        existing_path: Vec<String>,
        new_path: Vec<String>,
    },
}

impl CompileError {
    pub fn invalid_filter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;
