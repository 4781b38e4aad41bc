//! The query accumulator: predicates, join bindings and the query shape
//! threaded through clause compilation.
//!
//! [`QueryAst`] is append-only. Builder methods take `self` by value and
//! return a new value; once `compile` hands an AST back it is never mutated,
//! so callers layering extra predicates derive a new AST instead.

use crate::error::{CompileError, CompileResult};
use crate::filter::{CaseFold, Scalar};
use crate::schema::EntityRef;
use indexmap::IndexMap;

/// A column reference qualified by the alias of the entity it belongs to,
/// optionally wrapped in a case-fold function.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub alias: String,
    pub field: String,
    pub fold: Option<CaseFold>,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            fold: None,
        }
    }

    pub fn folded(alias: impl Into<String>, field: impl Into<String>, fold: CaseFold) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            fold: Some(fold),
        }
    }
}

/// Right-hand side of an equality comparison. The list form expresses
/// whole-array equality against an array-typed column.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Scalar),
    List(Vec<Scalar>),
}

/// A single boolean condition over one column. The predicate list of a
/// [`QueryAst`] is conjunctive.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(ColumnRef, Operand),
    Ne(ColumnRef, Operand),
    Gt(ColumnRef, Scalar),
    Lt(ColumnRef, Scalar),
    Gte(ColumnRef, Scalar),
    Lte(ColumnRef, Scalar),
    Like(ColumnRef, String),
    ILike(ColumnRef, String),
    In(ColumnRef, Vec<Scalar>),
    NotIn(ColumnRef, Vec<Scalar>),
    IsNull(ColumnRef),
    NotNull(ColumnRef),
    /// Scalar membership in an array-typed column.
    ArrayContains(ColumnRef, Scalar),
}

impl Predicate {
    pub fn column(&self) -> &ColumnRef {
        match self {
            Self::Eq(c, _)
            | Self::Ne(c, _)
            | Self::Gt(c, _)
            | Self::Lt(c, _)
            | Self::Gte(c, _)
            | Self::Lte(c, _)
            | Self::Like(c, _)
            | Self::ILike(c, _)
            | Self::In(c, _)
            | Self::NotIn(c, _)
            | Self::IsNull(c)
            | Self::NotNull(c)
            | Self::ArrayContains(c, _) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// An inner join registered for one association path. The alias is derived
/// from the path (root alias + `_` + association name per hop), so one path
/// always maps to one binding.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinBinding {
    pub alias: String,
    pub path: Vec<String>,
    pub target: EntityRef,
}

/// The compiled query: base entity, joins, conjunctive predicates, shape.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    pub base: EntityRef,
    pub joins: IndexMap<String, JoinBinding>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<(ColumnRef, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub preload: Vec<String>,
    /// When present, this AST's predicates and ordering apply to the result
    /// of the wrapped inner query. Only the last-N trick sets it.
    pub subquery_wrap: Option<Box<QueryAst>>,
}

impl QueryAst {
    /// The identity query over `base`: no predicates, no joins, no ordering.
    pub fn new(base: EntityRef) -> Self {
        Self {
            base,
            joins: IndexMap::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            preload: Vec::new(),
            subquery_wrap: None,
        }
    }

    /// Alias qualifying columns of the base entity.
    pub fn base_alias(&self) -> &'static str {
        self.base.entity_alias()
    }

    pub fn is_identity(&self) -> bool {
        self.joins.is_empty()
            && self.predicates.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
            && self.preload.is_empty()
            && self.subquery_wrap.is_none()
    }

    /// AND a predicate onto the query.
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// AND a whole predicate set onto the query.
    pub fn and_where_all(mut self, predicates: Vec<Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// Register a join binding. Re-registering the identical path is a no-op
    /// (the existing binding is reused); the same alias with a different
    /// path is a collision and never overwrites.
    pub fn join(mut self, binding: JoinBinding) -> CompileResult<Self> {
        if let Some(existing) = self.joins.get(&binding.alias) {
            if existing.path == binding.path {
                return Ok(self);
            }
            return Err(CompileError::AliasCollision {
                alias: binding.alias,
                existing_path: existing.path.clone(),
                new_path: binding.path,
            });
        }
        tracing::debug!(alias = %binding.alias, path = ?binding.path, "registering join binding");
        self.joins.insert(binding.alias.clone(), binding);
        Ok(self)
    }

    /// Replace the ordering with a single `(column, direction)` pair.
    pub fn ordered_by(mut self, column: ColumnRef, direction: SortDirection) -> Self {
        self.order_by = vec![(column, direction)];
        self
    }

    pub fn cleared_order(mut self) -> Self {
        self.order_by.clear();
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_preload(mut self, association: impl Into<String>) -> Self {
        self.preload.push(association.into());
        self
    }

    /// Wrap `inner` as the subquery this AST selects from.
    pub fn wrap_subquery(mut self, inner: QueryAst) -> Self {
        self.subquery_wrap = Some(Box::new(inner));
        self
    }
}
