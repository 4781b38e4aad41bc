//! Cross-cutting filters that are not entity fields or associations:
//! pagination, ordering, date ranges, preload and the search hook.
//!
//! The set of common filter names is an explicit handler table built at
//! compiler construction, not a module-level global. The router consults it
//! before field/association dispatch, so a common filter name wins a
//! collision with a field of the same name.

use crate::ast::{ColumnRef, Predicate, QueryAst, SortDirection};
use crate::error::{CompileError, CompileResult};
use crate::filter::{FilterValue, Scalar};
use crate::schema::EntityRef;
use indexmap::IndexMap;

/// Where a clause is being compiled: which entity, under which alias, and
/// whether we are at the query root or inside an association filter.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub entity: EntityRef,
    pub alias: String,
    pub at_root: bool,
}

impl FilterContext {
    pub fn root(entity: EntityRef) -> Self {
        Self {
            entity,
            alias: entity.entity_alias().to_string(),
            at_root: true,
        }
    }

    pub fn joined(entity: EntityRef, alias: String) -> Self {
        Self {
            entity,
            alias,
            at_root: false,
        }
    }
}

/// A common filter handler folds one clause value into the accumulator.
pub type FilterHandler = fn(&FilterContext, QueryAst, &FilterValue) -> CompileResult<QueryAst>;

/// Injectable name → handler table. [`CommonFilterSet::default`] registers
/// the builtin filters; [`register`](CommonFilterSet::register) extends the
/// table for application-specific cross-cutting filters.
#[derive(Debug, Clone)]
pub struct CommonFilterSet {
    handlers: IndexMap<&'static str, FilterHandler>,
}

impl Default for CommonFilterSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register("preload", preload);
        set.register("start_date", start_date);
        set.register("end_date", end_date);
        set.register("before", before);
        set.register("after", after);
        set.register("ids", ids);
        set.register("first", limit);
        set.register("limit", limit);
        set.register("offset", offset);
        set.register("order_by", order_by);
        set.register(crate::filter::LAST_FILTER, last);
        set.register("search", search);
        set
    }
}

impl CommonFilterSet {
    pub fn empty() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }

    /// Register a handler, replacing any existing one under the same name.
    pub fn register(&mut self, name: &'static str, handler: FilterHandler) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<FilterHandler> {
        self.handlers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}

/// `preload(names)` — record associations to load alongside the result.
fn preload(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, "preload")?;
    match value {
        FilterValue::Scalar(Scalar::String(name)) => Ok(ast.with_preload(name.clone())),
        FilterValue::List(names) => {
            let mut ast = ast;
            for name in names {
                match name {
                    Scalar::String(name) => ast = ast.with_preload(name.clone()),
                    _ => {
                        return Err(CompileError::invalid_filter(
                            "preload",
                            "preload takes association names",
                        ))
                    }
                }
            }
            Ok(ast)
        }
        _ => Err(CompileError::invalid_filter(
            "preload",
            "preload takes an association name or a list of names",
        )),
    }
}

/// `start_date(ts)` — rows inserted at or after the timestamp.
fn start_date(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    let ts = timestamp_operand("start_date", value)?;
    Ok(ast.and_where(Predicate::Gte(
        ColumnRef::new(&ctx.alias, "inserted_at"),
        ts,
    )))
}

/// `end_date(ts)` — rows inserted at or before the timestamp.
fn end_date(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    let ts = timestamp_operand("end_date", value)?;
    Ok(ast.and_where(Predicate::Lte(
        ColumnRef::new(&ctx.alias, "inserted_at"),
        ts,
    )))
}

/// `before(cursor)` — id strictly below the cursor.
fn before(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    let cursor = cursor_operand("before", value)?;
    Ok(ast.and_where(Predicate::Lt(ColumnRef::new(&ctx.alias, "id"), cursor)))
}

/// `after(cursor)` — id strictly above the cursor.
fn after(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    let cursor = cursor_operand("after", value)?;
    Ok(ast.and_where(Predicate::Gt(ColumnRef::new(&ctx.alias, "id"), cursor)))
}

/// `ids(list)` — id membership.
fn ids(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    match value {
        FilterValue::List(list) => Ok(ast.and_where(Predicate::In(
            ColumnRef::new(&ctx.alias, "id"),
            list.clone(),
        ))),
        _ => Err(CompileError::invalid_filter("ids", "ids takes a list of ids")),
    }
}

/// `first(n)` / `limit(n)` — row limit.
fn limit(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, "limit")?;
    Ok(ast.with_limit(uint_operand("limit", value)?))
}

/// `offset(n)` — row offset.
fn offset(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, "offset")?;
    Ok(ast.with_offset(uint_operand("offset", value)?))
}

/// `order_by(field)` or `order_by({direction, field})` — replaces any prior
/// ordering.
fn order_by(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, "order_by")?;
    let (field, direction) = match value {
        FilterValue::Scalar(Scalar::String(field)) => (field.clone(), SortDirection::Asc),
        FilterValue::Map(map) => {
            let field = match map.get("field") {
                Some(FilterValue::Scalar(Scalar::String(f))) => f.clone(),
                _ => {
                    return Err(CompileError::invalid_filter(
                        "order_by",
                        "order_by map requires a `field` name",
                    ))
                }
            };
            let direction = match map.get("direction") {
                None => SortDirection::Asc,
                Some(FilterValue::Scalar(Scalar::String(d))) => match d.as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => {
                        return Err(CompileError::invalid_filter(
                            "order_by",
                            format!("unknown direction `{other}`, expected asc or desc"),
                        ))
                    }
                },
                Some(_) => {
                    return Err(CompileError::invalid_filter(
                        "order_by",
                        "direction must be \"asc\" or \"desc\"",
                    ))
                }
            };
            (field, direction)
        }
        _ => {
            return Err(CompileError::invalid_filter(
                "order_by",
                "order_by takes a field name or {direction, field}",
            ))
        }
    };

    if !ctx.entity.has_field(&field) {
        return Err(CompileError::invalid_filter(
            "order_by",
            format!("`{field}` is not a field of {}", ctx.entity.source_name()),
        ));
    }
    Ok(ast.ordered_by(ColumnRef::new(&ctx.alias, field), direction))
}

/// `last(n)` — the last-N pagination trick.
///
/// The fully-compiled query so far becomes the inner query, re-ordered by
/// descending id and limited to `n`; the returned outer query selects from
/// that subquery and presents the rows in ascending id order. The normalizer
/// guarantees this handler runs after every other clause.
fn last(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, crate::filter::LAST_FILTER)?;
    let n = uint_operand(crate::filter::LAST_FILTER, value)?;

    let base = ast.base;
    let inner = ast
        .cleared_order()
        .ordered_by(
            ColumnRef::new(base.entity_alias(), "id"),
            SortDirection::Desc,
        )
        .with_limit(n);

    Ok(QueryAst::new(base)
        .wrap_subquery(inner)
        .ordered_by(ColumnRef::new(base.entity_alias(), "id"), SortDirection::Asc))
}

/// `search(value)` — delegate to the entity's search hook if it has one.
fn search(ctx: &FilterContext, ast: QueryAst, value: &FilterValue) -> CompileResult<QueryAst> {
    root_only(ctx, "search")?;
    match ctx.entity.search_hook() {
        Some(hook) => Ok(hook(ast, value)),
        None => {
            tracing::warn!(
                entity = ctx.entity.source_name(),
                "search filter used but entity exposes no search hook, skipping"
            );
            Ok(ast)
        }
    }
}

fn root_only(ctx: &FilterContext, name: &str) -> CompileResult<()> {
    if ctx.at_root {
        Ok(())
    } else {
        Err(CompileError::invalid_filter(
            name,
            format!("`{name}` is not allowed inside an association filter"),
        ))
    }
}

fn uint_operand(name: &str, value: &FilterValue) -> CompileResult<u64> {
    match value {
        FilterValue::Scalar(Scalar::Int(n)) if *n >= 0 => Ok(*n as u64),
        _ => Err(CompileError::invalid_filter(
            name,
            format!("`{name}` takes a non-negative integer"),
        )),
    }
}

fn cursor_operand(name: &str, value: &FilterValue) -> CompileResult<Scalar> {
    match value {
        FilterValue::Scalar(s @ (Scalar::Int(_) | Scalar::String(_))) => Ok(s.clone()),
        _ => Err(CompileError::invalid_filter(
            name,
            format!("`{name}` takes an integer or string cursor"),
        )),
    }
}

fn timestamp_operand(name: &str, value: &FilterValue) -> CompileResult<Scalar> {
    match value {
        FilterValue::Scalar(s @ (Scalar::Int(_) | Scalar::String(_))) => Ok(s.clone()),
        _ => Err(CompileError::invalid_filter(
            name,
            format!("`{name}` takes a timestamp"),
        )),
    }
}
