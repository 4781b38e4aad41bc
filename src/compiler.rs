//! Query compiler: routes each filter clause and folds it into the AST.
//!
//! ## Routing flow
//!
//! ```text
//! compile(entity, params)
//!   ├─ normalize()            → ordered clause list, `last` moved to the end
//!   ├─ empty input            → identity AST, nothing else runs
//!   └─ fold compile_clause() over the clauses
//!        ├─ common filter name → its handler (wins name collisions)
//!        ├─ field of entity    → compile_comparison(), predicates ANDed on
//!        ├─ association        → walk the path (through chains hop by hop),
//!        │                       register one inner-join binding per hop
//!        │                       (alias = parent alias + "_" + hop name),
//!        │                       then recurse over the nested filter map
//!        │                       against the target entity
//!        └─ anything else      → warn + skip, or error in strict mode
//! ```
//!
//! Aliases are pure functions of the join path, so two clauses reaching the
//! same association bind to the same join instead of duplicating it.

use crate::ast::{ColumnRef, JoinBinding, Predicate, QueryAst};
use crate::common_filters::{CommonFilterSet, FilterContext};
use crate::comparison::compile_comparison;
use crate::error::{CompileError, CompileResult};
use crate::filter::{normalize, FilterParams, FilterValue};
use crate::schema::{Cardinality, EntityRef};

/// Compiler construction options.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// When set, a clause key matching no field, association or common
    /// filter aborts compilation instead of being logged and skipped.
    pub strict_unknown_fields: bool,
    pub common_filters: CommonFilterSet,
}

/// The filter-to-query compiler. Pure and synchronous: every call builds a
/// fresh accumulator from immutable inputs, so one compiler can be shared
/// across threads freely.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// A compiler that rejects unknown filter keys.
    pub fn strict() -> Self {
        Self::from_config(CompilerConfig {
            strict_unknown_fields: true,
            ..Default::default()
        })
    }

    pub fn common_filters(&self) -> &CommonFilterSet {
        &self.config.common_filters
    }

    /// Compile filter params against `entity` into a query AST.
    pub fn compile(&self, entity: EntityRef, params: FilterParams) -> CompileResult<QueryAst> {
        let clauses = normalize(params);
        let mut ast = QueryAst::new(entity);
        if clauses.is_empty() {
            return Ok(ast);
        }

        let ctx = FilterContext::root(entity);
        for clause in &clauses {
            ast = self.compile_clause(ast, &ctx, &clause.key, &clause.value)?;
        }
        Ok(ast)
    }

    /// Compile a single field comparison outside the full pipeline. An
    /// operator map yields several predicates, ANDed by the caller.
    pub fn compile_field(
        &self,
        entity: EntityRef,
        field: &str,
        value: &FilterValue,
    ) -> CompileResult<Vec<Predicate>> {
        let type_tag = entity
            .field_type(field)
            .ok_or_else(|| CompileError::unknown_field(entity.source_name(), field))?;
        compile_comparison(entity.entity_alias(), field, type_tag, value)
    }

    /// Build a query loading rows of a to-many association by id list (the
    /// cursor-preload helper). To-one associations are rejected.
    pub fn compile_assoc_ids(
        &self,
        entity: EntityRef,
        association: &str,
        ids: Vec<crate::filter::Scalar>,
    ) -> CompileResult<QueryAst> {
        let descriptor = entity
            .association(association)
            .ok_or_else(|| CompileError::unknown_field(entity.source_name(), association))?;
        if descriptor.cardinality == Cardinality::One {
            return Err(CompileError::AssociationCardinality {
                association: association.to_string(),
            });
        }

        let target = descriptor.target;
        Ok(QueryAst::new(target).and_where(Predicate::In(
            ColumnRef::new(target.entity_alias(), "id"),
            ids,
        )))
    }

    fn compile_clause(
        &self,
        ast: QueryAst,
        ctx: &FilterContext,
        key: &str,
        value: &FilterValue,
    ) -> CompileResult<QueryAst> {
        if let Some(handler) = self.config.common_filters.get(key) {
            return handler(ctx, ast, value);
        }

        if let Some(type_tag) = ctx.entity.field_type(key) {
            let predicates = compile_comparison(&ctx.alias, key, type_tag, value)?;
            return Ok(ast.and_where_all(predicates));
        }

        if ctx.entity.association(key).is_some() {
            return self.compile_association(ast, ctx, key, value);
        }

        if self.config.strict_unknown_fields {
            return Err(CompileError::unknown_field(ctx.entity.source_name(), key));
        }
        tracing::warn!(
            entity = ctx.entity.source_name(),
            key,
            "unknown filter key, skipping clause"
        );
        Ok(ast)
    }

    fn compile_association(
        &self,
        ast: QueryAst,
        ctx: &FilterContext,
        name: &str,
        value: &FilterValue,
    ) -> CompileResult<QueryAst> {
        let nested = match value {
            FilterValue::Map(map) => map,
            _ => {
                return Err(CompileError::invalid_filter(
                    name,
                    "must provide a filter map for association filters",
                ))
            }
        };

        let parent_path: Vec<String> = ast
            .joins
            .get(&ctx.alias)
            .map(|binding| binding.path.clone())
            .unwrap_or_default();
        let (ast, alias, _, target) =
            self.join_path(ast, ctx.entity, ctx.alias.clone(), parent_path, name)?;

        let nested_ctx = FilterContext::joined(target, alias);
        let mut ast = ast;
        for (subkey, subvalue) in nested {
            ast = self.compile_clause(ast, &nested_ctx, subkey, subvalue)?;
        }
        Ok(ast)
    }

    /// Resolve one association hop, registering join bindings along the way.
    /// A `through` association walks its chain hop by hop; each hop gets its
    /// own path-derived alias. Returns the updated AST plus the alias, path
    /// and entity of the terminal target.
    fn join_path(
        &self,
        ast: QueryAst,
        entity: EntityRef,
        alias: String,
        path: Vec<String>,
        name: &str,
    ) -> CompileResult<(QueryAst, String, Vec<String>, EntityRef)> {
        let descriptor = entity
            .association(name)
            .ok_or_else(|| CompileError::unknown_field(entity.source_name(), name))?;

        if let Some(chain) = descriptor.through {
            let mut state = (ast, alias, path, entity);
            for hop in chain {
                state = self.join_path(state.0, state.3, state.1, state.2, hop)?;
            }
            return Ok(state);
        }

        let hop_alias = format!("{alias}_{name}");
        let mut hop_path = path;
        hop_path.push(name.to_string());
        let ast = ast.join(JoinBinding {
            alias: hop_alias.clone(),
            path: hop_path.clone(),
            target: descriptor.target,
        })?;
        Ok((ast, hop_alias, hop_path, descriptor.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Operand, SortDirection};
    use crate::filter::{FilterClause, Scalar, LAST_FILTER};
    use crate::schema::fixtures::{comment, post, user};
    use indexmap::IndexMap;
    use serde_json::json;

    fn compile_json(entity: EntityRef, params: serde_json::Value) -> CompileResult<QueryAst> {
        QueryCompiler::new().compile(entity, FilterParams::from_json(&params).unwrap())
    }

    #[test]
    fn test_empty_params_yield_identity_ast() {
        let ast = compile_json(post(), json!({})).unwrap();
        assert!(ast.is_identity());
        assert_eq!(ast.base, post());
    }

    #[test]
    fn test_single_field_equality() {
        let ast = compile_json(post(), json!({"title": "hello"})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::Eq(
                ColumnRef::new("post", "title"),
                Operand::Value(Scalar::from("hello"))
            )]
        );
        assert!(ast.joins.is_empty());
    }

    #[test]
    fn test_association_filter_joins_and_qualifies() {
        let ast = compile_json(post(), json!({"comments": {"id": 1}})).unwrap();

        assert_eq!(ast.joins.len(), 1);
        let binding = &ast.joins["post_comments"];
        assert_eq!(binding.path, vec!["comments".to_string()]);
        assert_eq!(binding.target, comment());

        assert_eq!(
            ast.predicates,
            vec![Predicate::Eq(
                ColumnRef::new("post_comments", "id"),
                Operand::Value(Scalar::from(1))
            )]
        );
    }

    #[test]
    fn test_nested_association_recursion() {
        let ast = compile_json(
            post(),
            json!({"comments": {"user": {"name": "billy"}, "body": "ok"}}),
        )
        .unwrap();

        let aliases: Vec<_> = ast.joins.keys().cloned().collect();
        assert_eq!(aliases, vec!["post_comments", "post_comments_user"]);
        assert_eq!(
            ast.joins["post_comments_user"].path,
            vec!["comments".to_string(), "user".to_string()]
        );

        assert_eq!(
            ast.predicates,
            vec![
                Predicate::Eq(
                    ColumnRef::new("post_comments_user", "name"),
                    Operand::Value(Scalar::from("billy"))
                ),
                Predicate::Eq(
                    ColumnRef::new("post_comments", "body"),
                    Operand::Value(Scalar::from("ok"))
                ),
            ]
        );
    }

    #[test]
    fn test_same_path_twice_binds_one_join() {
        let ast = compile_json(
            post(),
            json!({
                "comments": {"body": "a"},
                "author": {"name": "billy"},
            }),
        )
        .unwrap();
        // Reach `comments` again through a second clause list compile to make
        // sure the dedupe is by path, not by clause identity.
        let params = FilterParams::from(vec![
            FilterClause::new(
                "comments",
                FilterValue::Map(IndexMap::from_iter([(
                    "body".to_string(),
                    FilterValue::from("a"),
                )])),
            ),
            FilterClause::new(
                "comments",
                FilterValue::Map(IndexMap::from_iter([(
                    "id".to_string(),
                    FilterValue::from(9),
                )])),
            ),
        ]);
        let twice = QueryCompiler::new().compile(post(), params).unwrap();

        assert_eq!(ast.joins.len(), 2);
        assert_eq!(twice.joins.len(), 1);
        assert_eq!(twice.predicates.len(), 2);
    }

    #[test]
    fn test_through_association_registers_each_hop() {
        let ast = compile_json(post(), json!({"commenters": {"name": "billy"}})).unwrap();

        let aliases: Vec<_> = ast.joins.keys().cloned().collect();
        assert_eq!(aliases, vec!["post_comments", "post_comments_user"]);
        assert_eq!(
            ast.predicates,
            vec![Predicate::Eq(
                ColumnRef::new("post_comments_user", "name"),
                Operand::Value(Scalar::from("billy"))
            )]
        );
    }

    #[test]
    fn test_association_filter_must_be_a_map() {
        let err = compile_json(post(), json!({"comments": 1})).unwrap_err();
        assert!(
            matches!(err, CompileError::InvalidFilter { field, .. } if field == "comments")
        );
    }

    #[test]
    fn test_direct_null_comparison_is_fatal() {
        let err = compile_json(post(), json!({"age": null})).unwrap_err();
        assert!(matches!(err, CompileError::InvalidFilter { field, .. } if field == "age"));
    }

    #[test]
    fn test_ne_null_compiles_to_not_null() {
        let ast = compile_json(post(), json!({"age": {"ne": null}})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::NotNull(ColumnRef::new("post", "age"))]
        );
    }

    #[test]
    fn test_array_field_duality() {
        let ast = compile_json(comment(), json!({"tags": "x"})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::ArrayContains(
                ColumnRef::new("comment", "tags"),
                Scalar::from("x")
            )]
        );

        let ast = compile_json(comment(), json!({"tags": ["x", "y"]})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::Eq(
                ColumnRef::new("comment", "tags"),
                Operand::List(vec![Scalar::from("x"), Scalar::from("y")])
            )]
        );
    }

    #[test]
    fn test_unknown_key_skipped_in_lax_mode() {
        let ast = compile_json(post(), json!({"shoe_size": 9, "title": "hello"})).unwrap();
        assert_eq!(ast.predicates.len(), 1);
    }

    #[test]
    fn test_unknown_key_fatal_in_strict_mode() {
        let err = QueryCompiler::strict()
            .compile(
                post(),
                FilterParams::from_json(&json!({"shoe_size": 9})).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownField { field, .. } if field == "shoe_size"));
    }

    #[test]
    fn test_predicate_set_is_order_insensitive() {
        let forward = compile_json(post(), json!({"title": "hello", "age": {"gte": 3}})).unwrap();
        let backward = compile_json(post(), json!({"age": {"gte": 3}, "title": "hello"})).unwrap();

        let mut forward_set = forward.predicates.clone();
        let mut backward_set = backward.predicates.clone();
        forward_set.sort_by_key(|p| format!("{p:?}"));
        backward_set.sort_by_key(|p| format!("{p:?}"));
        assert_eq!(forward_set, backward_set);
    }

    #[test]
    fn test_last_runs_after_everything_else() {
        // `last` first in the input; the normalizer must still compile it
        // against the fully-filtered query.
        let ast = compile_json(post(), json!({"last": 5, "title": "hello"})).unwrap();

        let inner = ast.subquery_wrap.as_deref().unwrap();
        assert_eq!(inner.limit, Some(5));
        assert_eq!(
            inner.order_by,
            vec![(ColumnRef::new("post", "id"), SortDirection::Desc)]
        );
        assert_eq!(
            inner.predicates,
            vec![Predicate::Eq(
                ColumnRef::new("post", "title"),
                Operand::Value(Scalar::from("hello"))
            )]
        );

        assert!(ast.predicates.is_empty());
        assert_eq!(ast.limit, None);
        assert_eq!(
            ast.order_by,
            vec![(ColumnRef::new("post", "id"), SortDirection::Asc)]
        );
    }

    #[test]
    fn test_last_n_selects_the_tail_in_ascending_order() {
        // Simulate execution over ids 1..=12 and check the trick against
        // reverse(take(5, sort_desc(rows))).
        let rows: Vec<i64> = (1..=12).collect();
        let ast = compile_json(post(), json!({"last": 5})).unwrap();

        let inner = ast.subquery_wrap.as_deref().unwrap();
        let mut inner_rows = rows.clone();
        match inner.order_by.as_slice() {
            [(col, SortDirection::Desc)] if col.field == "id" => {
                inner_rows.sort_by(|a, b| b.cmp(a))
            }
            other => panic!("unexpected inner ordering {other:?}"),
        }
        inner_rows.truncate(inner.limit.unwrap() as usize);

        let mut outer_rows = inner_rows;
        match ast.order_by.as_slice() {
            [(col, SortDirection::Asc)] if col.field == "id" => outer_rows.sort(),
            other => panic!("unexpected outer ordering {other:?}"),
        }

        assert_eq!(outer_rows, vec![8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_common_filter_mix() {
        let ast = compile_json(
            post(),
            json!({
                "title": "hello",
                "after": 10,
                "limit": 20,
                "offset": 40,
                "order_by": {"direction": "desc", "field": "age"},
                "preload": ["comments", "author"],
            }),
        )
        .unwrap();

        assert_eq!(ast.limit, Some(20));
        assert_eq!(ast.offset, Some(40));
        assert_eq!(ast.preload, vec!["comments", "author"]);
        assert_eq!(
            ast.order_by,
            vec![(ColumnRef::new("post", "age"), SortDirection::Desc)]
        );
        assert_eq!(ast.predicates.len(), 2);
    }

    #[test]
    fn test_common_filters_apply_inside_association_alias() {
        let ast = compile_json(post(), json!({"comments": {"ids": [1, 2]}})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::In(
                ColumnRef::new("post_comments", "id"),
                vec![Scalar::from(1), Scalar::from(2)]
            )]
        );
    }

    #[test]
    fn test_query_shape_filter_rejected_inside_association() {
        let err = compile_json(post(), json!({"comments": {"limit": 5}})).unwrap_err();
        assert!(matches!(err, CompileError::InvalidFilter { field, .. } if field == "limit"));
    }

    #[test]
    fn test_compile_field_ad_hoc() {
        let compiler = QueryCompiler::new();
        let preds = compiler
            .compile_field(
                post(),
                "age",
                &FilterValue::Map(IndexMap::from_iter([(
                    "gte".to_string(),
                    FilterValue::from(3),
                )])),
            )
            .unwrap();
        assert_eq!(
            preds,
            vec![Predicate::Gte(ColumnRef::new("post", "age"), Scalar::from(3))]
        );

        let err = compiler
            .compile_field(post(), "shoe_size", &FilterValue::from(1))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownField { .. }));
    }

    #[test]
    fn test_compile_assoc_ids_requires_to_many() {
        let compiler = QueryCompiler::new();

        let ast = compiler
            .compile_assoc_ids(post(), "comments", vec![Scalar::from(1), Scalar::from(2)])
            .unwrap();
        assert_eq!(ast.base, comment());
        assert_eq!(
            ast.predicates,
            vec![Predicate::In(
                ColumnRef::new("comment", "id"),
                vec![Scalar::from(1), Scalar::from(2)]
            )]
        );

        let err = compiler
            .compile_assoc_ids(post(), "author", vec![Scalar::from(1)])
            .unwrap_err();
        assert!(
            matches!(err, CompileError::AssociationCardinality { association } if association == "author")
        );
    }

    #[test]
    fn test_search_hook_via_full_pipeline() {
        let ast = compile_json(post(), json!({"search": "oct"})).unwrap();
        assert_eq!(
            ast.predicates,
            vec![Predicate::ILike(
                ColumnRef::new("post", "title"),
                "%oct%".to_string()
            )]
        );

        // No hook on users: the clause is a logged no-op, never an error.
        let ast = compile_json(user(), json!({"search": "oct", "name": "billy"})).unwrap();
        assert_eq!(ast.predicates.len(), 1);
    }

    #[test]
    fn test_last_clause_key_constant_matches_normalizer() {
        assert!(QueryCompiler::new()
            .common_filters()
            .contains(LAST_FILTER));
    }
}
