//! Declarative filter-to-query compiler.
//!
//! Takes a nested, loosely-typed filter structure (field names and values,
//! possibly nested through relations) and compiles it into a [`QueryAst`]
//! that an execution layer can turn into SQL. The pipeline is a pure fold:
//! normalize the params into an ordered clause list, then route each clause
//! to the comparison compiler, a common-filter handler, or the recursive
//! association compiler.
//!
//! ```
//! use filter_dispatcher::{FilterParams, QueryCompiler};
//! use filter_dispatcher::schema::EntityRef;
//! use serde_json::json;
//!
//! fn compile(entity: EntityRef) -> filter_dispatcher::CompileResult<()> {
//!     let params = FilterParams::from_json(&json!({
//!         "title": {"ilike": "release"},
//!         "comments": {"tags": "bug"},
//!         "order_by": {"direction": "desc", "field": "id"},
//!         "limit": 20,
//!     }))?;
//!     let ast = QueryCompiler::new().compile(entity, params)?;
//!     assert_eq!(ast.joins.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod ast;
pub mod common_filters;
pub mod comparison;
pub mod compiler;
pub mod error;
pub mod filter;
pub mod schema;

pub use ast::{ColumnRef, JoinBinding, Operand, Predicate, QueryAst, SortDirection};
pub use common_filters::{CommonFilterSet, FilterContext, FilterHandler};
pub use comparison::{compile_comparison, Operator};
pub use compiler::{CompilerConfig, QueryCompiler};
pub use error::{CompileError, CompileResult};
pub use filter::{normalize, CaseFold, FilterClause, FilterParams, FilterValue, Scalar};
pub use schema::{
    AssociationDescriptor, Cardinality, EntityRef, SchemaDescriptor, SearchHook, TypeTag,
};
