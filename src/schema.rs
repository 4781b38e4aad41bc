//! Schema descriptor capability consumed by the compiler.
//!
//! The compiler never reflects over anything at runtime: each entity type
//! implements [`SchemaDescriptor`] on a unit struct, and the compiler reads
//! field names, field types and the association map through an [`EntityRef`]
//! handle. Association maps are built on demand so cyclic entity graphs
//! (post → comments → post) need no initialization order.

use crate::ast::QueryAst;
use crate::filter::FilterValue;
use indexmap::IndexMap;
use std::fmt;

/// Column type tag. Only the array/scalar distinction changes how a
/// comparison compiles; the rest is carried for execution layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Id,
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Array(&'static TypeTag),
}

impl TypeTag {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

/// Association cardinality as seen from the owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// One named association hop from an entity to a target entity.
///
/// A `through` association is transitive: `through` lists the chain of
/// association names to walk, in order, ending at `target`.
#[derive(Debug, Clone)]
pub struct AssociationDescriptor {
    pub target: EntityRef,
    pub cardinality: Cardinality,
    pub through: Option<Vec<&'static str>>,
}

impl AssociationDescriptor {
    pub fn one(target: EntityRef) -> Self {
        Self {
            target,
            cardinality: Cardinality::One,
            through: None,
        }
    }

    pub fn many(target: EntityRef) -> Self {
        Self {
            target,
            cardinality: Cardinality::Many,
            through: None,
        }
    }

    pub fn through(target: EntityRef, cardinality: Cardinality, chain: Vec<&'static str>) -> Self {
        Self {
            target,
            cardinality,
            through: Some(chain),
        }
    }
}

/// Free-text search extension point. The hook receives the accumulator and
/// the raw `search` filter value and returns the extended accumulator.
pub type SearchHook = fn(QueryAst, &FilterValue) -> QueryAst;

/// Static metadata for one queryable entity.
pub trait SchemaDescriptor: Send + Sync {
    /// Table (relation) name, e.g. `posts`.
    fn source_name(&self) -> &'static str;

    /// Root alias used to qualify columns of this entity in a compiled
    /// query, e.g. `post`. Join aliases are derived from it.
    fn entity_alias(&self) -> &'static str;

    fn fields(&self) -> &'static [&'static str];

    fn field_type(&self, field: &str) -> Option<TypeTag>;

    fn associations(&self) -> IndexMap<&'static str, AssociationDescriptor> {
        IndexMap::new()
    }

    fn search_hook(&self) -> Option<SearchHook> {
        None
    }
}

/// Cheap copyable handle to an entity's schema descriptor.
#[derive(Clone, Copy)]
pub struct EntityRef(&'static dyn SchemaDescriptor);

impl EntityRef {
    pub fn new(descriptor: &'static dyn SchemaDescriptor) -> Self {
        Self(descriptor)
    }

    pub fn source_name(&self) -> &'static str {
        self.0.source_name()
    }

    pub fn entity_alias(&self) -> &'static str {
        self.0.entity_alias()
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.0.fields()
    }

    pub fn field_type(&self, field: &str) -> Option<TypeTag> {
        self.0.field_type(field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.field_type(field).is_some()
    }

    pub fn associations(&self) -> IndexMap<&'static str, AssociationDescriptor> {
        self.0.associations()
    }

    pub fn association(&self, name: &str) -> Option<AssociationDescriptor> {
        self.0.associations().shift_remove(name)
    }

    pub fn search_hook(&self) -> Option<SearchHook> {
        self.0.search_hook()
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.source_name()).finish()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            self.0 as *const dyn SchemaDescriptor as *const (),
            other.0 as *const dyn SchemaDescriptor as *const (),
        )
    }
}

impl Eq for EntityRef {}


#[cfg(test)]
mod tests {
    use super::fixtures::{comment, post};
    use super::*;

    #[test]
    fn test_entity_ref_identity() {
        assert_eq!(post(), post());
        assert_ne!(post(), comment());
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(post().field_type("title"), Some(TypeTag::Text));
        assert_eq!(post().field_type("missing"), None);
        assert!(comment().field_type("tags").unwrap().is_array());
    }

    #[test]
    fn test_association_lookup() {
        let assoc = post().association("comments").unwrap();
        assert_eq!(assoc.target, comment());
        assert_eq!(assoc.cardinality, Cardinality::Many);

        let through = post().association("commenters").unwrap();
        assert_eq!(through.through, Some(vec!["comments", "user"]));
    }
}
