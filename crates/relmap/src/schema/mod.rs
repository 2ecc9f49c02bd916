//! Schema vocabulary: entity types, attributes, foreign keys, and the
//! registry that resolves cross-entity references.
//!
//! Definitions are immutable once built; builders validate eagerly so an
//! invalid schema never reaches the entity or connection layers.

mod attribute;
mod definition;
mod registry;

use derive_more::Display;
use std::sync::Arc;
use thiserror::Error as ThisError;

// re-exports
pub use attribute::{
    Attribute, AttributeKind, ColumnDefinition, DenormalizedDefinition, DerivedDefinition,
    DerivedProvider, ForeignKey, ForeignKeyReference,
};
pub use definition::{EntityDefinition, EntityDefinitionBuilder};
pub use registry::{Entities, EntitiesBuilder};

///
/// SchemaError
///
/// Raised while building definitions or the registry; never during normal
/// entity or connection operation on a valid schema.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("duplicate attribute '{attribute}' on entity type '{entity_type}'")]
    DuplicateAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("attribute '{attribute}' is not defined for entity type '{entity_type}'")]
    UndefinedAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("foreign key '{foreign_key}' is not defined for entity type '{entity_type}'")]
    UndefinedForeignKey {
        entity_type: String,
        foreign_key: String,
    },

    #[error("entity type '{entity_type}' is not defined")]
    UndefinedEntityType { entity_type: String },

    #[error("entity type '{entity_type}' is already defined")]
    DuplicateEntityType { entity_type: String },

    #[error("entity type '{entity_type}' has no primary key")]
    MissingPrimaryKey { entity_type: String },

    #[error("primary key indexes of entity type '{entity_type}' must be contiguous from zero")]
    InvalidPrimaryKey { entity_type: String },

    #[error("'{attribute}' on entity type '{entity_type}' is not a column")]
    NotAColumn {
        entity_type: String,
        attribute: String,
    },
}

///
/// EntityType
///
/// Cheap-clone interned name handle identifying one entity type.
/// Attributes, keys, and conditions of different entity types never
/// compare equal, so the type name is the identity everywhere.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{_0}")]
pub struct EntityType(Arc<str>);

impl EntityType {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

///
/// TESTS
///
