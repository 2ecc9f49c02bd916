use crate::{
    entity::{Entity, EntityKey},
    schema::{AttributeKind, EntityDefinition, EntityType, SchemaError},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct EntitiesInner {
    definitions: Vec<EntityDefinition>,
    by_name: HashMap<String, usize>,
}

///
/// Entities
///
/// Registry of entity definitions forming one schema domain. Building the
/// registry resolves every foreign key to its referenced definition and
/// validates the cross-entity references a single definition cannot check
/// on its own.
///

#[derive(Clone)]
pub struct Entities(Arc<EntitiesInner>);

impl Entities {
    #[must_use]
    pub fn builder() -> EntitiesBuilder {
        EntitiesBuilder {
            definitions: Vec::new(),
        }
    }

    #[must_use]
    pub fn definitions(&self) -> &[EntityDefinition] {
        &self.0.definitions
    }

    pub fn definition(&self, entity_type: &EntityType) -> Result<&EntityDefinition, SchemaError> {
        self.0
            .by_name
            .get(entity_type.name())
            .map(|&i| &self.0.definitions[i])
            .ok_or_else(|| SchemaError::UndefinedEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.0.by_name.contains_key(entity_type.name())
    }

    /// Create an empty entity of the given type.
    pub fn entity(&self, entity_type: &EntityType) -> Result<Entity, SchemaError> {
        Ok(self.definition(entity_type)?.entity())
    }

    /// Create an empty key of the given type.
    pub fn key(&self, entity_type: &EntityType) -> Result<EntityKey, SchemaError> {
        Ok(self.definition(entity_type)?.key())
    }
}

impl fmt::Debug for Entities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.definitions.iter().map(EntityDefinition::entity_type))
            .finish()
    }
}

///
/// EntitiesBuilder
///

pub struct EntitiesBuilder {
    definitions: Vec<EntityDefinition>,
}

impl EntitiesBuilder {
    #[must_use]
    pub fn define(mut self, definition: EntityDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> Result<Entities, SchemaError> {
        let mut by_name = HashMap::new();
        for (index, definition) in self.definitions.iter().enumerate() {
            let name = definition.entity_type().name().to_string();
            if by_name.insert(name, index).is_some() {
                return Err(SchemaError::DuplicateEntityType {
                    entity_type: definition.entity_type().to_string(),
                });
            }
        }

        // Resolve and validate foreign keys against referenced types.
        for definition in &self.definitions {
            for foreign_key in definition.foreign_keys() {
                let referenced = by_name
                    .get(foreign_key.referenced_type().name())
                    .map(|&i| &self.definitions[i])
                    .ok_or_else(|| SchemaError::UndefinedEntityType {
                        entity_type: foreign_key.referenced_type().to_string(),
                    })?;

                for reference in foreign_key.references() {
                    let attribute = referenced.attribute(&reference.referenced)?;
                    if !attribute.is_column() {
                        return Err(SchemaError::NotAColumn {
                            entity_type: referenced.entity_type().to_string(),
                            attribute: reference.referenced.clone(),
                        });
                    }
                }

                foreign_key.resolve(referenced.clone());
            }

            // Denormalized sources must exist on the referenced type.
            for attribute in definition.attributes() {
                if let AttributeKind::Denormalized(denormalized) = attribute.kind() {
                    let foreign_key = definition.foreign_key(&denormalized.foreign_key)?;
                    let referenced = by_name
                        .get(foreign_key.referenced_type().name())
                        .map(|&i| &self.definitions[i])
                        .ok_or_else(|| SchemaError::UndefinedEntityType {
                            entity_type: foreign_key.referenced_type().to_string(),
                        })?;
                    referenced.attribute(&denormalized.source)?;
                }
            }
        }

        Ok(Entities(Arc::new(EntitiesInner {
            definitions: self.definitions,
            by_name,
        })))
    }
}

///
/// TESTS
///
