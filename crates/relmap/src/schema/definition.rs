use crate::{
    entity::{Entity, EntityKey},
    schema::{
        Attribute, AttributeKind, ColumnDefinition, DenormalizedDefinition, DerivedDefinition,
        EntityType, ForeignKey, ForeignKeyReference, SchemaError,
    },
    value::{Value, ValueType},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct DefinitionInner {
    entity_type: EntityType,
    attributes: Vec<Attribute>,
    by_name: HashMap<String, usize>,
    primary_key: Vec<Attribute>,
    foreign_keys: Vec<ForeignKey>,
    fk_by_name: HashMap<String, usize>,
    // attribute indexes of denormalized attributes, grouped by foreign key
    denormalized_by_fk: HashMap<String, Vec<usize>>,
    // foreign key indexes touching a given column, for cache invalidation
    fks_by_column: HashMap<String, Vec<usize>>,
}

///
/// EntityDefinition
///
/// Immutable description of one entity type: ordered attributes, primary
/// key composition, and foreign keys. Acts as the factory for empty
/// entities and keys of its type.
///

#[derive(Clone)]
pub struct EntityDefinition(Arc<DefinitionInner>);

impl EntityDefinition {
    #[must_use]
    pub fn builder(name: &str) -> EntityDefinitionBuilder {
        EntityDefinitionBuilder {
            entity_type: EntityType::new(name),
            columns: Vec::new(),
            derived: Vec::new(),
            denormalized: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.0.entity_type
    }

    /// All attributes in declaration order (columns first, then derived
    /// and denormalized, as declared).
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.0.attributes
    }

    pub fn attribute(&self, name: &str) -> Result<&Attribute, SchemaError> {
        self.0
            .by_name
            .get(name)
            .map(|&i| &self.0.attributes[i])
            .ok_or_else(|| SchemaError::UndefinedAttribute {
                entity_type: self.0.entity_type.to_string(),
                attribute: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains_attribute(&self, name: &str) -> bool {
        self.0.by_name.contains_key(name)
    }

    /// Primary key attributes in key order.
    #[must_use]
    pub fn primary_key(&self) -> &[Attribute] {
        &self.0.primary_key
    }

    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.0.foreign_keys
    }

    pub fn foreign_key(&self, name: &str) -> Result<&ForeignKey, SchemaError> {
        self.0
            .fk_by_name
            .get(name)
            .map(|&i| &self.0.foreign_keys[i])
            .ok_or_else(|| SchemaError::UndefinedForeignKey {
                entity_type: self.0.entity_type.to_string(),
                foreign_key: name.to_string(),
            })
    }

    /// Denormalized attributes sourced through the given foreign key.
    pub(crate) fn denormalized_for(&self, foreign_key: &str) -> impl Iterator<Item = &Attribute> {
        self.0
            .denormalized_by_fk
            .get(foreign_key)
            .into_iter()
            .flatten()
            .map(|&i| &self.0.attributes[i])
    }

    /// Foreign keys whose underlying columns include the given column.
    pub(crate) fn foreign_keys_containing(&self, column: &str) -> impl Iterator<Item = &ForeignKey> {
        self.0
            .fks_by_column
            .get(column)
            .into_iter()
            .flatten()
            .map(|&i| &self.0.foreign_keys[i])
    }

    /// Create an empty entity of this type.
    #[must_use]
    pub fn entity(&self) -> Entity {
        Entity::new(self.clone())
    }

    /// Create an empty key of this type.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.clone())
    }
}

impl fmt::Debug for EntityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityDefinition({})", self.0.entity_type)
    }
}

impl PartialEq for EntityDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.0.entity_type == other.0.entity_type
    }
}

impl Eq for EntityDefinition {}

struct DerivedSpec {
    name: String,
    value_type: ValueType,
    sources: Vec<String>,
    provider: Arc<dyn Fn(&[Option<Value>]) -> Option<Value> + Send + Sync>,
}

struct DenormalizedSpec {
    name: String,
    value_type: ValueType,
    foreign_key: String,
    source: String,
}

struct ForeignKeySpec {
    name: String,
    referenced_type: EntityType,
    references: Vec<ForeignKeyReference>,
    soft: bool,
}

///
/// EntityDefinitionBuilder
///
/// Fails fast: every structural invariant is checked in `build`, before
/// the definition can reach a registry or an entity.
///

pub struct EntityDefinitionBuilder {
    entity_type: EntityType,
    columns: Vec<ColumnDefinition>,
    derived: Vec<DerivedSpec>,
    denormalized: Vec<DenormalizedSpec>,
    foreign_keys: Vec<ForeignKeySpec>,
}

impl EntityDefinitionBuilder {
    #[must_use]
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn derived(
        mut self,
        name: &str,
        value_type: ValueType,
        sources: &[&str],
        provider: impl Fn(&[Option<Value>]) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.derived.push(DerivedSpec {
            name: name.to_string(),
            value_type,
            sources: sources.iter().map(ToString::to_string).collect(),
            provider: Arc::new(provider),
        });
        self
    }

    #[must_use]
    pub fn denormalized(
        mut self,
        name: &str,
        value_type: ValueType,
        foreign_key: &str,
        source: &str,
    ) -> Self {
        self.denormalized.push(DenormalizedSpec {
            name: name.to_string(),
            value_type,
            foreign_key: foreign_key.to_string(),
            source: source.to_string(),
        });
        self
    }

    #[must_use]
    pub fn foreign_key(self, name: &str, referenced: &str, references: &[(&str, &str)]) -> Self {
        self.foreign_key_inner(name, referenced, references, false)
    }

    /// A soft foreign key resolves like any other but is skipped by
    /// dependency scans.
    #[must_use]
    pub fn soft_foreign_key(
        self,
        name: &str,
        referenced: &str,
        references: &[(&str, &str)],
    ) -> Self {
        self.foreign_key_inner(name, referenced, references, true)
    }

    fn foreign_key_inner(
        mut self,
        name: &str,
        referenced: &str,
        references: &[(&str, &str)],
        soft: bool,
    ) -> Self {
        self.foreign_keys.push(ForeignKeySpec {
            name: name.to_string(),
            referenced_type: EntityType::new(referenced),
            references: references
                .iter()
                .map(|(column, referenced)| ForeignKeyReference {
                    column: (*column).to_string(),
                    referenced: (*referenced).to_string(),
                })
                .collect(),
            soft,
        });
        self
    }

    pub fn build(self) -> Result<EntityDefinition, SchemaError> {
        let entity_type = self.entity_type;

        let mut attributes = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        let mut insert_name = |name: &str, index: usize, by_name: &mut HashMap<String, usize>| {
            if by_name.insert(name.to_string(), index).is_some() {
                Err(SchemaError::DuplicateAttribute {
                    entity_type: entity_type.to_string(),
                    attribute: name.to_string(),
                })
            } else {
                Ok(())
            }
        };

        for column in &self.columns {
            let attribute = Attribute::new(
                entity_type.clone(),
                column.name.clone(),
                column.value_type,
                AttributeKind::Column,
                column.nullable,
                column.updatable,
                column.primary_key_index,
                column.max_length,
                column.range,
            );
            insert_name(&column.name, attributes.len(), &mut by_name)?;
            attributes.push(attribute);
        }

        for spec in &self.denormalized {
            let attribute = Attribute::new(
                entity_type.clone(),
                spec.name.clone(),
                spec.value_type,
                AttributeKind::Denormalized(DenormalizedDefinition {
                    foreign_key: spec.foreign_key.clone(),
                    source: spec.source.clone(),
                }),
                true,
                false,
                None,
                None,
                None,
            );
            insert_name(&spec.name, attributes.len(), &mut by_name)?;
            attributes.push(attribute);
        }

        for spec in &self.derived {
            let attribute = Attribute::new(
                entity_type.clone(),
                spec.name.clone(),
                spec.value_type,
                AttributeKind::Derived(DerivedDefinition {
                    sources: spec.sources.clone(),
                    provider: spec.provider.clone(),
                }),
                true,
                false,
                None,
                None,
                None,
            );
            insert_name(&spec.name, attributes.len(), &mut by_name)?;
            attributes.push(attribute);
        }

        // Derived sources must name existing, non-derived attributes.
        for spec in &self.derived {
            for source in &spec.sources {
                let index =
                    *by_name
                        .get(source)
                        .ok_or_else(|| SchemaError::UndefinedAttribute {
                            entity_type: entity_type.to_string(),
                            attribute: source.clone(),
                        })?;
                if attributes[index].is_derived() {
                    return Err(SchemaError::NotAColumn {
                        entity_type: entity_type.to_string(),
                        attribute: source.clone(),
                    });
                }
            }
        }

        // Primary key: contiguous indexes from zero, columns only.
        let mut keyed: Vec<&Attribute> = attributes
            .iter()
            .filter(|a| a.is_primary_key())
            .collect();
        if keyed.is_empty() {
            return Err(SchemaError::MissingPrimaryKey {
                entity_type: entity_type.to_string(),
            });
        }
        keyed.sort_by_key(|a| a.primary_key_index());
        let contiguous = keyed
            .iter()
            .enumerate()
            .all(|(i, a)| a.primary_key_index() == Some(i));
        if !contiguous {
            return Err(SchemaError::InvalidPrimaryKey {
                entity_type: entity_type.to_string(),
            });
        }
        let primary_key: Vec<Attribute> = keyed.into_iter().cloned().collect();

        // Foreign keys: underlying columns must exist as columns; the
        // referenced side is validated when the registry is built.
        let mut foreign_keys = Vec::new();
        let mut fk_by_name: HashMap<String, usize> = HashMap::new();
        let mut fks_by_column: HashMap<String, Vec<usize>> = HashMap::new();

        for spec in self.foreign_keys {
            if by_name.contains_key(&spec.name) || fk_by_name.contains_key(&spec.name) {
                return Err(SchemaError::DuplicateAttribute {
                    entity_type: entity_type.to_string(),
                    attribute: spec.name,
                });
            }
            for reference in &spec.references {
                let index = *by_name.get(&reference.column).ok_or_else(|| {
                    SchemaError::UndefinedAttribute {
                        entity_type: entity_type.to_string(),
                        attribute: reference.column.clone(),
                    }
                })?;
                if !attributes[index].is_column() {
                    return Err(SchemaError::NotAColumn {
                        entity_type: entity_type.to_string(),
                        attribute: reference.column.clone(),
                    });
                }
            }

            let index = foreign_keys.len();
            for reference in &spec.references {
                fks_by_column
                    .entry(reference.column.clone())
                    .or_default()
                    .push(index);
            }
            fk_by_name.insert(spec.name.clone(), index);
            foreign_keys.push(ForeignKey::new(
                entity_type.clone(),
                spec.name,
                spec.references,
                spec.referenced_type,
                spec.soft,
            ));
        }

        // Denormalized attributes must name a foreign key of this type;
        // their source attribute is validated against the referenced type
        // by the registry.
        let mut denormalized_by_fk: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, attribute) in attributes.iter().enumerate() {
            if let AttributeKind::Denormalized(denormalized) = attribute.kind() {
                if !fk_by_name.contains_key(&denormalized.foreign_key) {
                    return Err(SchemaError::UndefinedForeignKey {
                        entity_type: entity_type.to_string(),
                        foreign_key: denormalized.foreign_key.clone(),
                    });
                }
                denormalized_by_fk
                    .entry(denormalized.foreign_key.clone())
                    .or_default()
                    .push(index);
            }
        }

        Ok(EntityDefinition(Arc::new(DefinitionInner {
            entity_type,
            attributes,
            by_name,
            primary_key,
            foreign_keys,
            fk_by_name,
            denormalized_by_fk,
            fks_by_column,
        })))
    }
}

///
/// TESTS
///
