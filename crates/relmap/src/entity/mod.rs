//! Entity value maps: typed per-attribute storage with modification
//! tracking, foreign key resolution, and derived value computation.
//!
//! An [`Entity`] distinguishes three states per attribute: unset (never
//! written), explicitly null, and present. Modification tracking keeps the
//! original value of every diverged attribute so updates can be built from
//! exactly what changed and reverted without another round trip.

mod key;

pub use key::EntityKey;

use crate::{
    schema::{Attribute, AttributeKind, EntityDefinition, EntityType, ForeignKey, SchemaError},
    value::{Slot, Value, ValueType},
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error as ThisError;

///
/// EntityError
///

#[derive(Debug, ThisError)]
pub enum EntityError {
    #[error("attribute '{attribute}' is not defined for entity type '{entity_type}'")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("type mismatch for attribute '{attribute}': expected {expected}, found {found}")]
    TypeMismatch {
        attribute: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("attribute '{attribute}' is read-only and cannot be written directly")]
    IllegalWrite { attribute: String },

    #[error("foreign key '{foreign_key}' references entity type '{expected}', found '{found}'")]
    WrongReferencedType {
        foreign_key: String,
        expected: String,
        found: String,
    },

    #[error("foreign key '{foreign_key}' is unresolved; build the entity registry first")]
    UnresolvedForeignKey { foreign_key: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

///
/// Entity
///
/// One row-in-memory of a single entity type: a value map over the type's
/// attributes plus the original value of every attribute that has diverged
/// since the entity was last saved. Cloning is a deep copy; clones track
/// modification independently.
///

#[derive(Clone, Debug)]
pub struct Entity {
    definition: EntityDefinition,
    values: BTreeMap<String, Slot>,
    originals: BTreeMap<String, Slot>,
    // Resolved referenced entities, keyed by foreign key name. Lazily
    // populated, invalidated whenever an underlying column changes.
    references: RefCell<HashMap<String, Entity>>,
}

impl Entity {
    pub(crate) fn new(definition: EntityDefinition) -> Self {
        Self {
            definition,
            values: BTreeMap::new(),
            originals: BTreeMap::new(),
            references: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        self.definition.entity_type()
    }

    #[must_use]
    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn own_attribute(&self, attribute: &Attribute) -> Result<(), EntityError> {
        let known = attribute.entity_type() == self.definition.entity_type()
            && self.definition.contains_attribute(attribute.name());
        if known {
            Ok(())
        } else {
            Err(EntityError::UnknownAttribute {
                entity_type: self.definition.entity_type().to_string(),
                attribute: attribute.name().to_string(),
            })
        }
    }

    fn check_type(attribute: &Attribute, value: &Value) -> Result<(), EntityError> {
        let found = value.value_type();
        if found == attribute.value_type() {
            Ok(())
        } else {
            Err(EntityError::TypeMismatch {
                attribute: attribute.name().to_string(),
                expected: attribute.value_type(),
                found,
            })
        }
    }

    /// Current value of an attribute. Stored attributes read from the value
    /// map; derived attributes are computed on demand from the current
    /// values of their sources and never stored.
    pub fn get(&self, attribute: &Attribute) -> Result<Option<Value>, EntityError> {
        self.own_attribute(attribute)?;

        if let AttributeKind::Derived(derived) = attribute.kind() {
            let sources: Vec<Option<Value>> = derived
                .sources
                .iter()
                .map(|source| self.values.get(source).and_then(Slot::as_option).cloned())
                .collect();

            return Ok((derived.provider)(&sources));
        }

        Ok(self
            .values
            .get(attribute.name())
            .and_then(Slot::as_option)
            .cloned())
    }

    /// Whether the attribute has been set at all, null included.
    pub fn contains(&self, attribute: &Attribute) -> Result<bool, EntityError> {
        self.own_attribute(attribute)?;

        Ok(self.values.contains_key(attribute.name()))
    }

    /// Set a column value; `None` stores an explicit null. Overwriting a
    /// present value with a different one records the previous value as the
    /// original; writing the original value back clears the divergence.
    /// Derived and denormalized attributes reject direct writes.
    pub fn put(
        &mut self,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> Result<Option<Value>, EntityError> {
        self.own_attribute(attribute)?;
        if !attribute.is_column() {
            return Err(EntityError::IllegalWrite {
                attribute: attribute.name().to_string(),
            });
        }
        if let Some(value) = &value {
            Self::check_type(attribute, value)?;
        }

        let previous = self.set_current(attribute.name(), Slot::from_option(value));
        self.invalidate_references(attribute.name());

        Ok(previous.and_then(Slot::into_option))
    }

    /// Unset an attribute entirely, divergence record included.
    pub fn remove(&mut self, attribute: &Attribute) -> Result<Option<Value>, EntityError> {
        self.own_attribute(attribute)?;
        if !attribute.is_column() {
            return Err(EntityError::IllegalWrite {
                attribute: attribute.name().to_string(),
            });
        }

        self.originals.remove(attribute.name());
        let previous = self.values.remove(attribute.name());
        self.invalidate_references(attribute.name());

        Ok(previous.and_then(Slot::into_option))
    }

    /// Insert into the value map, recording divergence from the original.
    /// Writing into an unset attribute records nothing, so a freshly
    /// populated entity is unmodified.
    fn set_current(&mut self, name: &str, slot: Slot) -> Option<Slot> {
        let previous = self.values.insert(name.to_string(), slot);

        if let Some(previous) = &previous {
            let current = &self.values[name];
            match self.originals.get(name) {
                Some(original) => {
                    if original == current {
                        self.originals.remove(name);
                    }
                }
                None => {
                    if previous != current {
                        self.originals.insert(name.to_string(), previous.clone());
                    }
                }
            }
        }

        previous
    }

    fn invalidate_references(&mut self, column: &str) {
        let mut cache = self.references.borrow_mut();
        for foreign_key in self.definition.foreign_keys_containing(column) {
            cache.remove(foreign_key.name());
        }
    }

    /// Original value of an attribute: the value it held before the current
    /// divergence, or the current value when unmodified.
    pub fn original(&self, attribute: &Attribute) -> Result<Option<Value>, EntityError> {
        self.own_attribute(attribute)?;

        if let AttributeKind::Derived(derived) = attribute.kind() {
            let sources: Vec<Option<Value>> = derived
                .sources
                .iter()
                .map(|source| self.original_slot(source).and_then(Slot::as_option).cloned())
                .collect();

            return Ok((derived.provider)(&sources));
        }

        Ok(self
            .original_slot(attribute.name())
            .and_then(Slot::as_option)
            .cloned())
    }

    /// Modified iff any non-exempt attribute has diverged from its
    /// original. Non-nullable, non-updatable primary key attributes are
    /// exempt so key population never counts as modification.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.originals.keys().any(|name| {
            self.definition
                .attribute(name)
                .is_ok_and(|attribute| !attribute.exempt_from_modification())
        })
    }

    pub fn is_attribute_modified(&self, attribute: &Attribute) -> Result<bool, EntityError> {
        self.own_attribute(attribute)?;

        Ok(self.originals.contains_key(attribute.name())
            && !attribute.exempt_from_modification())
    }

    /// Accept the current value of one attribute as its new original.
    pub fn save(&mut self, attribute: &Attribute) -> Result<(), EntityError> {
        self.own_attribute(attribute)?;
        self.originals.remove(attribute.name());

        Ok(())
    }

    /// Accept all current values as original; the entity reads unmodified.
    pub fn save_all(&mut self) {
        self.originals.clear();
    }

    /// Restore the original value of one attribute, discarding divergence.
    pub fn revert(&mut self, attribute: &Attribute) -> Result<(), EntityError> {
        self.own_attribute(attribute)?;
        if let Some(original) = self.originals.remove(attribute.name()) {
            self.values.insert(attribute.name().to_string(), original);
            self.invalidate_references(attribute.name());
        }

        Ok(())
    }

    /// Restore every diverged attribute to its original value.
    pub fn revert_all(&mut self) {
        let originals = std::mem::take(&mut self.originals);
        for (name, original) in originals {
            self.values.insert(name.clone(), original);
            self.invalidate_references(&name);
        }
    }

    /// Unset everything, returning the entity to its freshly created state.
    pub fn clear(&mut self) {
        self.values.clear();
        self.originals.clear();
        self.references.borrow_mut().clear();
    }

    /// Unset the primary key attributes, divergence records included.
    pub fn clear_primary_key(&mut self) {
        let names: Vec<String> = self
            .definition
            .primary_key()
            .iter()
            .map(|attribute| attribute.name().to_string())
            .collect();
        for name in names {
            self.values.remove(&name);
            self.originals.remove(&name);
            self.invalidate_references(&name);
        }
    }

    /// Key over the current primary key values.
    #[must_use]
    pub fn primary_key(&self) -> EntityKey {
        let mut key = self.definition.key();
        for attribute in self.definition.primary_key() {
            if let Some(slot) = self.values.get(attribute.name()) {
                key.put_slot(attribute.name(), slot.clone());
            }
        }

        key
    }

    /// Key over the original primary key values, identifying the persisted
    /// row even after the key attributes were changed in memory.
    #[must_use]
    pub fn original_primary_key(&self) -> EntityKey {
        let mut key = self.definition.key();
        for attribute in self.definition.primary_key() {
            if let Some(slot) = self.original_slot(attribute.name()) {
                key.put_slot(attribute.name(), slot.clone());
            }
        }

        key
    }

    fn own_foreign_key(&self, foreign_key: &ForeignKey) -> Result<(), EntityError> {
        if foreign_key.entity_type() == self.definition.entity_type() {
            self.definition.foreign_key(foreign_key.name())?;
            Ok(())
        } else {
            Err(EntityError::UnknownAttribute {
                entity_type: self.definition.entity_type().to_string(),
                attribute: foreign_key.name().to_string(),
            })
        }
    }

    /// Set a foreign key reference: writes the underlying columns from the
    /// referenced entity's key attributes, cascades every denormalized
    /// attribute sourced through this foreign key, and caches the referenced
    /// entity. `None` nulls the columns and the denormalized values.
    pub fn put_referenced(
        &mut self,
        foreign_key: &ForeignKey,
        referenced: Option<Entity>,
    ) -> Result<(), EntityError> {
        self.own_foreign_key(foreign_key)?;

        let denormalized: Vec<(String, String)> = self
            .definition
            .denormalized_for(foreign_key.name())
            .map(|attribute| match attribute.kind() {
                AttributeKind::Denormalized(d) => {
                    (attribute.name().to_string(), d.source.clone())
                }
                _ => unreachable!("denormalized_for yields denormalized attributes"),
            })
            .collect();

        match referenced {
            Some(referenced) => {
                if referenced.entity_type() != foreign_key.referenced_type() {
                    return Err(EntityError::WrongReferencedType {
                        foreign_key: foreign_key.name().to_string(),
                        expected: foreign_key.referenced_type().to_string(),
                        found: referenced.entity_type().to_string(),
                    });
                }

                for reference in foreign_key.references() {
                    let source = referenced.definition.attribute(&reference.referenced)?.clone();
                    let value = referenced.get(&source)?;
                    let own = self.definition.attribute(&reference.column)?.clone();
                    if let Some(value) = &value {
                        Self::check_type(&own, value)?;
                    }
                    self.set_current(&reference.column, Slot::from_option(value));
                    self.invalidate_references(&reference.column);
                }
                for (name, source) in denormalized {
                    let source = referenced.definition.attribute(&source)?.clone();
                    let value = referenced.get(&source)?;
                    self.set_current(&name, Slot::from_option(value));
                }
                self.references
                    .borrow_mut()
                    .insert(foreign_key.name().to_string(), referenced);
            }
            None => {
                for reference in foreign_key.references() {
                    self.set_current(&reference.column, Slot::Null);
                    self.invalidate_references(&reference.column);
                }
                for (name, _) in denormalized {
                    self.set_current(&name, Slot::Null);
                }
                self.references.borrow_mut().remove(foreign_key.name());
            }
        }

        Ok(())
    }

    /// Key of the entity referenced through the foreign key, built from the
    /// current values of the underlying columns. `None` when the reference
    /// is null.
    pub fn referenced_key(
        &self,
        foreign_key: &ForeignKey,
    ) -> Result<Option<EntityKey>, EntityError> {
        self.own_foreign_key(foreign_key)?;
        let definition =
            foreign_key
                .referenced_definition()
                .ok_or_else(|| EntityError::UnresolvedForeignKey {
                    foreign_key: foreign_key.name().to_string(),
                })?;

        let mut key = definition.key();
        for reference in foreign_key.references() {
            if let Some(slot) = self.values.get(&reference.column) {
                key.put_slot(&reference.referenced, slot.clone());
            }
        }
        if key.is_null() {
            return Ok(None);
        }

        Ok(Some(key))
    }

    /// The entity referenced through the foreign key. Returns the cached
    /// resolution when one exists; otherwise builds and caches a stub
    /// populated only with the referenced key attributes.
    pub fn referenced_entity(
        &self,
        foreign_key: &ForeignKey,
    ) -> Result<Option<Entity>, EntityError> {
        self.own_foreign_key(foreign_key)?;

        {
            let cache = self.references.borrow();
            if let Some(cached) = cache.get(foreign_key.name()) {
                return Ok(Some(cached.clone()));
            }
        }

        let Some(key) = self.referenced_key(foreign_key)? else {
            return Ok(None);
        };
        let definition =
            foreign_key
                .referenced_definition()
                .ok_or_else(|| EntityError::UnresolvedForeignKey {
                    foreign_key: foreign_key.name().to_string(),
                })?;

        let mut stub = definition.entity();
        for attribute in definition.primary_key() {
            if let Some(slot) = key.slot(attribute.name()) {
                stub.values.insert(attribute.name().to_string(), slot.clone());
            }
        }
        self.references
            .borrow_mut()
            .insert(foreign_key.name().to_string(), stub.clone());

        Ok(Some(stub))
    }

    /// Drop every cached reference; resolution starts over from the
    /// column values.
    pub(crate) fn clear_references(&self) {
        self.references.borrow_mut().clear();
    }

    /// Cache a resolved reference without touching the value map or the
    /// modification state. Used when references are resolved in bulk.
    pub(crate) fn cache_reference(&self, foreign_key: &ForeignKey, referenced: Entity) {
        self.references
            .borrow_mut()
            .insert(foreign_key.name().to_string(), referenced);
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&Slot> {
        self.values.get(name)
    }

    pub(crate) fn original_slot(&self, name: &str) -> Option<&Slot> {
        self.originals.get(name).or_else(|| self.values.get(name))
    }

    /// Raw insert without divergence tracking or cache invalidation.
    pub(crate) fn put_slot(&mut self, name: &str, slot: Slot) {
        self.values.insert(name.to_string(), slot);
    }

    pub(crate) fn present_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.primary_key())
    }
}

/// Equality is entity type plus current values; modification state and
/// cached references are ignored.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.definition.entity_type() == other.definition.entity_type()
            && self.values == other.values
    }
}

impl Eq for Entity {}

///
/// TESTS
///
