use crate::{
    entity::EntityError,
    schema::{Attribute, EntityDefinition, EntityType},
    value::{Slot, Value},
};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

///
/// EntityKey
///
/// Ordered composite identity over the primary key attributes of one
/// entity type. Identity (equality/hash) covers only key attribute
/// values; keys of different entity types never compare equal.
///

#[derive(Clone)]
pub struct EntityKey {
    definition: EntityDefinition,
    values: BTreeMap<String, Slot>,
}

impl EntityKey {
    pub(crate) fn new(definition: EntityDefinition) -> Self {
        Self {
            definition,
            values: BTreeMap::new(),
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

    /// Key attributes in key order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        self.definition.primary_key()
    }

    fn check_key_attribute(&self, attribute: &Attribute) -> Result<(), EntityError> {
        let known = attribute.entity_type() == self.definition.entity_type()
            && attribute.is_primary_key()
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

    pub fn get(&self, attribute: &Attribute) -> Result<Option<&Value>, EntityError> {
        self.check_key_attribute(attribute)?;

        Ok(self
            .values
            .get(attribute.name())
            .and_then(Slot::as_option))
    }

    /// Set a key attribute value; `None` stores an explicit null.
    /// Restricted to attributes of this key, type-checked like any write.
    pub fn put(
        &mut self,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> Result<Option<Value>, EntityError> {
        self.check_key_attribute(attribute)?;
        if let Some(value) = &value {
            let found = value.value_type();
            if found != attribute.value_type() {
                return Err(EntityError::TypeMismatch {
                    attribute: attribute.name().to_string(),
                    expected: attribute.value_type(),
                    found,
                });
            }
        }

        Ok(self
            .values
            .insert(attribute.name().to_string(), Slot::from_option(value))
            .and_then(Slot::into_option))
    }

    /// A single-attribute key is null iff its value is absent or null.
    /// A composite key is null iff any non-nullable attribute is absent
    /// or null; nullable attributes do not force nullity.
    #[must_use]
    pub fn is_null(&self) -> bool {
        let primary_key = self.definition.primary_key();
        if let [attribute] = primary_key {
            return self
                .values
                .get(attribute.name())
                .is_none_or(Slot::is_null);
        }

        primary_key.iter().any(|attribute| {
            !attribute.nullable()
                && self
                    .values
                    .get(attribute.name())
                    .is_none_or(Slot::is_null)
        })
    }

    /// Deterministic identity hash: a positionally weighted wrapping sum
    /// over the present integer-valued key attributes, in key order.
    /// Changing any integer key value changes the result reproducibly.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn identity_hash(&self) -> i64 {
        let mut acc = 0i64;
        for (index, attribute) in self.definition.primary_key().iter().enumerate() {
            let contribution = match self.values.get(attribute.name()) {
                Some(Slot::Value(Value::Int(v))) => Some(*v),
                Some(Slot::Value(Value::Uint(v))) => Some(*v as i64),
                _ => None,
            };
            if let Some(v) = contribution {
                acc = acc.wrapping_add((index as i64 + 1).wrapping_mul(v));
            }
        }

        acc
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&Slot> {
        self.values.get(name)
    }

    pub(crate) fn put_slot(&mut self, name: &str, slot: Slot) {
        self.values.insert(name.to_string(), slot);
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.definition.entity_type())?;
        let mut first = true;
        for attribute in self.definition.primary_key() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            match self.values.get(attribute.name()) {
                Some(Slot::Value(v)) => write!(f, "{}={v}", attribute.name())?,
                Some(Slot::Null) => write!(f, "{}=null", attribute.name())?,
                None => write!(f, "{}=?", attribute.name())?,
            }
        }

        Ok(())
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.definition.entity_type() == other.definition.entity_type()
            && self.values == other.values
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.definition.entity_type().hash(state);
        for attribute in self.definition.primary_key() {
            self.values.get(attribute.name()).hash(state);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{composite_key, pair_key, test_domain};
    use crate::value::ValueType;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn single_attribute_key_nullity() {
        let entities = test_domain();
        let definition = entities
            .definition(&EntityType::new("department"))
            .unwrap()
            .clone();
        let id = definition.attribute("id").unwrap().clone();

        let mut key = definition.key();
        assert!(key.is_null());
        key.put(&id, None).unwrap();
        assert!(key.is_null());
        key.put(&id, Some(Value::Int(10))).unwrap();
        assert!(!key.is_null());
    }

    #[test]
    fn composite_key_nullity_driven_by_non_nullable_attributes() {
        // 'a' is non-nullable, 'b' is nullable.
        let entities = test_domain();

        let key = pair_key(&entities, None, Some(5));
        assert!(key.is_null(), "null non-nullable attribute forces nullity");

        let key = pair_key(&entities, Some(1), None);
        assert!(!key.is_null(), "nullable attribute does not force nullity");

        let key = pair_key(&entities, Some(1), Some(5));
        assert!(!key.is_null());
    }

    #[test]
    fn identity_hash_transitions_are_reproducible() {
        let entities = test_domain();

        let mut key = composite_key(&entities, Some(1), Some(2), Some(3));
        assert_eq!(key.identity_hash(), 14);

        let b = key.definition().attribute("b").unwrap().clone();
        key.put(&b, Some(Value::Int(3))).unwrap();
        assert_eq!(key.identity_hash(), 16);

        let c = key.definition().attribute("c").unwrap().clone();
        key.put(&c, None).unwrap();
        assert_eq!(key.identity_hash(), 7);
        assert!(!key.is_null(), "nullable third attribute keeps key non-null");
    }

    #[test]
    fn keys_of_different_entity_types_are_never_equal() {
        let entities = test_domain();
        let department = entities
            .definition(&EntityType::new("department"))
            .unwrap();
        let note = entities.definition(&EntityType::new("note")).unwrap();

        let mut left = department.key();
        left.put(
            &department.attribute("id").unwrap().clone(),
            Some(Value::Int(1)),
        )
        .unwrap();
        let mut right = note.key();
        right
            .put(&note.attribute("id").unwrap().clone(), Some(Value::Int(1)))
            .unwrap();

        assert_ne!(left, right);
    }

    #[test]
    fn key_access_is_restricted_to_key_attributes() {
        let entities = test_domain();
        let definition = entities
            .definition(&EntityType::new("department"))
            .unwrap()
            .clone();
        let code = definition.attribute("code").unwrap().clone();

        let mut key = definition.key();
        assert!(matches!(
            key.get(&code),
            Err(EntityError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            key.put(&code, Some(Value::Text("OPS".into()))),
            Err(EntityError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn key_put_is_type_checked() {
        let entities = test_domain();
        let definition = entities
            .definition(&EntityType::new("department"))
            .unwrap()
            .clone();
        let id = definition.attribute("id").unwrap().clone();

        let mut key = definition.key();
        let result = key.put(&id, Some(Value::Text("x".into())));

        assert!(matches!(
            result,
            Err(EntityError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Text,
                ..
            })
        ));
    }

    #[test]
    fn equal_keys_hash_equal() {
        let entities = test_domain();
        let left = composite_key(&entities, Some(1), Some(2), Some(3));
        let right = composite_key(&entities, Some(1), Some(2), Some(3));

        let mut set = HashSet::new();
        set.insert(left);
        assert!(set.contains(&right));
    }

    proptest! {
        // Bounded domain: weighted contributions stay far from wrapping,
        // so changing one component must change the hash.
        #[test]
        fn identity_hash_changes_with_any_component(
            a in 0i64..1_000_000,
            b in 0i64..1_000_000,
            c in 0i64..1_000_000,
            delta in 1i64..1_000,
        ) {
            let entities = test_domain();
            let base = composite_key(&entities, Some(a), Some(b), Some(c));

            let changed = composite_key(&entities, Some(a + delta), Some(b), Some(c));
            prop_assert_ne!(base.identity_hash(), changed.identity_hash());

            let changed = composite_key(&entities, Some(a), Some(b + delta), Some(c));
            prop_assert_ne!(base.identity_hash(), changed.identity_hash());

            let changed = composite_key(&entities, Some(a), Some(b), Some(c + delta));
            prop_assert_ne!(base.identity_hash(), changed.identity_hash());

            // Determinism: rebuilding with identical values reproduces the hash.
            let rebuilt = composite_key(&entities, Some(a), Some(b), Some(c));
            prop_assert_eq!(base.identity_hash(), rebuilt.identity_hash());
        }
    }
}
