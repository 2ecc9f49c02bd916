//! Entity validation against the constraints declared on the schema:
//! nullability, maximum length, and numeric range.

use crate::{
    entity::Entity,
    value::{Slot, Value},
};
use thiserror::Error as ThisError;

///
/// ValidationError
///

#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("attribute '{attribute}' does not allow null")]
    NullNotAllowed { attribute: String },

    #[error("attribute '{attribute}' exceeds maximum length {max_length}: length {length}")]
    LengthExceeded {
        attribute: String,
        max_length: usize,
        length: usize,
    },

    #[error("attribute '{attribute}' is out of range {min}..={max}: value {value}")]
    OutOfRange {
        attribute: String,
        min: i64,
        max: i64,
        value: i64,
    },
}

///
/// EntityValidator
///
/// Checks an entity against its definition before any store mutation.
/// Violations surface in attribute declaration order, first one wins.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct EntityValidator;

impl EntityValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn validate(&self, entity: &Entity) -> Result<(), ValidationError> {
        for attribute in entity.definition().attributes() {
            if !attribute.is_column() {
                continue;
            }

            let slot = entity.slot(attribute.name());
            if !attribute.nullable() && !matches!(slot, Some(Slot::Value(_))) {
                return Err(ValidationError::NullNotAllowed {
                    attribute: attribute.name().to_string(),
                });
            }

            let Some(Slot::Value(value)) = slot else {
                continue;
            };

            if let (Some(max_length), Some(length)) = (attribute.max_length(), value.length()) {
                if length > max_length {
                    return Err(ValidationError::LengthExceeded {
                        attribute: attribute.name().to_string(),
                        max_length,
                        length,
                    });
                }
            }

            if let Some((min, max)) = attribute.range() {
                if let Value::Int(v) = value {
                    if *v < min || *v > max {
                        return Err(ValidationError::OutOfRange {
                            attribute: attribute.name().to_string(),
                            min,
                            max,
                            value: *v,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{department, test_domain};
    use crate::value::Value;

    #[test]
    fn valid_entity_passes() {
        let entities = test_domain();
        let entity = department(&entities, 10, "OPS", "Operations");

        assert!(EntityValidator::new().validate(&entity).is_ok());
    }

    #[test]
    fn missing_non_nullable_value_is_rejected() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();

        let mut entity = definition.entity();
        entity.put(&id, Some(Value::Int(10))).unwrap();
        // 'code' and 'name' are non-nullable and unset.
        let result = EntityValidator::new().validate(&entity);

        assert!(matches!(
            result,
            Err(ValidationError::NullNotAllowed { attribute }) if attribute == "code"
        ));
    }

    #[test]
    fn explicit_null_in_non_nullable_attribute_is_rejected() {
        let entities = test_domain();
        let mut entity = department(&entities, 10, "OPS", "Operations");
        let code = entity.definition().attribute("code").unwrap().clone();

        entity.put(&code, None).unwrap();

        assert!(matches!(
            EntityValidator::new().validate(&entity),
            Err(ValidationError::NullNotAllowed { .. })
        ));
    }

    #[test]
    fn over_long_text_is_rejected() {
        let entities = test_domain();
        let mut entity = department(&entities, 10, "OPS", "Operations");
        let name = entity.definition().attribute("name").unwrap().clone();

        // max length of 'name' is 14.
        entity
            .put(&name, Some(Value::from("A name far too long to store")))
            .unwrap();

        assert!(matches!(
            EntityValidator::new().validate(&entity),
            Err(ValidationError::LengthExceeded { max_length: 14, .. })
        ));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let entities = test_domain();
        let definition = entities.definition(&"employee".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();
        let name = definition.attribute("name").unwrap().clone();
        let salary = definition.attribute("salary").unwrap().clone();

        let mut entity = definition.entity();
        entity.put(&id, Some(Value::Int(1))).unwrap();
        entity.put(&name, Some(Value::from("Scott"))).unwrap();
        entity.put(&salary, Some(Value::Int(100))).unwrap();

        assert!(matches!(
            EntityValidator::new().validate(&entity),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
