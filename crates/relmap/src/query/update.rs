use crate::{
    query::{Condition, QueryError},
    schema::{Attribute, EntityType},
    value::{Slot, Value},
};

///
/// Update
///
/// Immutable update specification: a condition plus an ordered set list.
/// Only writable column attributes may be set; each column at most once.
///

#[derive(Clone, Debug)]
pub struct Update {
    condition: Condition,
    values: Vec<(Attribute, Slot)>,
}

impl Update {
    /// Start building an update over the given condition.
    #[must_use]
    pub fn where_condition(condition: Condition) -> UpdateBuilder {
        UpdateBuilder {
            condition,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn all(entity_type: &EntityType) -> UpdateBuilder {
        Self::where_condition(Condition::all(entity_type))
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        self.condition.entity_type()
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Set list in insertion order.
    #[must_use]
    pub fn values(&self) -> &[(Attribute, Slot)] {
        &self.values
    }
}

///
/// UpdateBuilder
///

#[derive(Debug)]
pub struct UpdateBuilder {
    condition: Condition,
    values: Vec<(Attribute, Slot)>,
}

impl UpdateBuilder {
    /// Set a column; `None` writes an explicit null.
    pub fn set(
        mut self,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> Result<Self, QueryError> {
        let expected = self.condition.entity_type();
        if attribute.entity_type() != expected {
            return Err(QueryError::MixedEntityTypes {
                expected: expected.to_string(),
                found: attribute.entity_type().to_string(),
            });
        }
        if !attribute.is_column() || !attribute.updatable() {
            return Err(QueryError::IllegalSetColumn {
                attribute: attribute.name().to_string(),
            });
        }
        if self.values.iter().any(|(set, _)| set == attribute) {
            return Err(QueryError::DuplicateColumn {
                attribute: attribute.name().to_string(),
            });
        }
        if let Some(value) = &value {
            let found = value.value_type();
            if found != attribute.value_type() {
                return Err(QueryError::TypeMismatch {
                    attribute: attribute.name().to_string(),
                    expected: attribute.value_type(),
                    found,
                });
            }
        }
        self.values.push((attribute.clone(), Slot::from_option(value)));

        Ok(self)
    }

    /// At least one column must be set.
    pub fn build(self) -> Result<Update, QueryError> {
        if self.values.is_empty() {
            return Err(QueryError::EmptyUpdate);
        }

        Ok(Update {
            condition: self.condition,
            values: self.values,
        })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::test_domain;

    #[test]
    fn builds_an_ordered_set_list() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let name = definition.attribute("name").unwrap().clone();
        let location = definition.attribute("location").unwrap().clone();

        let update = Update::all(&"department".into())
            .set(&name, Some(Value::from("Logistics")))
            .unwrap()
            .set(&location, None)
            .unwrap()
            .build()
            .unwrap();

        let values = update.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].0.name(), "name");
        assert_eq!(values[1].0.name(), "location");
        assert!(values[1].1.is_null());
    }

    #[test]
    fn rejects_duplicate_columns() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let name = definition.attribute("name").unwrap().clone();

        let result = Update::all(&"department".into())
            .set(&name, Some(Value::from("a")))
            .unwrap()
            .set(&name, Some(Value::from("b")));

        assert!(matches!(result, Err(QueryError::DuplicateColumn { .. })));
    }

    #[test]
    fn rejects_empty_build() {
        let result = Update::all(&"department".into()).build();

        assert!(matches!(result, Err(QueryError::EmptyUpdate)));
    }

    #[test]
    fn rejects_non_updatable_and_non_column_attributes() {
        let entities = test_domain();
        let department = entities.definition(&"department".into()).unwrap().clone();
        let employee = entities.definition(&"employee".into()).unwrap().clone();
        let id = department.attribute("id").unwrap().clone();
        let badge = employee.attribute("badge").unwrap().clone();

        // Primary key column, non-updatable.
        assert!(matches!(
            Update::all(&"department".into()).set(&id, Some(Value::Int(1))),
            Err(QueryError::IllegalSetColumn { .. })
        ));
        // Derived attribute.
        assert!(matches!(
            Update::all(&"employee".into()).set(&badge, Some(Value::from("x"))),
            Err(QueryError::IllegalSetColumn { .. })
        ));
    }

    #[test]
    fn set_is_type_checked() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let name = definition.attribute("name").unwrap().clone();

        assert!(matches!(
            Update::all(&"department".into()).set(&name, Some(Value::Int(1))),
            Err(QueryError::TypeMismatch { .. })
        ));
    }
}
