use crate::{
    query::{Condition, QueryError},
    schema::EntityType,
};

///
/// Count
///
/// Immutable row count specification: a condition plus an optional having
/// filter over post-select values.
///

#[derive(Clone, Debug)]
pub struct Count {
    condition: Condition,
    having: Option<Condition>,
}

impl Count {
    #[must_use]
    pub fn where_condition(condition: Condition) -> Self {
        Self {
            condition,
            having: None,
        }
    }

    #[must_use]
    pub fn all(entity_type: &EntityType) -> Self {
        Self::where_condition(Condition::all(entity_type))
    }

    pub fn having(mut self, condition: Condition) -> Result<Self, QueryError> {
        let expected = self.condition.entity_type();
        let found = condition.entity_type();
        if found != expected {
            return Err(QueryError::MixedEntityTypes {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        self.having = Some(condition);

        Ok(self)
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        self.condition.entity_type()
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    #[must_use]
    pub fn having_condition(&self) -> Option<&Condition> {
        self.having.as_ref()
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
    fn having_requires_the_same_entity_type() {
        let entities = test_domain();
        let employee = entities.definition(&"employee".into()).unwrap().clone();
        let name = employee.attribute("name").unwrap().clone();

        let result = Count::all(&"department".into())
            .having(name.is_not_null());

        assert!(matches!(result, Err(QueryError::MixedEntityTypes { .. })));
    }
}
