use crate::{
    entity::{Entity, EntityError},
    query::QueryError,
    schema::{Attribute, EntityType},
    value::Value,
};

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

///
/// Condition
///
/// Predicate AST over the attributes of a single entity type. The node
/// kinds are private; every construction path goes through a validated
/// constructor, so combinators are always non-empty and every member
/// refers to the same type. Null semantics follow SQL: a comparison
/// against an absent or null value is false, only `IsNull` matches it.
///

#[derive(Clone, Debug)]
pub struct Condition {
    kind: ConditionKind,
}

#[derive(Clone, Debug)]
enum ConditionKind {
    All(EntityType),
    Compare {
        attribute: Attribute,
        op: CompareOp,
        value: Value,
    },
    In {
        attribute: Attribute,
        values: Vec<Value>,
    },
    IsNull(Attribute),
    IsNotNull(Attribute),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    const fn new(kind: ConditionKind) -> Self {
        Self { kind }
    }

    #[must_use]
    pub fn all(entity_type: &EntityType) -> Self {
        Self::new(ConditionKind::All(entity_type.clone()))
    }

    /// The single entity type this condition constrains.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        match &self.kind {
            ConditionKind::All(entity_type) => entity_type,
            ConditionKind::Compare { attribute, .. }
            | ConditionKind::In { attribute, .. }
            | ConditionKind::IsNull(attribute)
            | ConditionKind::IsNotNull(attribute) => attribute.entity_type(),
            // Combinators cannot be built empty.
            ConditionKind::And(members) | ConditionKind::Or(members) => {
                members[0].entity_type()
            }
            ConditionKind::Not(inner) => inner.entity_type(),
        }
    }

    pub fn and(members: Vec<Condition>) -> Result<Self, QueryError> {
        Self::check_members(&members)?;

        Ok(Self::new(ConditionKind::And(members)))
    }

    pub fn or(members: Vec<Condition>) -> Result<Self, QueryError> {
        Self::check_members(&members)?;

        Ok(Self::new(ConditionKind::Or(members)))
    }

    #[must_use]
    pub fn negated(self) -> Self {
        Self::new(ConditionKind::Not(Box::new(self)))
    }

    fn check_members(members: &[Condition]) -> Result<(), QueryError> {
        let Some(first) = members.first() else {
            return Err(QueryError::EmptyComposite);
        };
        let expected = first.entity_type();
        for member in &members[1..] {
            let found = member.entity_type();
            if found != expected {
                return Err(QueryError::MixedEntityTypes {
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Evaluate against an entity of the condition's type.
    pub fn matches(&self, entity: &Entity) -> Result<bool, EntityError> {
        match &self.kind {
            ConditionKind::All(entity_type) => Ok(entity.entity_type() == entity_type),

            ConditionKind::Compare {
                attribute,
                op,
                value,
            } => {
                let Some(current) = entity.get(attribute)? else {
                    return Ok(false);
                };
                let Some(ordering) = current.partial_cmp(value) else {
                    return Ok(false);
                };

                Ok(match op {
                    CompareOp::Eq => ordering.is_eq(),
                    CompareOp::Ne => ordering.is_ne(),
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Lte => ordering.is_le(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Gte => ordering.is_ge(),
                })
            }

            ConditionKind::In { attribute, values } => {
                let Some(current) = entity.get(attribute)? else {
                    return Ok(false);
                };

                Ok(values.contains(&current))
            }

            ConditionKind::IsNull(attribute) => Ok(entity.get(attribute)?.is_none()),
            ConditionKind::IsNotNull(attribute) => Ok(entity.get(attribute)?.is_some()),

            ConditionKind::And(members) => {
                for member in members {
                    if !member.matches(entity)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            ConditionKind::Or(members) => {
                for member in members {
                    if member.matches(entity)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            ConditionKind::Not(inner) => Ok(!inner.matches(entity)?),
        }
    }
}

fn check_operand(attribute: &Attribute, value: &Value) -> Result<(), QueryError> {
    let found = value.value_type();
    if found == attribute.value_type() {
        Ok(())
    } else {
        Err(QueryError::TypeMismatch {
            attribute: attribute.name().to_string(),
            expected: attribute.value_type(),
            found,
        })
    }
}

/// Fluent condition constructors; operands are type-checked eagerly.
impl Attribute {
    pub fn equal_to(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Eq, value)
    }

    pub fn not_equal_to(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Ne, value)
    }

    pub fn less_than(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Lt, value)
    }

    pub fn at_most(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Lte, value)
    }

    pub fn greater_than(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Gt, value)
    }

    pub fn at_least(&self, value: impl Into<Value>) -> Result<Condition, QueryError> {
        self.compare(CompareOp::Gte, value)
    }

    pub fn compare(
        &self,
        op: CompareOp,
        value: impl Into<Value>,
    ) -> Result<Condition, QueryError> {
        let value = value.into();
        check_operand(self, &value)?;

        Ok(Condition::new(ConditionKind::Compare {
            attribute: self.clone(),
            op,
            value,
        }))
    }

    pub fn in_values<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Condition, QueryError> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(QueryError::EmptyInList);
        }
        for value in &values {
            check_operand(self, value)?;
        }

        Ok(Condition::new(ConditionKind::In {
            attribute: self.clone(),
            values,
        }))
    }

    #[must_use]
    pub fn is_null(&self) -> Condition {
        Condition::new(ConditionKind::IsNull(self.clone()))
    }

    #[must_use]
    pub fn is_not_null(&self) -> Condition {
        Condition::new(ConditionKind::IsNotNull(self.clone()))
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{department, test_domain};

    #[test]
    fn comparison_respects_sql_null_semantics() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let location = definition.attribute("location").unwrap().clone();
        let entity = department(&entities, 10, "OPS", "Operations");

        // 'location' is unset: neither Eq nor Ne matches, only IsNull.
        assert!(!location.equal_to("NYC").unwrap().matches(&entity).unwrap());
        assert!(!location.not_equal_to("NYC").unwrap().matches(&entity).unwrap());
        assert!(location.is_null().matches(&entity).unwrap());
        assert!(!location.is_not_null().matches(&entity).unwrap());
    }

    #[test]
    fn ordering_comparisons_match() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();
        let entity = department(&entities, 10, "OPS", "Operations");

        assert!(id.at_least(10).unwrap().matches(&entity).unwrap());
        assert!(id.greater_than(9).unwrap().matches(&entity).unwrap());
        assert!(!id.less_than(10).unwrap().matches(&entity).unwrap());
        assert!(id.in_values([5, 10, 15]).unwrap().matches(&entity).unwrap());
    }

    #[test]
    fn operands_are_type_checked_eagerly() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();

        assert!(matches!(
            id.equal_to("ten"),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn combinators_require_a_single_entity_type() {
        let entities = test_domain();
        let department = entities.definition(&"department".into()).unwrap().clone();
        let employee = entities.definition(&"employee".into()).unwrap().clone();
        let dept_id = department.attribute("id").unwrap().clone();
        let emp_id = employee.attribute("id").unwrap().clone();

        let result = Condition::and(vec![
            dept_id.equal_to(1).unwrap(),
            emp_id.equal_to(1).unwrap(),
        ]);
        assert!(matches!(result, Err(QueryError::MixedEntityTypes { .. })));

        // Both combinator constructors reject empty member lists; with the
        // node kinds private there is no other way to build one, so
        // entity_type never sees an empty combinator.
        assert!(matches!(
            Condition::and(vec![]),
            Err(QueryError::EmptyComposite)
        ));
        assert!(matches!(
            Condition::or(vec![]),
            Err(QueryError::EmptyComposite)
        ));
    }

    #[test]
    fn combinator_entity_type_comes_from_its_members() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();

        let composite = Condition::and(vec![id.equal_to(1).unwrap()]).unwrap();
        assert_eq!(composite.entity_type().name(), "department");
        assert_eq!(composite.negated().entity_type().name(), "department");
    }

    #[test]
    fn composite_conditions_evaluate() {
        let entities = test_domain();
        let definition = entities.definition(&"department".into()).unwrap().clone();
        let id = definition.attribute("id").unwrap().clone();
        let code = definition.attribute("code").unwrap().clone();
        let entity = department(&entities, 10, "OPS", "Operations");

        let both = Condition::and(vec![
            id.equal_to(10).unwrap(),
            code.equal_to("OPS").unwrap(),
        ])
        .unwrap();
        assert!(both.matches(&entity).unwrap());

        let either = Condition::or(vec![
            id.equal_to(99).unwrap(),
            code.equal_to("OPS").unwrap(),
        ])
        .unwrap();
        assert!(either.matches(&entity).unwrap());

        assert!(!both.negated().matches(&entity).unwrap());
    }
}
