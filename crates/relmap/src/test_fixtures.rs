//! Shared test domain: a small schema exercising every attribute kind,
//! composite keys, and soft foreign keys, plus entity factories.

use crate::{
    entity::{Entity, EntityKey},
    schema::{ColumnDefinition, Entities, EntityDefinition},
    value::{Value, ValueType},
};

pub(crate) fn test_domain() -> Entities {
    let department = EntityDefinition::builder("department")
        .column(ColumnDefinition::new("id", ValueType::Int).primary_key(0))
        .column(
            ColumnDefinition::new("code", ValueType::Text)
                .nullable(false)
                .max_length(4),
        )
        .column(
            ColumnDefinition::new("name", ValueType::Text)
                .nullable(false)
                .max_length(14),
        )
        .column(ColumnDefinition::new("location", ValueType::Text).max_length(13))
        .build()
        .unwrap();

    let employee = EntityDefinition::builder("employee")
        .column(ColumnDefinition::new("id", ValueType::Int).primary_key(0))
        .column(
            ColumnDefinition::new("name", ValueType::Text)
                .nullable(false)
                .max_length(12),
        )
        .column(ColumnDefinition::new("salary", ValueType::Int).range(900, 10_000))
        .column(ColumnDefinition::new("dept_id", ValueType::Int))
        .column(ColumnDefinition::new("audit_dept_id", ValueType::Int))
        .foreign_key("department_fk", "department", &[("dept_id", "id")])
        .soft_foreign_key("audit_fk", "department", &[("audit_dept_id", "id")])
        .denormalized("department_code", ValueType::Text, "department_fk", "code")
        .derived(
            "badge",
            ValueType::Text,
            &["name", "department_code"],
            |values| match (values[0].as_ref(), values[1].as_ref()) {
                (Some(Value::Text(name)), Some(Value::Text(code))) => {
                    Some(Value::Text(format!("{name}/{code}")))
                }
                _ => None,
            },
        )
        .build()
        .unwrap();

    let composite = EntityDefinition::builder("composite")
        .column(ColumnDefinition::new("a", ValueType::Int).primary_key(0))
        .column(ColumnDefinition::new("b", ValueType::Int).primary_key(1).nullable(true))
        .column(ColumnDefinition::new("c", ValueType::Int).primary_key(2).nullable(true))
        .build()
        .unwrap();

    let pair = EntityDefinition::builder("pair")
        .column(ColumnDefinition::new("a", ValueType::Int).primary_key(0))
        .column(ColumnDefinition::new("b", ValueType::Int).primary_key(1).nullable(true))
        .build()
        .unwrap();

    // Nullable key so rows survive primary-key stripping on copy.
    let note = EntityDefinition::builder("note")
        .column(ColumnDefinition::new("id", ValueType::Int).primary_key(0).nullable(true))
        .column(ColumnDefinition::new("body", ValueType::Text))
        .build()
        .unwrap();

    Entities::builder()
        .define(department)
        .define(employee)
        .define(composite)
        .define(pair)
        .define(note)
        .build()
        .unwrap()
}

pub(crate) fn department(entities: &Entities, id: i64, code: &str, name: &str) -> Entity {
    let definition = entities.definition(&"department".into()).unwrap().clone();
    let mut entity = definition.entity();
    entity
        .put(definition.attribute("id").unwrap(), Some(Value::Int(id)))
        .unwrap();
    entity
        .put(definition.attribute("code").unwrap(), Some(Value::from(code)))
        .unwrap();
    entity
        .put(definition.attribute("name").unwrap(), Some(Value::from(name)))
        .unwrap();

    entity
}

pub(crate) fn employee(
    entities: &Entities,
    id: i64,
    name: &str,
    salary: i64,
    department: &Entity,
) -> Entity {
    let definition = entities.definition(&"employee".into()).unwrap().clone();
    let mut entity = definition.entity();
    entity
        .put(definition.attribute("id").unwrap(), Some(Value::Int(id)))
        .unwrap();
    entity
        .put(definition.attribute("name").unwrap(), Some(Value::from(name)))
        .unwrap();
    entity
        .put(definition.attribute("salary").unwrap(), Some(Value::Int(salary)))
        .unwrap();
    entity
        .put_referenced(
            definition.foreign_key("department_fk").unwrap(),
            Some(department.clone()),
        )
        .unwrap();
    // Soft reference: always points at department 20.
    entity
        .put(
            definition.attribute("audit_dept_id").unwrap(),
            Some(Value::Int(20)),
        )
        .unwrap();

    entity
}

pub(crate) fn note(entities: &Entities, id: i64, body: &str) -> Entity {
    let definition = entities.definition(&"note".into()).unwrap().clone();
    let mut entity = definition.entity();
    entity
        .put(definition.attribute("id").unwrap(), Some(Value::Int(id)))
        .unwrap();
    entity
        .put(definition.attribute("body").unwrap(), Some(Value::from(body)))
        .unwrap();

    entity
}

pub(crate) fn composite_key(
    entities: &Entities,
    a: Option<i64>,
    b: Option<i64>,
    c: Option<i64>,
) -> EntityKey {
    let definition = entities.definition(&"composite".into()).unwrap().clone();
    let mut key = definition.key();
    key.put(definition.attribute("a").unwrap(), a.map(Value::Int))
        .unwrap();
    key.put(definition.attribute("b").unwrap(), b.map(Value::Int))
        .unwrap();
    key.put(definition.attribute("c").unwrap(), c.map(Value::Int))
        .unwrap();

    key
}

pub(crate) fn pair_key(entities: &Entities, a: Option<i64>, b: Option<i64>) -> EntityKey {
    let definition = entities.definition(&"pair".into()).unwrap().clone();
    let mut key = definition.key();
    key.put(definition.attribute("a").unwrap(), a.map(Value::Int))
        .unwrap();
    key.put(definition.attribute("b").unwrap(), b.map(Value::Int))
        .unwrap();

    key
}
