use crate::{
    config::{ConnectionConfig, User},
    connection::{group_keys_by_type, ConnectionError, EntityConnection},
    entity::{Entity, EntityKey},
    error::Error,
    query::{Condition, Count, Direction, FetchDepth, Select, Update},
    schema::{Attribute, Entities, EntityType, ForeignKey},
    validate::EntityValidator,
    value::Value,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Function registered on a local connection: takes the connection and an
/// optional argument, returns an optional result.
pub type ConnectionFunction =
    Arc<dyn Fn(&mut LocalEntityConnection, Option<Value>) -> Result<Option<Value>, Error> + Send + Sync>;

/// Procedure registered on a local connection.
pub type ConnectionProcedure =
    Arc<dyn Fn(&mut LocalEntityConnection, Option<Value>) -> Result<(), Error> + Send + Sync>;

type Store = HashMap<String, Vec<Entity>>;

///
/// LocalEntityConnection
///
/// In-memory implementation of [`EntityConnection`]: rows live in
/// insertion-ordered per-type vectors. Transactions snapshot the whole
/// store; outside a transaction every mutating call is atomic on its own.
///

pub struct LocalEntityConnection {
    entities: Entities,
    config: ConnectionConfig,
    validator: EntityValidator,
    store: Store,
    // Some while a transaction is open; holds the pre-transaction store.
    snapshot: Option<Store>,
    closed: bool,
    functions: HashMap<String, ConnectionFunction>,
    procedures: HashMap<String, ConnectionProcedure>,
}

impl LocalEntityConnection {
    #[must_use]
    pub fn new(entities: Entities, config: ConnectionConfig) -> Self {
        Self {
            entities,
            config,
            validator: EntityValidator::new(),
            store: HashMap::new(),
            snapshot: None,
            closed: false,
            functions: HashMap::new(),
            procedures: HashMap::new(),
        }
    }

    pub fn register_function(&mut self, name: &str, function: ConnectionFunction) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn register_procedure(&mut self, name: &str, procedure: ConnectionProcedure) {
        self.procedures.insert(name.to_string(), procedure);
    }

    fn check_open(&self) -> Result<(), ConnectionError> {
        if self.closed {
            Err(ConnectionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run a mutating operation atomically: outside a transaction the
    /// store is restored when the operation fails, inside a transaction
    /// the open snapshot already guards it. A statement that fails inside
    /// a transaction may leave its earlier rows applied until the
    /// transaction is rolled back.
    fn atomic<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.snapshot.is_some() {
            return op(self);
        }

        let backup = self.store.clone();
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.store = backup;
                Err(err)
            }
        }
    }

    fn rows(&self, entity_type: &EntityType) -> &[Entity] {
        self.store
            .get(entity_type.name())
            .map_or(&[], Vec::as_slice)
    }

    fn find_by_key(&self, key: &EntityKey) -> Option<&Entity> {
        self.rows(key.entity_type())
            .iter()
            .find(|row| row.primary_key() == *key)
    }

    fn insert_row(&mut self, entity: &Entity) -> Result<EntityKey, Error> {
        self.validator.validate(entity)?;

        let key = entity.primary_key();
        if !key.is_null() && self.find_by_key(&key).is_some() {
            return Err(ConnectionError::UniqueConstraint {
                key: format!("{key:?}"),
            }
            .into());
        }

        let mut row = entity.clone();
        row.save_all();
        // Stored rows hold column values only; references resolve on select.
        row.clear_references();
        self.store
            .entry(entity.entity_type().name().to_string())
            .or_default()
            .push(row);

        Ok(key)
    }

    fn update_row(&mut self, entity: &Entity) -> Result<Entity, Error> {
        let original_key = entity.original_primary_key();
        if !entity.is_modified() {
            return Err(ConnectionError::UnmodifiedEntity {
                key: format!("{original_key:?}"),
            }
            .into());
        }
        self.validator.validate(entity)?;

        let definition = entity.definition().clone();
        let rows = self
            .store
            .entry(definition.entity_type().name().to_string())
            .or_default();
        let Some(stored) = rows.iter_mut().find(|row| row.primary_key() == original_key)
        else {
            return Err(ConnectionError::RecordModified {
                key: format!("{original_key:?}"),
            }
            .into());
        };

        // Optimistic check: every stored attribute the entity carries must
        // still hold the value the entity was loaded with.
        for name in entity.present_names() {
            let attribute = definition.attribute(name)?;
            if attribute.is_derived() {
                continue;
            }
            if stored.slot(name) != entity.original_slot(name) {
                return Err(ConnectionError::RecordModified {
                    key: format!("{original_key:?}"),
                }
                .into());
            }
        }

        let mut merged = stored.clone();
        for name in entity.present_names() {
            if let Some(slot) = entity.slot(name) {
                merged.put_slot(name, slot.clone());
            }
        }
        merged.save_all();
        *stored = merged.clone();

        Ok(merged)
    }

    fn matching_indexes(
        store: &Store,
        condition: &Condition,
    ) -> Result<Vec<usize>, Error> {
        let mut indexes = Vec::new();
        if let Some(rows) = store.get(condition.entity_type().name()) {
            for (index, row) in rows.iter().enumerate() {
                if condition.matches(row)? {
                    indexes.push(index);
                }
            }
        }

        Ok(indexes)
    }

    /// Resolve one foreign key of `row` to the given depth, caching the
    /// resolved entity. The key chain cuts reference cycles after one
    /// full loop.
    fn resolve_reference(
        &self,
        row: &Entity,
        foreign_key: &ForeignKey,
        depth: FetchDepth,
        chain: &mut Vec<EntityKey>,
    ) -> Result<(), Error> {
        let Some(remaining) = depth.descend() else {
            return Ok(());
        };
        let Some(key) = row.referenced_key(foreign_key)? else {
            return Ok(());
        };
        if chain.contains(&key) {
            return Ok(());
        }
        let Some(stored) = self.find_by_key(&key) else {
            return Ok(());
        };

        let referenced = stored.clone();
        chain.push(key);
        for nested in referenced.definition().foreign_keys().to_vec() {
            self.resolve_reference(&referenced, &nested, remaining, chain)?;
        }
        chain.pop();
        row.cache_reference(foreign_key, referenced);

        Ok(())
    }

    fn resolve_row(&self, row: &Entity, select: &Select) -> Result<(), Error> {
        let mut chain = vec![row.primary_key()];
        for foreign_key in row.definition().foreign_keys().to_vec() {
            let depth = select.foreign_key_fetch_depth(&foreign_key);
            self.resolve_reference(row, &foreign_key, depth, &mut chain)?;
        }

        Ok(())
    }

    fn project(row: &Entity, attributes: &[Attribute]) -> Entity {
        let definition = row.definition().clone();
        let mut projected = definition.entity();
        for attribute in definition.primary_key() {
            if let Some(slot) = row.slot(attribute.name()) {
                projected.put_slot(attribute.name(), slot.clone());
            }
        }
        for attribute in attributes {
            if let Some(slot) = row.slot(attribute.name()) {
                projected.put_slot(attribute.name(), slot.clone());
            }
        }

        projected
    }

    fn sorted(rows: &mut [Entity], select: &Select) {
        let Some(order_by) = select.order_by() else {
            return;
        };
        rows.sort_by(|a, b| {
            for (attribute, direction) in order_by.terms() {
                let left = a.get(attribute).ok().flatten();
                let right = b.get(attribute).ok().flatten();
                // Nulls order first regardless of direction.
                let ordering = match (&left, &right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(l), Some(r)) => {
                        let ordering = Value::canonical_cmp(l, r);
                        match direction {
                            Direction::Ascending => ordering,
                            Direction::Descending => ordering.reverse(),
                        }
                    }
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }

            Ordering::Equal
        });
    }
}

impl EntityConnection for LocalEntityConnection {
    fn entities(&self) -> &Entities {
        &self.entities
    }

    fn user(&self) -> &User {
        &self.config.user
    }

    fn connected(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        // An open transaction is rolled back on close.
        if let Some(snapshot) = self.snapshot.take() {
            self.store = snapshot;
        }
        self.closed = true;
        debug!("connection closed");
    }

    fn transaction_open(&self) -> bool {
        self.snapshot.is_some()
    }

    fn start_transaction(&mut self) -> Result<(), Error> {
        self.check_open()?;
        if self.snapshot.is_some() {
            return Err(ConnectionError::TransactionAlreadyOpen.into());
        }
        self.snapshot = Some(self.store.clone());
        debug!("transaction started");

        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), Error> {
        self.check_open()?;
        self.snapshot
            .take()
            .ok_or(ConnectionError::NoOpenTransaction)?;
        debug!("transaction committed");

        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), Error> {
        self.check_open()?;
        let snapshot = self
            .snapshot
            .take()
            .ok_or(ConnectionError::NoOpenTransaction)?;
        self.store = snapshot;
        debug!("transaction rolled back");

        Ok(())
    }

    fn insert(&mut self, entities: Vec<Entity>) -> Result<Vec<EntityKey>, Error> {
        self.check_open()?;
        let keys = self.atomic(|conn| {
            entities
                .iter()
                .map(|entity| conn.insert_row(entity))
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!(count = keys.len(), "inserted");

        Ok(keys)
    }

    fn insert_select(&mut self, entities: Vec<Entity>) -> Result<Vec<Entity>, Error> {
        let keys = self.insert(entities)?;
        keys.iter().map(|key| self.select_by_key(key)).collect()
    }

    fn update(&mut self, entities: Vec<Entity>) -> Result<Vec<Entity>, Error> {
        self.check_open()?;
        let updated = self.atomic(|conn| {
            entities
                .iter()
                .map(|entity| conn.update_row(entity))
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!(count = updated.len(), "updated");

        Ok(updated)
    }

    fn update_where(&mut self, update: Update) -> Result<usize, Error> {
        self.check_open()?;
        self.atomic(|conn| {
            let indexes = Self::matching_indexes(&conn.store, update.condition())?;
            let validator = conn.validator;
            let mut affected = 0;
            if let Some(rows) = conn.store.get_mut(update.entity_type().name()) {
                for index in indexes {
                    let row = &mut rows[index];
                    for (attribute, slot) in update.values() {
                        row.put(attribute, slot.clone().into_option())?;
                    }
                    validator.validate(row)?;
                    row.save_all();
                    affected += 1;
                }
            }
            debug!(count = affected, "updated by condition");

            Ok(affected)
        })
    }

    fn delete(&mut self, keys: Vec<EntityKey>) -> Result<(), Error> {
        self.check_open()?;
        self.atomic(|conn| {
            for (entity_type, group) in group_keys_by_type(&keys) {
                let expected = group.len();
                let mut actual = 0;
                if let Some(rows) = conn.store.get_mut(entity_type.name()) {
                    rows.retain(|row| {
                        let matched = group.iter().any(|key| row.primary_key() == **key);
                        if matched {
                            actual += 1;
                        }
                        !matched
                    });
                }
                if actual != expected {
                    return Err(ConnectionError::DeleteCount { expected, actual }.into());
                }
            }
            debug!(count = keys.len(), "deleted");

            Ok(())
        })
    }

    fn delete_where(&mut self, condition: Condition) -> Result<usize, Error> {
        self.check_open()?;
        self.atomic(|conn| {
            let indexes = Self::matching_indexes(&conn.store, &condition)?;
            let deleted = indexes.len();
            if let Some(rows) = conn.store.get_mut(condition.entity_type().name()) {
                let mut index = 0;
                rows.retain(|_| {
                    let keep = !indexes.contains(&index);
                    index += 1;
                    keep
                });
            }
            debug!(count = deleted, "deleted by condition");

            Ok(deleted)
        })
    }

    fn select(&mut self, select: Select) -> Result<Vec<Entity>, Error> {
        self.check_open()?;

        let mut rows: Vec<Entity> = Vec::new();
        for row in self.rows(select.entity_type()) {
            if select.condition().matches(row)? {
                rows.push(row.clone());
            }
        }
        if let Some(having) = select.having() {
            let mut filtered = Vec::with_capacity(rows.len());
            for row in rows {
                if having.matches(&row)? {
                    filtered.push(row);
                }
            }
            rows = filtered;
        }
        Self::sorted(&mut rows, &select);

        let offset = select.offset().unwrap_or(0);
        let mut rows: Vec<Entity> = rows.into_iter().skip(offset).collect();
        if let Some(limit) = select.limit() {
            rows.truncate(limit);
        }
        if let Some(attributes) = select.attributes() {
            rows = rows.iter().map(|row| Self::project(row, attributes)).collect();
        }
        for row in &rows {
            self.resolve_row(row, &select)?;
        }

        Ok(rows)
    }

    fn select_by_key(&mut self, key: &EntityKey) -> Result<Entity, Error> {
        self.check_open()?;
        let row = self
            .find_by_key(key)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                key: format!("{key:?}"),
            })?;
        let select = Select::all(key.entity_type()).build();
        self.resolve_row(&row, &select)?;

        Ok(row)
    }

    fn select_values(
        &mut self,
        attribute: &Attribute,
        select: Select,
    ) -> Result<Vec<Option<Value>>, Error> {
        let rows = self.select(select)?;
        rows.iter()
            .map(|row| row.get(attribute).map_err(Error::from))
            .collect()
    }

    fn count(&mut self, count: Count) -> Result<usize, Error> {
        self.check_open()?;

        let mut total = 0;
        for row in self.rows(count.entity_type()) {
            if !count.condition().matches(row)? {
                continue;
            }
            if let Some(having) = count.having_condition() {
                if !having.matches(row)? {
                    continue;
                }
            }
            total += 1;
        }

        Ok(total)
    }

    fn dependencies(
        &mut self,
        entities: &[Entity],
    ) -> Result<BTreeMap<EntityType, Vec<Entity>>, Error> {
        self.check_open()?;

        let mut result: BTreeMap<EntityType, Vec<Entity>> = BTreeMap::new();
        for definition in self.entities.definitions() {
            for foreign_key in definition.foreign_keys() {
                if foreign_key.is_soft() {
                    continue;
                }
                let targets: Vec<EntityKey> = entities
                    .iter()
                    .filter(|entity| entity.entity_type() == foreign_key.referenced_type())
                    .map(Entity::primary_key)
                    .collect();
                if targets.is_empty() {
                    continue;
                }
                for row in self.rows(definition.entity_type()) {
                    let Some(key) = row.referenced_key(foreign_key)? else {
                        continue;
                    };
                    if !targets.contains(&key) {
                        continue;
                    }
                    let group = result.entry(definition.entity_type().clone()).or_default();
                    let row_key = row.primary_key();
                    if !group.iter().any(|dep| dep.primary_key() == row_key) {
                        group.push(row.clone());
                    }
                }
            }
        }

        Ok(result)
    }

    fn execute_function(
        &mut self,
        name: &str,
        argument: Option<Value>,
    ) -> Result<Option<Value>, Error> {
        self.check_open()?;
        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::UndefinedFunction {
                name: name.to_string(),
            })?;

        function(self, argument)
    }

    fn execute_procedure(&mut self, name: &str, argument: Option<Value>) -> Result<(), Error> {
        self.check_open()?;
        let procedure = self
            .procedures
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::UndefinedProcedure {
                name: name.to_string(),
            })?;

        procedure(self, argument)
    }
}

///
/// TESTS
///
