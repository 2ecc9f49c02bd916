//! Connection protocol: the `EntityConnection` trait, the transaction
//! helper, the in-memory reference implementation, and the lock-guarded
//! provider.
//!
//! Transactions follow a flat state machine: at most one open transaction
//! per connection, and every CRUD call commits implicitly unless a
//! transaction is open.

mod local;
mod provider;

pub use local::{ConnectionFunction, ConnectionProcedure, LocalEntityConnection};
pub use provider::{ConnectionFactories, ConnectionFactory, ConnectionProvider};

use crate::{
    config::User,
    entity::{Entity, EntityKey},
    error::Error,
    query::{Condition, Count, Select, Update},
    schema::{Attribute, Entities, EntityType},
    value::Value,
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;
use tracing::warn;

///
/// ConnectionError
///

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,

    #[error("a transaction is already open")]
    TransactionAlreadyOpen,

    #[error("no transaction is open")]
    NoOpenTransaction,

    #[error("nested transactions are not supported")]
    NestedTransaction,

    #[error("entity '{key}' is unmodified")]
    UnmodifiedEntity { key: String },

    #[error("row '{key}' was modified or deleted by another connection")]
    RecordModified { key: String },

    #[error("expected to delete {expected} rows, deleted {actual}")]
    DeleteCount { expected: usize, actual: usize },

    #[error("unique key violation for '{key}'")]
    UniqueConstraint { key: String },

    #[error("no row found for '{key}'")]
    NotFound { key: String },

    #[error("expected a single row, found {count}")]
    MultipleRowsFound { count: usize },

    #[error("function '{name}' is not defined")]
    UndefinedFunction { name: String },

    #[error("procedure '{name}' is not defined")]
    UndefinedProcedure { name: String },

    #[error("connection type '{connection_type}' is not registered")]
    UnknownConnectionType { connection_type: String },
}

///
/// EntityConnection
///
/// Object-safe protocol every connection implementation speaks. Methods
/// take `&mut self`; a connection is a single-threaded resource, shared
/// access goes through a [`ConnectionProvider`].
///

pub trait EntityConnection {
    /// The schema domain this connection operates on.
    fn entities(&self) -> &Entities;

    fn user(&self) -> &User;

    fn connected(&self) -> bool;

    /// Close the connection; every subsequent operation fails with
    /// [`ConnectionError::Closed`].
    fn close(&mut self);

    fn transaction_open(&self) -> bool;

    fn start_transaction(&mut self) -> Result<(), Error>;

    fn commit_transaction(&mut self) -> Result<(), Error>;

    fn rollback_transaction(&mut self) -> Result<(), Error>;

    /// Insert entities, returning their keys in input order.
    fn insert(&mut self, entities: Vec<Entity>) -> Result<Vec<EntityKey>, Error>;

    /// Insert entities and select the inserted rows back.
    fn insert_select(&mut self, entities: Vec<Entity>) -> Result<Vec<Entity>, Error>;

    /// Update modified entities, returning the updated rows. Unmodified
    /// input entities and concurrently modified rows are errors.
    fn update(&mut self, entities: Vec<Entity>) -> Result<Vec<Entity>, Error>;

    /// Apply an update spec, returning the number of affected rows.
    fn update_where(&mut self, update: Update) -> Result<usize, Error>;

    /// Delete the rows behind the given keys; missing rows are an error.
    fn delete(&mut self, keys: Vec<EntityKey>) -> Result<(), Error>;

    /// Delete every row matching the condition, returning the count.
    fn delete_where(&mut self, condition: Condition) -> Result<usize, Error>;

    fn select(&mut self, select: Select) -> Result<Vec<Entity>, Error>;

    /// Select the single row behind a primary key, references fully
    /// resolved.
    fn select_by_key(&mut self, key: &EntityKey) -> Result<Entity, Error>;

    /// Current values of one attribute over the rows a select yields.
    fn select_values(
        &mut self,
        attribute: &Attribute,
        select: Select,
    ) -> Result<Vec<Option<Value>>, Error>;

    fn count(&mut self, count: Count) -> Result<usize, Error>;

    /// Rows depending on the given entities through non-soft foreign keys,
    /// grouped by entity type.
    fn dependencies(
        &mut self,
        entities: &[Entity],
    ) -> Result<BTreeMap<EntityType, Vec<Entity>>, Error>;

    fn execute_function(
        &mut self,
        name: &str,
        argument: Option<Value>,
    ) -> Result<Option<Value>, Error>;

    fn execute_procedure(&mut self, name: &str, argument: Option<Value>) -> Result<(), Error>;

    fn select_where(&mut self, condition: Condition) -> Result<Vec<Entity>, Error> {
        self.select(Select::where_condition(condition).build())
    }

    /// Select exactly one row; zero or several rows are errors.
    fn select_single(&mut self, condition: Condition) -> Result<Entity, Error> {
        let condition_text = format!("{condition:?}");
        let mut rows = self.select_where(condition)?;
        match rows.len() {
            0 => Err(ConnectionError::NotFound {
                key: condition_text,
            }
            .into()),
            1 => Ok(rows.remove(0)),
            count => Err(ConnectionError::MultipleRowsFound { count }.into()),
        }
    }

    /// Liveness check used by providers before lending the connection out.
    fn probe(&mut self) -> bool {
        self.connected()
    }
}

/// Run `body` inside a transaction on `connection`: commits on success,
/// rolls back on error and returns the original error. Calling this with a
/// transaction already open rolls that transaction back and fails.
pub fn transaction<C, T, F>(connection: &mut C, body: F) -> Result<T, Error>
where
    C: EntityConnection + ?Sized,
    F: FnOnce(&mut C) -> Result<T, Error>,
{
    if connection.transaction_open() {
        warn!("transaction helper called with a transaction already open; rolling back");
        connection.rollback_transaction()?;

        return Err(ConnectionError::NestedTransaction.into());
    }

    connection.start_transaction()?;
    match body(connection) {
        Ok(value) => {
            connection.commit_transaction()?;
            Ok(value)
        }
        Err(err) => {
            if connection.rollback_transaction().is_err() {
                warn!("rollback after failed transaction body failed");
            }
            Err(err)
        }
    }
}

/// Group keys by entity type, types in first-encounter order and keys in
/// input order within each type. Deletes process detail types before
/// master types by handing keys over in this order.
pub(crate) fn group_keys_by_type(keys: &[EntityKey]) -> Vec<(EntityType, Vec<&EntityKey>)> {
    let mut groups: Vec<(EntityType, Vec<&EntityKey>)> = Vec::new();
    for key in keys {
        match groups
            .iter_mut()
            .find(|(entity_type, _)| *entity_type == *key.entity_type())
        {
            Some((_, members)) => members.push(key),
            None => groups.push((key.entity_type().clone(), vec![key])),
        }
    }

    groups
}

///
/// TESTS
///
