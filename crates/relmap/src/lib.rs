//! relmap
//!
//! Schema-described entity mapping over a connection protocol: entities
//! are typed value maps described by a runtime schema registry, queried
//! and persisted through an object-safe connection trait.
//!
//! The crate is split along its seams:
//! - [`value`] / [`schema`]: the value vocabulary and the registry of
//!   entity definitions, attributes, and foreign keys
//! - [`entity`]: value maps with modification tracking and foreign key
//!   resolution
//! - [`query`]: immutable condition / select / update / count specs
//! - [`connection`]: the `EntityConnection` protocol, the in-memory
//!   implementation, and the reconnecting provider
//! - [`batch`]: chunked insert and copy drivers

pub mod batch;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod validate;
pub mod value;

#[cfg(test)]
mod test_fixtures;

pub use error::Error;

pub mod prelude {
    pub use crate::{
        batch::{BatchCopy, BatchInsert},
        config::{ConnectionConfig, User},
        connection::{
            transaction, ConnectionFactories, ConnectionFactory, ConnectionProvider,
            EntityConnection, LocalEntityConnection,
        },
        entity::{Entity, EntityKey},
        error::Error,
        query::{Condition, Count, Direction, FetchDepth, Select, Update},
        schema::{
            Attribute, ColumnDefinition, Entities, EntityDefinition, EntityType, ForeignKey,
        },
        validate::EntityValidator,
        value::{Slot, Value, ValueType},
    };
}
