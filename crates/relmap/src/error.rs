//! Top-level error type aggregating the per-module error enums.

use crate::{
    batch::BatchError, connection::ConnectionError, entity::EntityError, query::QueryError,
    schema::SchemaError, validate::ValidationError,
};
use thiserror::Error as ThisError;

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
