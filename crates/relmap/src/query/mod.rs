//! Immutable query specifications: conditions, selects, updates, counts.
//!
//! Specs are validated eagerly while being built; a spec handed to a
//! connection is always internally consistent and refers to exactly one
//! entity type.

mod condition;
mod count;
mod select;
mod update;

pub use condition::{CompareOp, Condition};
pub use count::Count;
pub use select::{Direction, FetchDepth, OrderBy, Select, SelectBuilder};
pub use update::{Update, UpdateBuilder};

use crate::value::ValueType;
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Raised while building a query spec, never while evaluating one.
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("condition mixes entity types '{expected}' and '{found}'")]
    MixedEntityTypes { expected: String, found: String },

    #[error("composite condition requires at least one member")]
    EmptyComposite,

    #[error("in-condition requires at least one value")]
    EmptyInList,

    #[error("type mismatch for attribute '{attribute}': expected {expected}, found {found}")]
    TypeMismatch {
        attribute: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("column '{attribute}' is already present in the spec")]
    DuplicateColumn { attribute: String },

    #[error("update spec sets no columns")]
    EmptyUpdate,

    #[error("attribute '{attribute}' is not an updatable column")]
    IllegalSetColumn { attribute: String },
}
