//! Batch drivers: chunked inserts from an entity iterator and
//! connection-to-connection copies.

use crate::{
    config::DEFAULT_BATCH_SIZE,
    connection::EntityConnection,
    entity::{Entity, EntityKey},
    error::Error,
    query::{Condition, FetchDepth, Select},
    schema::EntityType,
};
use thiserror::Error as ThisError;
use tracing::debug;

///
/// BatchError
///

#[derive(Debug, ThisError)]
pub enum BatchError {
    #[error("batch size must be positive")]
    NonPositiveBatchSize,
}

///
/// BatchInsert
///
/// Inserts entities from an iterator in chunks. Each chunk is one `insert`
/// call, so outside a transaction each chunk commits on its own; the first
/// failure aborts the run and previously inserted chunks stay committed.
///

pub struct BatchInsert<I: Iterator<Item = Entity>> {
    source: I,
    batch_size: usize,
    progress: Option<Box<dyn FnMut(usize)>>,
    on_insert: Option<Box<dyn FnMut(&[EntityKey])>>,
}

impl<I: Iterator<Item = Entity>> BatchInsert<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: None,
            on_insert: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::NonPositiveBatchSize);
        }
        self.batch_size = batch_size;

        Ok(self)
    }

    /// Called after every chunk with the cumulative number of inserted
    /// entities.
    #[must_use]
    pub fn progress(mut self, callback: Box<dyn FnMut(usize)>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Called after every chunk with the keys that chunk produced.
    #[must_use]
    pub fn on_insert(mut self, callback: Box<dyn FnMut(&[EntityKey])>) -> Self {
        self.on_insert = Some(callback);
        self
    }

    pub fn execute(mut self, connection: &mut dyn EntityConnection) -> Result<(), Error> {
        let mut inserted = 0;
        loop {
            let batch: Vec<Entity> = self.source.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let keys = connection.insert(batch)?;
            inserted += keys.len();
            if let Some(on_insert) = &mut self.on_insert {
                on_insert(&keys);
            }
            if let Some(progress) = &mut self.progress {
                progress(inserted);
            }
        }
        debug!(count = inserted, "batch insert finished");

        Ok(())
    }
}

///
/// BatchCopy
///
/// Copies entities of the configured types from a source connection to a
/// destination connection, optionally filtered per type and optionally
/// stripped of their primary keys. Rows are selected with fetch depth 0 so
/// references travel as plain column values.
///

pub struct BatchCopy {
    entity_types: Vec<(EntityType, Option<Condition>)>,
    batch_size: usize,
    include_primary_keys: bool,
}

impl Default for BatchCopy {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchCopy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity_types: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            include_primary_keys: true,
        }
    }

    /// Copy every entity of the given type, in the order added.
    #[must_use]
    pub fn entity_type(mut self, entity_type: &EntityType) -> Self {
        self.entity_types.push((entity_type.clone(), None));
        self
    }

    /// Copy the entities of the given type matching the condition.
    #[must_use]
    pub fn entity_type_where(mut self, entity_type: &EntityType, condition: Condition) -> Self {
        self.entity_types
            .push((entity_type.clone(), Some(condition)));
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::NonPositiveBatchSize);
        }
        self.batch_size = batch_size;

        Ok(self)
    }

    /// When false, primary keys are cleared before inserting so the
    /// destination assigns its own.
    #[must_use]
    pub fn include_primary_keys(mut self, include: bool) -> Self {
        self.include_primary_keys = include;
        self
    }

    pub fn execute(
        self,
        source: &mut dyn EntityConnection,
        destination: &mut dyn EntityConnection,
    ) -> Result<(), Error> {
        for (entity_type, condition) in self.entity_types {
            let condition = condition.unwrap_or_else(|| Condition::all(&entity_type));
            let select = Select::where_condition(condition)
                .fetch_depth(FetchDepth::Limit(0))
                .build();
            let mut rows = source.select(select)?;
            if !self.include_primary_keys {
                for row in &mut rows {
                    row.clear_primary_key();
                }
            }
            debug!(entity_type = %entity_type, count = rows.len(), "copying");

            let mut insert = BatchInsert::new(rows.into_iter());
            insert.batch_size = self.batch_size;
            insert.execute(destination)?;
        }

        Ok(())
    }
}

///
/// TESTS
///
