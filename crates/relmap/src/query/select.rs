use crate::{
    config::DEFAULT_QUERY_TIMEOUT_SECONDS,
    query::{Condition, QueryError},
    schema::{Attribute, EntityType, ForeignKey},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

///
/// Direction
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    Ascending,
    Descending,
}

///
/// OrderBy
///
/// Ordered list of (attribute, direction) pairs. Null values order first
/// regardless of direction.
///

#[derive(Clone, Debug)]
pub struct OrderBy(Vec<(Attribute, Direction)>);

impl OrderBy {
    #[must_use]
    pub fn terms(&self) -> &[(Attribute, Direction)] {
        &self.0
    }
}

///
/// FetchDepth
///
/// How far foreign key references are resolved when selecting: `Limit(0)`
/// leaves references unresolved, `Limit(n)` resolves n levels, `Unlimited`
/// resolves until the reference graph is exhausted (cycles are cut after
/// one full loop).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchDepth {
    Unlimited,
    Limit(usize),
}

impl FetchDepth {
    /// Depth remaining after descending one reference level; `None` when
    /// exhausted.
    #[must_use]
    pub(crate) fn descend(self) -> Option<Self> {
        match self {
            Self::Unlimited => Some(Self::Unlimited),
            Self::Limit(0) => None,
            Self::Limit(n) => Some(Self::Limit(n - 1)),
        }
    }
}

///
/// Select
///
/// Immutable select specification: condition, optional having filter over
/// post-select values, ordering, paging, row locking, reference fetch
/// depth, and attribute projection.
///

#[derive(Clone, Debug)]
pub struct Select {
    condition: Condition,
    having: Option<Condition>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
    for_update: bool,
    fetch_depth: FetchDepth,
    foreign_key_fetch_depth: HashMap<String, FetchDepth>,
    attributes: Option<Vec<Attribute>>,
    query_timeout_seconds: u64,
}

impl Select {
    /// Start building a select over the given condition.
    #[must_use]
    pub fn where_condition(condition: Condition) -> SelectBuilder {
        SelectBuilder {
            select: Self {
                condition,
                having: None,
                order_by: None,
                limit: None,
                offset: None,
                for_update: false,
                fetch_depth: FetchDepth::Unlimited,
                foreign_key_fetch_depth: HashMap::new(),
                attributes: None,
                query_timeout_seconds: DEFAULT_QUERY_TIMEOUT_SECONDS,
            },
            fetch_depth_set: false,
        }
    }

    /// Select every entity of the given type.
    #[must_use]
    pub fn all(entity_type: &EntityType) -> SelectBuilder {
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

    #[must_use]
    pub fn having(&self) -> Option<&Condition> {
        self.having.as_ref()
    }

    #[must_use]
    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    #[must_use]
    pub fn is_for_update(&self) -> bool {
        self.for_update
    }

    #[must_use]
    pub fn fetch_depth(&self) -> FetchDepth {
        self.fetch_depth
    }

    /// Fetch depth for one foreign key: the per-key override when set,
    /// otherwise the global depth.
    #[must_use]
    pub fn foreign_key_fetch_depth(&self, foreign_key: &ForeignKey) -> FetchDepth {
        self.foreign_key_fetch_depth
            .get(foreign_key.name())
            .copied()
            .unwrap_or(self.fetch_depth)
    }

    #[must_use]
    pub fn attributes(&self) -> Option<&[Attribute]> {
        self.attributes.as_deref()
    }

    /// Query timeout in seconds; zero disables the timeout.
    #[must_use]
    pub fn query_timeout_seconds(&self) -> u64 {
        self.query_timeout_seconds
    }
}

///
/// SelectBuilder
///

#[derive(Debug)]
pub struct SelectBuilder {
    select: Select,
    fetch_depth_set: bool,
}

impl SelectBuilder {
    /// Post-select filter, evaluated against resolved entities so it may
    /// reference derived and denormalized attributes.
    pub fn having(mut self, condition: Condition) -> Result<Self, QueryError> {
        let expected = self.select.condition.entity_type();
        let found = condition.entity_type();
        if found != expected {
            return Err(QueryError::MixedEntityTypes {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        self.select.having = Some(condition);

        Ok(self)
    }

    pub fn order_by(
        mut self,
        terms: Vec<(Attribute, Direction)>,
    ) -> Result<Self, QueryError> {
        let expected = self.select.condition.entity_type();
        for (attribute, _) in &terms {
            if attribute.entity_type() != expected {
                return Err(QueryError::MixedEntityTypes {
                    expected: expected.to_string(),
                    found: attribute.entity_type().to_string(),
                });
            }
        }
        self.select.order_by = Some(OrderBy(terms));

        Ok(self)
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.select.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.select.offset = Some(offset);
        self
    }

    /// Lock the selected rows. Forces fetch depth 0 so referenced rows are
    /// not pulled under the lock, unless a depth is set explicitly.
    #[must_use]
    pub fn for_update(mut self) -> Self {
        self.select.for_update = true;
        if !self.fetch_depth_set {
            self.select.fetch_depth = FetchDepth::Limit(0);
        }
        self
    }

    #[must_use]
    pub fn fetch_depth(mut self, depth: FetchDepth) -> Self {
        self.select.fetch_depth = depth;
        self.fetch_depth_set = true;
        self
    }

    pub fn foreign_key_fetch_depth(
        mut self,
        foreign_key: &ForeignKey,
        depth: FetchDepth,
    ) -> Result<Self, QueryError> {
        let expected = self.select.condition.entity_type();
        if foreign_key.entity_type() != expected {
            return Err(QueryError::MixedEntityTypes {
                expected: expected.to_string(),
                found: foreign_key.entity_type().to_string(),
            });
        }
        self.select
            .foreign_key_fetch_depth
            .insert(foreign_key.name().to_string(), depth);

        Ok(self)
    }

    /// Project to the given attributes; primary key attributes are always
    /// included by the executor.
    pub fn attributes(mut self, attributes: Vec<Attribute>) -> Result<Self, QueryError> {
        let expected = self.select.condition.entity_type();
        let mut seen = Vec::with_capacity(attributes.len());
        for attribute in &attributes {
            if attribute.entity_type() != expected {
                return Err(QueryError::MixedEntityTypes {
                    expected: expected.to_string(),
                    found: attribute.entity_type().to_string(),
                });
            }
            if seen.contains(&attribute.name()) {
                return Err(QueryError::DuplicateColumn {
                    attribute: attribute.name().to_string(),
                });
            }
            seen.push(attribute.name());
        }
        self.select.attributes = Some(attributes);

        Ok(self)
    }

    #[must_use]
    pub fn query_timeout_seconds(mut self, seconds: u64) -> Self {
        self.select.query_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn build(self) -> Select {
        self.select
    }
}

///
/// TESTS
///
