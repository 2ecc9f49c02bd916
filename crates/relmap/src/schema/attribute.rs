use crate::{
    schema::{EntityDefinition, EntityType},
    value::{Value, ValueType},
};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Computation function of a derived attribute. Receives the current
/// values of the declared source attributes in declaration order.
pub type DerivedProvider = Arc<dyn Fn(&[Option<Value>]) -> Option<Value> + Send + Sync>;

///
/// DerivedDefinition
///
/// Read-only attribute computed on demand from other attributes of the
/// same entity. Never stored in the value map.
///

#[derive(Clone)]
pub struct DerivedDefinition {
    pub sources: Vec<String>,
    pub provider: DerivedProvider,
}

impl fmt::Debug for DerivedDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDefinition")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

///
/// DenormalizedDefinition
///
/// Read-only attribute mirroring an attribute of the entity referenced
/// through a foreign key of the owning type. Written only by the foreign
/// key cascade.
///

#[derive(Clone, Debug)]
pub struct DenormalizedDefinition {
    pub foreign_key: String,
    pub source: String,
}

///
/// AttributeKind
///

#[derive(Clone, Debug)]
pub enum AttributeKind {
    Column,
    Derived(DerivedDefinition),
    Denormalized(DenormalizedDefinition),
}

#[derive(Debug)]
struct AttributeInner {
    entity_type: EntityType,
    name: String,
    value_type: ValueType,
    kind: AttributeKind,
    nullable: bool,
    updatable: bool,
    primary_key_index: Option<usize>,
    max_length: Option<usize>,
    range: Option<(i64, i64)>,
}

///
/// Attribute
///
/// Typed, named slot on an entity type. Identity (equality/hash) is the
/// (entity type, name) pair; the handle itself is a cheap `Arc` clone.
///

#[derive(Clone)]
pub struct Attribute(Arc<AttributeInner>);

impl Attribute {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entity_type: EntityType,
        name: String,
        value_type: ValueType,
        kind: AttributeKind,
        nullable: bool,
        updatable: bool,
        primary_key_index: Option<usize>,
        max_length: Option<usize>,
        range: Option<(i64, i64)>,
    ) -> Self {
        Self(Arc::new(AttributeInner {
            entity_type,
            name,
            value_type,
            kind,
            nullable,
            updatable,
            primary_key_index,
            max_length,
            range,
        }))
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.0.entity_type
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.0.value_type
    }

    #[must_use]
    pub fn kind(&self) -> &AttributeKind {
        &self.0.kind
    }

    #[must_use]
    pub fn is_column(&self) -> bool {
        matches!(self.0.kind, AttributeKind::Column)
    }

    #[must_use]
    pub fn is_derived(&self) -> bool {
        matches!(self.0.kind, AttributeKind::Derived(_))
    }

    #[must_use]
    pub fn is_denormalized(&self) -> bool {
        matches!(self.0.kind, AttributeKind::Denormalized(_))
    }

    #[must_use]
    pub fn nullable(&self) -> bool {
        self.0.nullable
    }

    #[must_use]
    pub fn updatable(&self) -> bool {
        self.0.updatable
    }

    #[must_use]
    pub fn primary_key_index(&self) -> Option<usize> {
        self.0.primary_key_index
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.0.primary_key_index.is_some()
    }

    #[must_use]
    pub fn max_length(&self) -> Option<usize> {
        self.0.max_length
    }

    #[must_use]
    pub fn range(&self) -> Option<(i64, i64)> {
        self.0.range
    }

    /// Exempt from modification tracking: a non-nullable, non-updatable
    /// primary key attribute never marks its entity modified.
    #[must_use]
    pub(crate) fn exempt_from_modification(&self) -> bool {
        self.is_primary_key() && !self.updatable() && !self.nullable()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.entity_type, self.0.name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.entity_type, self.0.name)
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.0.entity_type == other.0.entity_type && self.0.name == other.0.name
    }
}

impl Eq for Attribute {}

impl std::hash::Hash for Attribute {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.entity_type.hash(state);
        self.0.name.hash(state);
    }
}

///
/// ForeignKeyReference
///
/// One (column, referenced column) pair of a foreign key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForeignKeyReference {
    pub column: String,
    pub referenced: String,
}

#[derive(Debug)]
struct ForeignKeyInner {
    entity_type: EntityType,
    name: String,
    references: Vec<ForeignKeyReference>,
    referenced_type: EntityType,
    soft: bool,
    // Filled in once the owning registry is built; foreign keys may point
    // at types defined later (or at their own type).
    referenced_definition: OnceLock<EntityDefinition>,
}

///
/// ForeignKey
///
/// Reference from one entity type to the primary key of another, carried
/// by one or more underlying columns. A soft foreign key participates in
/// resolution but not in dependency scans.
///

#[derive(Clone)]
pub struct ForeignKey(Arc<ForeignKeyInner>);

impl ForeignKey {
    pub(crate) fn new(
        entity_type: EntityType,
        name: String,
        references: Vec<ForeignKeyReference>,
        referenced_type: EntityType,
        soft: bool,
    ) -> Self {
        Self(Arc::new(ForeignKeyInner {
            entity_type,
            name,
            references,
            referenced_type,
            soft,
            referenced_definition: OnceLock::new(),
        }))
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.0.entity_type
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn references(&self) -> &[ForeignKeyReference] {
        &self.0.references
    }

    #[must_use]
    pub fn referenced_type(&self) -> &EntityType {
        &self.0.referenced_type
    }

    #[must_use]
    pub fn is_soft(&self) -> bool {
        self.0.soft
    }

    /// Definition of the referenced type, available once the registry
    /// holding both types has been built.
    #[must_use]
    pub fn referenced_definition(&self) -> Option<&EntityDefinition> {
        self.0.referenced_definition.get()
    }

    pub(crate) fn resolve(&self, definition: EntityDefinition) {
        let _ = self.0.referenced_definition.set(definition);
    }
}

impl fmt::Debug for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}",
            self.0.entity_type, self.0.name, self.0.referenced_type
        )
    }
}

impl PartialEq for ForeignKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.entity_type == other.0.entity_type && self.0.name == other.0.name
    }
}

impl Eq for ForeignKey {}

impl std::hash::Hash for ForeignKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.entity_type.hash(state);
        self.0.name.hash(state);
    }
}

///
/// ColumnDefinition
///
/// Builder input describing one stored column. `primary_key` marks the
/// column non-nullable and non-updatable; both can be re-enabled
/// explicitly afterwards for keys that allow it.
///

#[derive(Clone, Debug)]
pub struct ColumnDefinition {
    pub(crate) name: String,
    pub(crate) value_type: ValueType,
    pub(crate) nullable: bool,
    pub(crate) updatable: bool,
    pub(crate) primary_key_index: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) range: Option<(i64, i64)>,
}

impl ColumnDefinition {
    #[must_use]
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            nullable: true,
            updatable: true,
            primary_key_index: None,
            max_length: None,
            range: None,
        }
    }

    #[must_use]
    pub fn primary_key(mut self, index: usize) -> Self {
        self.primary_key_index = Some(index);
        self.nullable = false;
        self.updatable = false;
        self
    }

    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub const fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    #[must_use]
    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }
}
