use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// ValueType
///
/// Declared value class of an attribute. Every write into an entity is
/// checked against the declared type of the target attribute.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum ValueType {
    Bool,
    Int,
    Uint,
    Text,
    Blob,
}

///
/// Value
///
/// A single attribute value. Variants cover the scalar classes the mapping
/// layer moves to and from a relational store; SQL NULL is represented by
/// [`Slot::Null`], never by a `Value` variant.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// The declared type this value satisfies.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Uint(_) => ValueType::Uint,
            Self::Text(_) => ValueType::Text,
            Self::Blob(_) => ValueType::Blob,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self { Some(*v) } else { None }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(v) = self { Some(*v) } else { None }
    }

    #[must_use]
    pub const fn as_uint(&self) -> Option<u64> {
        if let Self::Uint(v) = self { Some(*v) } else { None }
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_blob(&self) -> Option<&[u8]> {
        if let Self::Blob(b) = self {
            Some(b.as_slice())
        } else {
            None
        }
    }

    /// Character count for length validation; blobs validate byte length.
    #[must_use]
    pub fn length(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.chars().count()),
            Self::Blob(b) => Some(b.len()),
            _ => None,
        }
    }

    /// Stable rank used for cross-variant canonical ordering.
    const fn canonical_rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Uint(_) => 2,
            Self::Text(_) => 3,
            Self::Blob(_) => 4,
        }
    }

    /// Total comparator used by ordering surfaces (ORDER BY).
    ///
    /// Same-variant values compare naturally; mixed variants fall back to
    /// a stable variant rank so sorting never panics.
    #[must_use]
    pub fn canonical_cmp(left: &Self, right: &Self) -> Ordering {
        match (left, right) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Uint(a), Self::Uint(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.cmp(b),
            _ => left.canonical_rank().cmp(&right.canonical_rank()),
        }
    }
}

// NOTE: partial_cmp only orders identical variants; cross-variant
// comparison yields None. Use canonical_cmp for total-order surfaces.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Uint(a), Self::Uint(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.partial_cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

/// Implements `From<T> for Value` for simple conversions
macro_rules! impl_value_from {
    ( $( $ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    }
}

impl_value_from! {
    bool    => Bool,
    i8      => Int,
    i16     => Int,
    i32     => Int,
    i64     => Int,
    u8      => Uint,
    u16     => Uint,
    u32     => Uint,
    u64     => Uint,
    &str    => Text,
    String  => Text,
    Vec<u8> => Blob,
}

///
/// Slot
///
/// Present state of an attribute inside an entity's value map. Absence
/// from the map is the third state ("never set"); a stored entry is either
/// an explicit null or a value. Public APIs speak `Option<Value>` and use
/// `contains` to distinguish unset from present-null.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Slot {
    Null,
    Value(Value),
}

impl Slot {
    #[must_use]
    pub fn from_option(value: Option<Value>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }

    #[must_use]
    pub const fn as_option(&self) -> Option<&Value> {
        match self {
            Self::Null => None,
            Self::Value(v) => Some(v),
        }
    }

    #[must_use]
    pub fn into_option(self) -> Option<Value> {
        match self {
            Self::Null => None,
            Self::Value(v) => Some(v),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_matches_variant() {
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
        assert_eq!(Value::from(-3i64).value_type(), ValueType::Int);
        assert_eq!(Value::from(3u64).value_type(), ValueType::Uint);
        assert_eq!(Value::from("x").value_type(), ValueType::Text);
        assert_eq!(Value::from(vec![1u8]).value_type(), ValueType::Blob);
    }

    #[test]
    fn partial_cmp_is_same_variant_only() {
        assert_eq!(
            Value::Int(1).partial_cmp(&Value::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(1).partial_cmp(&Value::Uint(2)), None);
        assert_eq!(Value::Text("a".into()).partial_cmp(&Value::Bool(true)), None);
    }

    #[test]
    fn canonical_cmp_is_total() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Int(4),
            Value::Bool(false),
            Value::Int(-1),
            Value::Uint(9),
        ];
        values.sort_by(|a, b| Value::canonical_cmp(a, b));
        assert_eq!(
            values,
            vec![
                Value::Bool(false),
                Value::Int(-1),
                Value::Int(4),
                Value::Uint(9),
                Value::Text("b".into()),
            ]
        );
    }

    #[test]
    fn slot_round_trips_option() {
        assert_eq!(Slot::from_option(None), Slot::Null);
        assert_eq!(
            Slot::from_option(Some(Value::Int(1))),
            Slot::Value(Value::Int(1))
        );
        assert_eq!(Slot::Null.into_option(), None);
        assert_eq!(Slot::Value(Value::Int(1)).into_option(), Some(Value::Int(1)));
    }

    #[test]
    fn serde_round_trip() {
        let value = Value::Text("héllo".into());
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);

        let json = serde_json::to_string(&Slot::Null).unwrap();
        let slot: Slot = serde_json::from_str(&json).unwrap();
        assert!(slot.is_null());
    }

    #[test]
    fn text_length_counts_chars() {
        assert_eq!(Value::from("héllo").length(), Some(5));
        assert_eq!(Value::from(vec![0u8; 3]).length(), Some(3));
        assert_eq!(Value::Int(7).length(), None);
    }
}
