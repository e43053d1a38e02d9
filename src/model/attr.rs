//! Tri-state optional values.
//!
//! A plain `Option` cannot tell "not computed yet" from "absent", and the
//! environment merge relies on both of those being distinct from an empty value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An optional attribute that is either not yet known, absent, or known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr<T> {
    /// The value is not known yet (planned but not computed).
    Unset,
    /// The attribute is absent.
    Null,
    /// The attribute has a known value.
    Value(T),
}

impl<T> Attr<T> {
    /// Returns true for [`Attr::Null`] and [`Attr::Unset`].
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    /// Returns the known value, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unset | Self::Null => None,
        }
    }
}

impl<T> Default for Attr<T> {
    fn default() -> Self {
        Self::Null
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

// Persisted records only ever hold `Null` or `Value`; `Unset` is written as null.
impl<T: Serialize> Serialize for Attr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_value().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Attr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}
