//! Identity types accepted by the generic entity contract.
//!
//! # Responsibility
//! - Define how keys are generated, persisted and parsed back.
//!
//! # Invariants
//! - `Default` is the zero value; a zero key means "not persisted yet".
//! - `to_column` and `parse_column` are inverse for every valid key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Key type usable as `Entity::Key`.
pub trait EntityKey:
    Clone
    + Default
    + PartialEq
    + Eq
    + Hash
    + Debug
    + Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Whether store-generated values are drawn from the per-kind sequence.
    const SEQUENCED: bool;

    /// Builds a store-generated key.
    ///
    /// `sequence` is the freshly reserved sequence value for sequenced keys and
    /// `0` otherwise. Returns `None` when the value does not fit the key type.
    fn generate(sequence: i64) -> Option<Self>;

    /// Text form stored in `entities.id`.
    fn to_column(&self) -> String;

    /// Parses the text form stored in `entities.id`.
    fn parse_column(value: &str) -> Option<Self>;

    /// Returns whether this key is the zero value.
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

macro_rules! integer_key {
    ($($ty:ty),*) => {
        $(
            impl EntityKey for $ty {
                const SEQUENCED: bool = true;

                fn generate(sequence: i64) -> Option<Self> {
                    <$ty>::try_from(sequence).ok().filter(|value| *value > 0)
                }

                fn to_column(&self) -> String {
                    self.to_string()
                }

                fn parse_column(value: &str) -> Option<Self> {
                    value.parse().ok()
                }
            }
        )*
    };
}

integer_key!(i32, i64);

impl EntityKey for Uuid {
    const SEQUENCED: bool = false;

    fn generate(_sequence: i64) -> Option<Self> {
        Some(Uuid::new_v4())
    }

    fn to_column(&self) -> String {
        self.to_string()
    }

    fn parse_column(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKey;
    use uuid::Uuid;

    #[test]
    fn integer_keys_reject_non_positive_sequences() {
        assert_eq!(<i64 as EntityKey>::generate(7), Some(7));
        assert_eq!(<i64 as EntityKey>::generate(0), None);
        assert_eq!(<i32 as EntityKey>::generate(i64::from(i32::MAX) + 1), None);
    }

    #[test]
    fn uuid_keys_are_random_and_parse_back() {
        let key = <Uuid as EntityKey>::generate(0).unwrap();
        assert!(!key.is_zero());
        assert_eq!(Uuid::parse_column(&key.to_column()), Some(key));
    }

    #[test]
    fn zero_value_is_default() {
        assert!(0_i32.is_zero());
        assert!(Uuid::nil().is_zero());
        assert!(!5_i64.is_zero());
    }
}
