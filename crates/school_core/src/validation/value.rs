//! Property value capabilities used by validation rules.

use crate::model::key::EntityKey;
use uuid::Uuid;

/// Values that can be absent in the sense of a mandatory rule.
pub trait Presence {
    /// Whether the value counts as not supplied.
    fn is_missing(&self) -> bool;
}

impl Presence for String {
    fn is_missing(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Presence for bool {
    fn is_missing(&self) -> bool {
        !*self
    }
}

impl Presence for Uuid {
    fn is_missing(&self) -> bool {
        self.is_nil()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_missing(&self) -> bool {
        self.as_ref().map_or(true, Presence::is_missing)
    }
}

impl<T> Presence for Vec<T> {
    fn is_missing(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! numeric_presence {
    ($($ty:ty),*) => {
        $(
            impl Presence for $ty {
                fn is_missing(&self) -> bool {
                    *self == <$ty>::default()
                }
            }
        )*
    };
}

numeric_presence!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

/// Property values that may reference a row with key type `K`.
pub trait KeyOf<K: EntityKey> {
    /// The referenced key, `None` when the property holds no reference.
    fn referenced_key(&self) -> Option<K>;
}

impl<K: EntityKey> KeyOf<K> for K {
    fn referenced_key(&self) -> Option<K> {
        Some(self.clone())
    }
}

impl<K: EntityKey> KeyOf<K> for Option<K> {
    fn referenced_key(&self) -> Option<K> {
        self.clone()
    }
}
