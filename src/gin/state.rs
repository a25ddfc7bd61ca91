use crate::gin::tuple::Category;
use std::cmp::Ordering;

/// The opaque collaborator that knows what an indexed value actually *is*.
///
/// The checker never interprets key bytes itself — a GIN index can hold
/// whatever the operator class packed into it — so every comparison the
/// walkers need is delegated here, the same way the teacher's B-tree access
/// method delegates key comparison to a caller-supplied comparator rather
/// than hardcoding one.
pub trait GinState {
    /// Which indexed column a key on `attnum` belongs to, for a
    /// multi-column index. Single-column indexes always return `0`.
    fn attr_of(&self, attnum: u16) -> u16;

    /// Order two keys belonging to the same attribute. Category dominates:
    /// ordinary keys sort by `key_cmp`, and the three sentinel categories
    /// sort after all ordinary keys in `NullKey < NullItem < EmptyItem` order
    /// regardless of what bytes they carry.
    fn compare(&self, attnum: u16, cat_a: Category, key_a: &[u8], cat_b: Category, key_b: &[u8]) -> Ordering;
}

/// A `GinState` for tests and for opaque-byte indexes where key order is
/// simply lexicographic order over the encoded bytes.
pub struct ByteOrderGinState;

impl GinState for ByteOrderGinState {
    fn attr_of(&self, _attnum: u16) -> u16 {
        0
    }

    fn compare(&self, _attnum: u16, cat_a: Category, key_a: &[u8], cat_b: Category, key_b: &[u8]) -> Ordering {
        match (cat_a == Category::Normal, cat_b == Category::Normal) {
            (true, true) => key_a.cmp(key_b),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => cat_a.cmp(&cat_b),
        }
    }
}
