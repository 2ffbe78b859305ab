//! Totally ordered index keys.
//!
//! `FieldValue` has no `Ord` (floats), so indexes wrap the indexable subset
//! in a key type with a total order: reals order by `total_cmp`, and keys
//! of different kinds order by a fixed kind rank. Null is indexable and
//! sorts before everything, so null-valued records stay findable through
//! an equality lookup on null.

use silodb_codec::FieldValue;
use std::cmp::Ordering;

/// An indexable field value with a total order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey(FieldValue);

impl IndexKey {
    /// Wraps a value, if its kind is indexable.
    ///
    /// Lists, dictionaries, documents and references are not indexable;
    /// clauses over them always scan.
    #[must_use]
    pub fn try_new(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null
            | FieldValue::Bool(_)
            | FieldValue::Int(_)
            | FieldValue::UInt(_)
            | FieldValue::Real(_)
            | FieldValue::Text(_)
            | FieldValue::Bytes(_) => Some(Self(value.clone())),
            _ => None,
        }
    }

    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.0
    }

    fn rank(&self) -> u8 {
        match self.0 {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) | FieldValue::UInt(_) | FieldValue::Real(_) => 2,
            FieldValue::Text(_) => 3,
            FieldValue::Bytes(_) => 4,
            _ => u8::MAX,
        }
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use FieldValue::{Bool, Bytes, Int, Real, Text, UInt};
        match (&self.0, &other.0) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (UInt(a), UInt(b)) => a.cmp(b),
            (Real(a), Real(b)) => a.total_cmp(b),
            (Int(a), UInt(b)) => cmp_int_uint(*a, *b),
            (UInt(a), Int(b)) => cmp_int_uint(*b, *a).reverse(),
            (Real(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Int(a), Real(b)) => (*a as f64).total_cmp(b),
            (Real(a), UInt(b)) => a.total_cmp(&(*b as f64)),
            (UInt(a), Real(b)) => (*a as f64).total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn cmp_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: FieldValue) -> IndexKey {
        IndexKey::try_new(&v).unwrap()
    }

    #[test]
    fn numeric_ordering_is_cross_kind() {
        assert!(key(FieldValue::Int(1)) < key(FieldValue::UInt(2)));
        assert_eq!(
            key(FieldValue::Int(3)).cmp(&key(FieldValue::Real(3.0))),
            Ordering::Equal
        );
        assert!(key(FieldValue::Int(-1)) < key(FieldValue::UInt(0)));
    }

    #[test]
    fn null_sorts_first() {
        assert!(key(FieldValue::Null) < key(FieldValue::Bool(false)));
        assert!(key(FieldValue::Null) < key(FieldValue::Int(i64::MIN)));
        assert!(key(FieldValue::Null) < key(FieldValue::Text(String::new())));
    }

    #[test]
    fn nan_has_a_stable_position() {
        let nan = key(FieldValue::Real(f64::NAN));
        assert_eq!(nan.cmp(&nan), Ordering::Equal);
        assert!(key(FieldValue::Real(1.0)) < nan);
    }

    #[test]
    fn complex_values_are_not_indexable() {
        assert!(IndexKey::try_new(&FieldValue::List(vec![])).is_none());
        assert!(IndexKey::try_new(&FieldValue::Dict(vec![])).is_none());
        assert!(IndexKey::try_new(&FieldValue::RefList(vec![])).is_none());
    }
}
