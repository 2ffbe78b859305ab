//! In-memory field indexes.
//!
//! Indexes are ordered maps from field value to the sorted set of OIDs
//! holding it, kept only in memory: they are rebuilt from the data files on
//! open and after recovery. The criteria engine consults them first and
//! falls back to a file scan when a clause's field or operator has no
//! index support.

mod key;

pub use key::IndexKey;

use crate::catalog::TypeInfo;
use crate::criteria::compare::coerce_to_kind;
use crate::criteria::CriteriaOp;
use crate::types::{Oid, Tid};
use silodb_codec::{FieldKind, FieldValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

type FieldIndex = BTreeMap<IndexKey, BTreeSet<u32>>;

/// All indexes of one database handle.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: HashMap<(Tid, usize), FieldIndex>,
}

impl IndexManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or clears) the index maps declared by a type's schema.
    pub fn register_type(&mut self, info: &TypeInfo) {
        for (i, field) in info.fields().iter().enumerate() {
            if field.indexed {
                self.indexes.insert((info.tid(), i), FieldIndex::new());
            }
        }
    }

    /// Drops every index of a type (before a rebuild or migration).
    pub fn clear_type(&mut self, tid: Tid) {
        self.indexes.retain(|(t, _), _| *t != tid);
    }

    /// Returns true if the field has an index.
    #[must_use]
    pub fn has_index(&self, tid: Tid, field: usize) -> bool {
        self.indexes.contains_key(&(tid, field))
    }

    /// Folds one record's new values into the indexes, removing the old
    /// values first when the record is being updated.
    pub fn apply_write(
        &mut self,
        info: &TypeInfo,
        oid: Oid,
        old: Option<&[FieldValue]>,
        new: &[FieldValue],
    ) {
        for (i, _) in info.fields().iter().enumerate().filter(|(_, f)| f.indexed) {
            let Some(index) = self.indexes.get_mut(&(info.tid(), i)) else {
                continue;
            };
            if let Some(old_values) = old {
                if let Some(value) = old_values.get(i) {
                    remove_entry(index, value, oid);
                }
            }
            if let Some(value) = new.get(i) {
                if let Some(key) = IndexKey::try_new(value) {
                    index.entry(key).or_default().insert(oid.as_u32());
                }
            }
        }
    }

    /// Removes one record's values from the indexes after a delete.
    pub fn apply_delete(&mut self, info: &TypeInfo, oid: Oid, old: &[FieldValue]) {
        for (i, _) in info.fields().iter().enumerate().filter(|(_, f)| f.indexed) {
            if let Some(index) = self.indexes.get_mut(&(info.tid(), i)) {
                if let Some(value) = old.get(i) {
                    remove_entry(index, value, oid);
                }
            }
        }
    }

    /// Attempts an index-assisted lookup for one clause.
    ///
    /// Returns `None` when the clause must fall back to a scan: no index on
    /// the field, an operator without index support, a case-insensitive
    /// text comparison, or an unindexable literal.
    #[must_use]
    pub fn try_lookup(
        &self,
        tid: Tid,
        field: usize,
        kind: FieldKind,
        op: CriteriaOp,
        literal: &FieldValue,
        case_sensitive: bool,
    ) -> Option<Vec<Oid>> {
        let index = self.indexes.get(&(tid, field))?;
        if matches!(literal, FieldValue::Text(_)) && !case_sensitive {
            return None;
        }
        let key = IndexKey::try_new(&coerce_to_kind(literal, kind))?;
        if literal.is_null() && op.is_ordering() {
            return Some(Vec::new());
        }

        let mut out: Vec<Oid> = match op {
            CriteriaOp::Equal => index
                .get(&key)
                .into_iter()
                .flatten()
                .copied()
                .map(Oid::new)
                .collect(),
            CriteriaOp::NotEqual => index
                .iter()
                .filter(|(k, _)| **k != key)
                .flat_map(|(_, oids)| oids.iter().copied())
                .map(Oid::new)
                .collect(),
            // null sorts below every real key, so lower-bounded ranges must
            // step over it: no ordering comparison matches a null field
            CriteriaOp::LessThan => {
                let null_key = IndexKey::try_new(&FieldValue::Null)?;
                range_oids(index, Bound::Excluded(&null_key), Bound::Excluded(&key))
            }
            CriteriaOp::LessOrEqual => {
                let null_key = IndexKey::try_new(&FieldValue::Null)?;
                range_oids(index, Bound::Excluded(&null_key), Bound::Included(&key))
            }
            CriteriaOp::GreaterThan => {
                range_oids(index, Bound::Excluded(&key), Bound::Unbounded)
            }
            CriteriaOp::GreaterOrEqual => {
                range_oids(index, Bound::Included(&key), Bound::Unbounded)
            }
            _ => return None,
        };
        out.sort_unstable();
        Some(out)
    }
}

fn remove_entry(index: &mut FieldIndex, value: &FieldValue, oid: Oid) {
    if let Some(key) = IndexKey::try_new(value) {
        if let Some(oids) = index.get_mut(&key) {
            oids.remove(&oid.as_u32());
            if oids.is_empty() {
                index.remove(&key);
            }
        }
    }
}

fn range_oids(
    index: &FieldIndex,
    lower: Bound<&IndexKey>,
    upper: Bound<&IndexKey>,
) -> Vec<Oid> {
    index
        .range((lower, upper))
        .flat_map(|(_, oids)| oids.iter().copied())
        .map(Oid::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDesc, TypeDesc, TypeKind};

    fn info() -> TypeInfo {
        let desc = TypeDesc::new(
            "Person",
            vec![
                FieldDesc::new("Name", FieldKind::Text).indexed(),
                FieldDesc::new("Age", FieldKind::Int).indexed(),
                FieldDesc::new("Note", FieldKind::Text),
            ],
        );
        TypeInfo::from_desc(&desc, Tid::new(1), TypeKind::User).unwrap()
    }

    fn values(name: &str, age: i64) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(name.into()),
            FieldValue::Int(age),
            FieldValue::Null,
        ]
    }

    fn manager_with_people() -> (IndexManager, TypeInfo) {
        let info = info();
        let mut mgr = IndexManager::new();
        mgr.register_type(&info);
        mgr.apply_write(&info, Oid::new(1), None, &values("Alice", 30));
        mgr.apply_write(&info, Oid::new(2), None, &values("Bob", 25));
        mgr.apply_write(&info, Oid::new(3), None, &values("Carol", 30));
        (mgr, info)
    }

    #[test]
    fn only_declared_fields_are_indexed() {
        let (mgr, info) = manager_with_people();
        assert!(mgr.has_index(info.tid(), 0));
        assert!(mgr.has_index(info.tid(), 1));
        assert!(!mgr.has_index(info.tid(), 2));
    }

    #[test]
    fn equality_lookup() {
        let (mgr, info) = manager_with_people();
        let hits = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::Equal,
                &FieldValue::Int(30),
                true,
            )
            .unwrap();
        assert_eq!(hits, vec![Oid::new(1), Oid::new(3)]);
    }

    #[test]
    fn range_lookups() {
        let (mgr, info) = manager_with_people();
        let hits = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::LessThan,
                &FieldValue::Int(30),
                true,
            )
            .unwrap();
        assert_eq!(hits, vec![Oid::new(2)]);

        let hits = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::GreaterOrEqual,
                &FieldValue::Int(25),
                true,
            )
            .unwrap();
        assert_eq!(hits, vec![Oid::new(1), Oid::new(2), Oid::new(3)]);
    }

    #[test]
    fn update_moves_the_entry() {
        let (mut mgr, info) = manager_with_people();
        let old = values("Bob", 25);
        mgr.apply_write(&info, Oid::new(2), Some(&old), &values("Bob", 31));

        let at_25 = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::Equal,
                &FieldValue::Int(25),
                true,
            )
            .unwrap();
        assert!(at_25.is_empty());

        let at_31 = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::Equal,
                &FieldValue::Int(31),
                true,
            )
            .unwrap();
        assert_eq!(at_31, vec![Oid::new(2)]);
    }

    #[test]
    fn delete_removes_the_entry() {
        let (mut mgr, info) = manager_with_people();
        mgr.apply_delete(&info, Oid::new(1), &values("Alice", 30));

        let hits = mgr
            .try_lookup(
                info.tid(),
                1,
                FieldKind::Int,
                CriteriaOp::Equal,
                &FieldValue::Int(30),
                true,
            )
            .unwrap();
        assert_eq!(hits, vec![Oid::new(3)]);
    }

    #[test]
    fn unsupported_lookups_fall_back_to_scan() {
        let (mgr, info) = manager_with_people();
        // no index on field 2
        assert!(mgr
            .try_lookup(
                info.tid(),
                2,
                FieldKind::Text,
                CriteriaOp::Equal,
                &FieldValue::Text("x".into()),
                true
            )
            .is_none());
        // string operator
        assert!(mgr
            .try_lookup(
                info.tid(),
                0,
                FieldKind::Text,
                CriteriaOp::StartsWith,
                &FieldValue::Text("A".into()),
                true
            )
            .is_none());
        // case-insensitive text equality
        assert!(mgr
            .try_lookup(
                info.tid(),
                0,
                FieldKind::Text,
                CriteriaOp::Equal,
                &FieldValue::Text("alice".into()),
                false
            )
            .is_none());
    }

    #[test]
    fn numeric_literal_coercion_hits_the_key_space() {
        let desc = TypeDesc::new(
            "T",
            vec![FieldDesc::new("N", FieldKind::UInt).indexed()],
        );
        let info = TypeInfo::from_desc(&desc, Tid::new(2), TypeKind::User).unwrap();
        let mut mgr = IndexManager::new();
        mgr.register_type(&info);
        mgr.apply_write(&info, Oid::new(1), None, &[FieldValue::UInt(7)]);

        let hits = mgr
            .try_lookup(
                info.tid(),
                0,
                FieldKind::UInt,
                CriteriaOp::Equal,
                &FieldValue::Int(7),
                true,
            )
            .unwrap();
        assert_eq!(hits, vec![Oid::new(1)]);
    }
}
