//! Criteria resolution against the open files and indexes.
//!
//! A criteria tree resolves to a sorted vector of live OIDs. AND and OR
//! nodes combine their children with the sorted-set algebra; leaves either
//! hit a field index or scan the type file one field slot at a time.
//! Reference paths resolve inside-out: the innermost clause runs on the
//! target type, then each enclosing hop keeps the records whose reference
//! field lands in the inner result set.

use super::Engine;
use crate::criteria::matches::matches;
use crate::criteria::{intersect_sorted, union_sorted, Criteria, CriteriaOp, WhereClause};
use crate::error::{DbError, DbResult};
use crate::types::{Oid, Tid};
use silodb_codec::{FieldValue, ObjectRef};

impl Engine {
    /// Resolves a criteria tree to the sorted OIDs of matching live
    /// records.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` for a stale type, `InvalidCriteria` for
    /// meaningless clauses, and storage or codec errors from scans. An
    /// unregistered type resolves to the empty set.
    pub fn resolve(&self, criteria: &Criteria) -> DbResult<Vec<Oid>> {
        match criteria {
            Criteria::Where(clause) => self.resolve_where(clause),
            Criteria::And(left, right) => Ok(intersect_sorted(
                self.resolve(left)?,
                self.resolve(right)?,
            )),
            Criteria::Or(left, right) => {
                Ok(union_sorted(self.resolve(left)?, self.resolve(right)?))
            }
        }
    }

    fn resolve_where(&self, clause: &WhereClause) -> DbResult<Vec<Oid>> {
        let Some(&tid) = self.by_name.get(&clause.type_name) else {
            return Ok(Vec::new());
        };
        self.ensure_not_stale(tid)?;
        let case = clause
            .case_sensitive
            .unwrap_or(self.config.string_compare_case_sensitive);

        if clause.is_oid_clause() {
            return self.resolve_oid_clause(tid, clause);
        }
        if clause.path.len() > 1 {
            return self.resolve_path_clause(tid, clause, case);
        }

        let info = self.file(tid)?.info();
        let field = info.field_index(&clause.path[0]).ok_or_else(|| {
            DbError::invalid_criteria(format!(
                "unknown field '{}.{}'",
                clause.type_name, clause.path[0]
            ))
        })?;
        let kind = info.fields()[field].kind;

        if let Some(hits) =
            self.indexes
                .try_lookup(tid, field, kind, clause.op, &clause.value, case)
        {
            return Ok(hits);
        }
        self.scan_field(tid, field, clause.op, &clause.value, case)
    }

    /// Scan fallback: reads one field slot per allocated record.
    fn scan_field(
        &self,
        tid: Tid,
        field: usize,
        op: CriteriaOp,
        literal: &FieldValue,
        case: bool,
    ) -> DbResult<Vec<Oid>> {
        let file = self.file(tid)?;
        let mut out = Vec::new();
        for raw_oid in 1..=file.info().number_of_records() {
            let oid = Oid::new(raw_oid);
            if !file.is_live(oid)? {
                continue;
            }
            let stored = file.read_field(oid, field, &self.pool).map_err(|e| {
                match e {
                    DbError::Codec(inner) => DbError::record_corrupted(
                        file.info().type_name(),
                        oid,
                        inner.to_string(),
                    ),
                    other => other,
                }
            })?;
            if matches(self, op, &stored, literal, case)? {
                out.push(oid);
            }
        }
        Ok(out)
    }

    /// OID pseudo-field arithmetic: compares record identity, never stored
    /// bytes, and only ever yields live records.
    fn resolve_oid_clause(&self, tid: Tid, clause: &WhereClause) -> DbResult<Vec<Oid>> {
        let target = match &clause.value {
            FieldValue::Int(n) if *n >= 0 => Some(*n as u64),
            FieldValue::Int(_) => Some(0),
            FieldValue::UInt(n) => Some(*n),
            FieldValue::Null => None,
            other => {
                return Err(DbError::invalid_criteria(format!(
                    "OID compared against non-numeric {} literal",
                    other.kind_name()
                )))
            }
        };

        let file = self.file(tid)?;
        let mut out = Vec::new();
        for raw_oid in 1..=file.info().number_of_records() {
            let keep = match (target, clause.op) {
                // an OID is never null, so only inequality matches
                (None, CriteriaOp::NotEqual) => true,
                (None, _) => false,
                (Some(t), CriteriaOp::Equal) => u64::from(raw_oid) == t,
                (Some(t), CriteriaOp::NotEqual) => u64::from(raw_oid) != t,
                (Some(t), CriteriaOp::LessThan) => u64::from(raw_oid) < t,
                (Some(t), CriteriaOp::LessOrEqual) => u64::from(raw_oid) <= t,
                (Some(t), CriteriaOp::GreaterThan) => u64::from(raw_oid) > t,
                (Some(t), CriteriaOp::GreaterOrEqual) => u64::from(raw_oid) >= t,
                _ => {
                    return Err(DbError::invalid_criteria(
                        "only comparison operators apply to OID",
                    ))
                }
            };
            let oid = Oid::new(raw_oid);
            if keep && file.is_live(oid)? {
                out.push(oid);
            }
        }
        Ok(out)
    }

    /// Reference-path clause: `["Address", "City"]` on `Person` runs the
    /// leaf predicate on the `Address` type, then keeps the persons whose
    /// `Address` field points at one of the matches.
    fn resolve_path_clause(
        &self,
        tid: Tid,
        clause: &WhereClause,
        case: bool,
    ) -> DbResult<Vec<Oid>> {
        // walk the hops outer-to-inner, recording (type, ref-field) pairs
        let mut hops: Vec<(Tid, usize)> = Vec::with_capacity(clause.path.len() - 1);
        let mut current = tid;
        for segment in &clause.path[..clause.path.len() - 1] {
            let info = self.file(current)?.info();
            let field = info.field_index(segment).ok_or_else(|| {
                DbError::invalid_criteria(format!(
                    "unknown field '{}.{}'",
                    info.type_name(),
                    segment
                ))
            })?;
            let field_info = &info.fields()[field];
            if !field_info.kind.is_complex() {
                return Err(DbError::invalid_criteria(format!(
                    "'{}.{}' is not a reference field",
                    info.type_name(),
                    segment
                )));
            }
            let target = field_info.target_type.as_deref().ok_or_else(|| {
                DbError::invalid_criteria(format!(
                    "reference field '{}.{}' has no declared target type",
                    info.type_name(),
                    segment
                ))
            })?;
            let Some(&next) = self.by_name.get(target) else {
                return Ok(Vec::new());
            };
            hops.push((current, field));
            current = next;
        }

        // the innermost type runs the leaf predicate directly
        let leaf = WhereClause {
            type_name: self
                .file(current)?
                .info()
                .type_name()
                .to_string(),
            path: vec![clause.path[clause.path.len() - 1].clone()],
            op: clause.op,
            value: clause.value.clone(),
            case_sensitive: Some(case),
        };
        let mut inner = self.resolve_where(&leaf)?;
        let mut inner_tid = current;

        // fold upward: each hop keeps records referencing the inner set
        for &(outer_tid, field) in hops.iter().rev() {
            let file = self.file(outer_tid)?;
            let mut outer = Vec::new();
            for raw_oid in 1..=file.info().number_of_records() {
                let oid = Oid::new(raw_oid);
                if !file.is_live(oid)? {
                    continue;
                }
                let stored = file.read_field(oid, field, &self.pool)?;
                if refs_into(&stored, inner_tid, &inner) {
                    outer.push(oid);
                }
            }
            inner = outer;
            inner_tid = outer_tid;
        }
        Ok(inner)
    }
}

/// Returns true when a stored reference value points at one of the sorted
/// target OIDs.
fn refs_into(stored: &FieldValue, target_tid: Tid, targets: &[Oid]) -> bool {
    let hit = |r: &ObjectRef| {
        !r.is_null()
            && r.tid == target_tid.as_u32()
            && targets.binary_search(&Oid::new(r.oid)).is_ok()
    };
    match stored {
        FieldValue::Ref(r) => hit(r),
        FieldValue::RefList(refs) => refs.iter().any(hit),
        FieldValue::Dict(entries) => entries.iter().any(|(_, v)| match v {
            FieldValue::Ref(r) => hit(r),
            _ => false,
        }),
        _ => false,
    }
}
