//! Criteria engine: WHERE / AND / OR clauses over one type's records.
//!
//! A criteria tree resolves to a sorted set of OIDs. Leaves are
//! [`WhereClause`]s; interior nodes combine their children's OID sets with
//! the intersection and union algebra in this module. Resolution itself
//! lives on the engine, which owns the files and indexes the leaves read.

pub mod compare;
pub mod matches;

use crate::types::Oid;
use silodb_codec::FieldValue;

/// Comparison operator of a WHERE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaOp {
    /// Equality; the only operator under which null matches (null) .
    Equal,
    /// Inequality.
    NotEqual,
    /// Strictly less than.
    LessThan,
    /// Less than or equal.
    LessOrEqual,
    /// Strictly greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Text prefix match.
    StartsWith,
    /// Text suffix match.
    EndsWith,
    /// Text substring match, or list membership for list-kinded fields.
    Contains,
    /// Dictionary key membership.
    ContainsKey,
    /// Dictionary value membership.
    ContainsValue,
}

impl CriteriaOp {
    /// The operator selecting the complementary records, where one exists.
    #[must_use]
    pub fn negated(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::NotEqual),
            Self::NotEqual => Some(Self::Equal),
            Self::LessThan => Some(Self::GreaterOrEqual),
            Self::LessOrEqual => Some(Self::GreaterThan),
            Self::GreaterThan => Some(Self::LessOrEqual),
            Self::GreaterOrEqual => Some(Self::LessThan),
            _ => None,
        }
    }

    /// Returns true for the ordering operators.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::LessOrEqual | Self::GreaterThan | Self::GreaterOrEqual
        )
    }
}

/// The field name criteria use to address the record's OID itself rather
/// than a stored field.
pub const OID_FIELD: &str = "OID";

/// One leaf predicate over a field (or field path) of a type.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// The type the clause ranges over.
    pub type_name: String,
    /// Field path; more than one segment walks reference fields, innermost
    /// segment last.
    pub path: Vec<String>,
    /// Comparison operator.
    pub op: CriteriaOp,
    /// The literal compared against.
    pub value: FieldValue,
    /// Per-clause case-sensitivity override for text comparisons; `None`
    /// uses the database default.
    pub case_sensitive: Option<bool>,
}

impl WhereClause {
    /// Creates a single-field clause.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        field: impl Into<String>,
        op: CriteriaOp,
        value: FieldValue,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            path: vec![field.into()],
            op,
            value,
            case_sensitive: None,
        }
    }

    /// Creates a clause over a reference path.
    #[must_use]
    pub fn with_path(
        type_name: impl Into<String>,
        path: Vec<String>,
        op: CriteriaOp,
        value: FieldValue,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            path,
            op,
            value,
            case_sensitive: None,
        }
    }

    /// Overrides case sensitivity for this clause.
    #[must_use]
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = Some(yes);
        self
    }

    /// Returns true when the clause addresses the OID pseudo-field.
    #[must_use]
    pub fn is_oid_clause(&self) -> bool {
        self.path.len() == 1 && self.path[0] == OID_FIELD
    }
}

/// A criteria tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// A leaf predicate.
    Where(WhereClause),
    /// Both sides must match.
    And(Box<Criteria>, Box<Criteria>),
    /// Either side may match.
    Or(Box<Criteria>, Box<Criteria>),
}

impl Criteria {
    /// Combines two criteria with AND.
    #[must_use]
    pub fn and(self, other: Criteria) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Combines two criteria with OR.
    #[must_use]
    pub fn or(self, other: Criteria) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// The type every leaf of this tree ranges over.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Where(clause) => &clause.type_name,
            Self::And(left, _) | Self::Or(left, _) => left.type_name(),
        }
    }
}

impl From<WhereClause> for Criteria {
    fn from(clause: WhereClause) -> Self {
        Self::Where(clause)
    }
}

/// Intersects two sorted OID sets.
///
/// Walks the smaller set and binary-searches the larger, so the cost is
/// `small * log(large)`; the output inherits the smaller set's order and
/// stays sorted.
#[must_use]
pub fn intersect_sorted(a: Vec<Oid>, b: Vec<Oid>) -> Vec<Oid> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .into_iter()
        .filter(|oid| large.binary_search(oid).is_ok())
        .collect()
}

/// Unions two sorted OID sets.
///
/// Starts from the larger set and binary-searches it for each element of
/// the smaller, appending only the misses, then restores order with a final
/// sort.
#[must_use]
pub fn union_sorted(a: Vec<Oid>, b: Vec<Oid>) -> Vec<Oid> {
    let (small, mut large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    for oid in small {
        if large.binary_search(&oid).is_err() {
            large.push(oid);
        }
    }
    large.sort_unstable();
    large
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oids(raw: &[u32]) -> Vec<Oid> {
        raw.iter().copied().map(Oid::new).collect()
    }

    #[test]
    fn intersect_keeps_common_sorted() {
        let result = intersect_sorted(oids(&[1, 3, 5, 7]), oids(&[2, 3, 4, 5, 9]));
        assert_eq!(result, oids(&[3, 5]));
    }

    #[test]
    fn intersect_with_empty() {
        assert!(intersect_sorted(oids(&[]), oids(&[1, 2])).is_empty());
        assert!(intersect_sorted(oids(&[1, 2]), oids(&[])).is_empty());
    }

    #[test]
    fn union_deduplicates_and_sorts() {
        let result = union_sorted(oids(&[1, 3, 5]), oids(&[2, 3, 6]));
        assert_eq!(result, oids(&[1, 2, 3, 5, 6]));
    }

    #[test]
    fn union_with_empty() {
        assert_eq!(union_sorted(oids(&[]), oids(&[4, 8])), oids(&[4, 8]));
    }

    #[test]
    fn negated_operators() {
        assert_eq!(CriteriaOp::Equal.negated(), Some(CriteriaOp::NotEqual));
        assert_eq!(
            CriteriaOp::LessThan.negated(),
            Some(CriteriaOp::GreaterOrEqual)
        );
        assert_eq!(CriteriaOp::StartsWith.negated(), None);
    }

    #[test]
    fn criteria_tree_type_name() {
        let clause = WhereClause::new("Person", "Age", CriteriaOp::Equal, FieldValue::Int(1));
        let tree = Criteria::from(clause.clone()).and(Criteria::Where(clause));
        assert_eq!(tree.type_name(), "Person");
    }
}
