//! Typed query surface.
//!
//! Callers build a [`FilterExpr`] with the combinators here; the translator
//! lowers it to a [`Criteria`](crate::criteria::Criteria) tree, or rejects
//! it with `UnsupportedPredicate` so no filter is ever silently evaluated
//! in memory.

pub mod translator;

pub use translator::translate;

use crate::criteria::CriteriaOp;
use silodb_codec::FieldValue;

/// A filter expression over one type's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// A field (or reference path, innermost segment last).
    Field(Vec<String>),
    /// A literal value.
    Literal(FieldValue),
    /// A comparison between two subexpressions.
    Compare(CriteriaOp, Box<FilterExpr>, Box<FilterExpr>),
    /// Logical negation.
    Not(Box<FilterExpr>),
    /// Both sides must hold.
    And(Box<FilterExpr>, Box<FilterExpr>),
    /// Either side may hold.
    Or(Box<FilterExpr>, Box<FilterExpr>),
    /// Case-insensitive override for the wrapped comparison.
    IgnoreCase(Box<FilterExpr>),
}

/// A single-segment field reference.
#[must_use]
pub fn field(name: impl Into<String>) -> FilterExpr {
    FilterExpr::Field(vec![name.into()])
}

/// A reference-path field reference (`path(["Home", "City"])` addresses
/// the `City` field of the object referenced by `Home`).
#[must_use]
pub fn path<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> FilterExpr {
    FilterExpr::Field(segments.into_iter().map(Into::into).collect())
}

/// A literal.
#[must_use]
pub fn lit(value: impl Into<FieldValue>) -> FilterExpr {
    FilterExpr::Literal(value.into())
}

impl FilterExpr {
    fn cmp(self, op: CriteriaOp, rhs: FilterExpr) -> Self {
        Self::Compare(op, Box::new(self), Box::new(rhs))
    }

    /// Equality comparison.
    #[must_use]
    pub fn eq(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::Equal, rhs)
    }

    /// Inequality comparison.
    #[must_use]
    pub fn ne(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::NotEqual, rhs)
    }

    /// Less-than comparison.
    #[must_use]
    pub fn lt(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::LessThan, rhs)
    }

    /// Less-or-equal comparison.
    #[must_use]
    pub fn le(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::LessOrEqual, rhs)
    }

    /// Greater-than comparison.
    #[must_use]
    pub fn gt(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::GreaterThan, rhs)
    }

    /// Greater-or-equal comparison.
    #[must_use]
    pub fn ge(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::GreaterOrEqual, rhs)
    }

    /// Text prefix test.
    #[must_use]
    pub fn starts_with(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::StartsWith, rhs)
    }

    /// Text suffix test.
    #[must_use]
    pub fn ends_with(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::EndsWith, rhs)
    }

    /// Substring or collection membership test.
    #[must_use]
    pub fn contains(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::Contains, rhs)
    }

    /// Dictionary key membership test.
    #[must_use]
    pub fn contains_key(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::ContainsKey, rhs)
    }

    /// Dictionary value membership test.
    #[must_use]
    pub fn contains_value(self, rhs: FilterExpr) -> Self {
        self.cmp(CriteriaOp::ContainsValue, rhs)
    }

    /// Logical AND.
    #[must_use]
    pub fn and(self, rhs: FilterExpr) -> Self {
        Self::And(Box::new(self), Box::new(rhs))
    }

    /// Logical OR.
    #[must_use]
    pub fn or(self, rhs: FilterExpr) -> Self {
        Self::Or(Box::new(self), Box::new(rhs))
    }

    /// Logical negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Case-insensitive override for this comparison.
    #[must_use]
    pub fn ignore_case(self) -> Self {
        Self::IgnoreCase(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinators_build_the_expected_tree() {
        let expr = field("Age").gt(lit(18)).and(field("Name").eq(lit("Ada")));
        let FilterExpr::And(left, right) = expr else {
            panic!("expected And");
        };
        assert!(matches!(*left, FilterExpr::Compare(CriteriaOp::GreaterThan, _, _)));
        assert!(matches!(*right, FilterExpr::Compare(CriteriaOp::Equal, _, _)));
    }

    #[test]
    fn path_builds_multi_segment_field() {
        let expr = path(["Home", "City"]);
        assert_eq!(
            expr,
            FilterExpr::Field(vec!["Home".into(), "City".into()])
        );
    }
}
