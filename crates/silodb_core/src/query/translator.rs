//! Filter-to-criteria translation.
//!
//! The translator is deliberately closed-world: a filter either lowers to
//! a criteria tree the engine can resolve against files and indexes, or
//! the whole query fails with `UnsupportedPredicate`. Nothing ever falls
//! back to loading all objects and filtering in memory.

use super::FilterExpr;
use crate::criteria::{Criteria, CriteriaOp, WhereClause};
use crate::error::{DbError, DbResult};
use silodb_codec::FieldValue;

/// Lowers a filter expression over `type_name` into a criteria tree.
///
/// Bare boolean fields normalize to explicit comparisons: `field("Active")`
/// becomes `Active == true`, and `field("Active").negate()` becomes
/// `Active == false`, in both leaf and `and`/`or` positions.
///
/// # Errors
///
/// Returns `UnsupportedPredicate` for shapes with no criteria translation:
/// literal-only comparisons, field-to-field comparisons, negation of
/// text or collection operators, and case overrides on non-comparisons.
pub fn translate(type_name: &str, expr: &FilterExpr) -> DbResult<Criteria> {
    match expr {
        FilterExpr::And(left, right) => Ok(translate(type_name, left)?
            .and(translate(type_name, right)?)),
        FilterExpr::Or(left, right) => Ok(translate(type_name, left)?
            .or(translate(type_name, right)?)),
        FilterExpr::Field(path) => Ok(bool_clause(type_name, path, true)),
        FilterExpr::Not(inner) => translate_not(type_name, inner),
        FilterExpr::Compare(op, left, right) => {
            translate_compare(type_name, *op, left, right, None)
        }
        FilterExpr::IgnoreCase(inner) => match inner.as_ref() {
            FilterExpr::Compare(op, left, right) => {
                translate_compare(type_name, *op, left, right, Some(false))
            }
            _ => Err(DbError::unsupported_predicate(
                "case override applies only to a comparison",
            )),
        },
        FilterExpr::Literal(_) => Err(DbError::unsupported_predicate(
            "a literal is not a predicate",
        )),
    }
}

fn translate_not(type_name: &str, inner: &FilterExpr) -> DbResult<Criteria> {
    match inner {
        FilterExpr::Field(path) => Ok(bool_clause(type_name, path, false)),
        FilterExpr::Not(inner) => translate(type_name, inner),
        FilterExpr::Compare(op, left, right) => {
            let negated = op.negated().ok_or_else(|| {
                DbError::unsupported_predicate(format!("cannot negate {op:?}"))
            })?;
            translate_compare(type_name, negated, left, right, None)
        }
        _ => Err(DbError::unsupported_predicate(
            "negation applies only to fields and comparisons",
        )),
    }
}

fn translate_compare(
    type_name: &str,
    op: CriteriaOp,
    left: &FilterExpr,
    right: &FilterExpr,
    case_override: Option<bool>,
) -> DbResult<Criteria> {
    let (path, literal, op) = match (left, right) {
        (FilterExpr::Field(path), FilterExpr::Literal(value)) => (path, value.clone(), op),
        (FilterExpr::Literal(value), FilterExpr::Field(path)) => {
            let flipped = flip(op).ok_or_else(|| {
                DbError::unsupported_predicate(format!(
                    "{op:?} requires the field on the left-hand side"
                ))
            })?;
            (path, value.clone(), flipped)
        }
        (FilterExpr::Literal(_), FilterExpr::Literal(_)) => {
            return Err(DbError::unsupported_predicate(
                "comparison between two literals",
            ))
        }
        (FilterExpr::Field(_), FilterExpr::Field(_)) => {
            return Err(DbError::unsupported_predicate(
                "comparison between two fields",
            ))
        }
        _ => {
            return Err(DbError::unsupported_predicate(
                "comparison operands must be a field and a literal",
            ))
        }
    };

    let mut clause = WhereClause::with_path(type_name, path.clone(), op, literal);
    clause.case_sensitive = case_override;
    Ok(Criteria::Where(clause))
}

/// Mirrors an operator across swapped operands.
fn flip(op: CriteriaOp) -> Option<CriteriaOp> {
    match op {
        CriteriaOp::Equal | CriteriaOp::NotEqual => Some(op),
        CriteriaOp::LessThan => Some(CriteriaOp::GreaterThan),
        CriteriaOp::LessOrEqual => Some(CriteriaOp::GreaterOrEqual),
        CriteriaOp::GreaterThan => Some(CriteriaOp::LessThan),
        CriteriaOp::GreaterOrEqual => Some(CriteriaOp::LessOrEqual),
        _ => None,
    }
}

fn bool_clause(type_name: &str, path: &[String], expected: bool) -> Criteria {
    Criteria::Where(WhereClause::with_path(
        type_name,
        path.to_vec(),
        CriteriaOp::Equal,
        FieldValue::Bool(expected),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{field, lit, path};

    #[test]
    fn simple_comparison() {
        let criteria = translate("Person", &field("Age").gt(lit(18))).unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.type_name, "Person");
        assert_eq!(clause.path, vec!["Age".to_string()]);
        assert_eq!(clause.op, CriteriaOp::GreaterThan);
        assert_eq!(clause.value, FieldValue::Int(18));
    }

    #[test]
    fn literal_on_the_left_flips() {
        let criteria = translate(
            "Person",
            &lit(18).lt(field("Age")),
        )
        .unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.op, CriteriaOp::GreaterThan);
        assert_eq!(clause.value, FieldValue::Int(18));
    }

    #[test]
    fn bare_bool_field_normalizes_to_eq_true() {
        let criteria = translate("Person", &field("Active")).unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.op, CriteriaOp::Equal);
        assert_eq!(clause.value, FieldValue::Bool(true));
    }

    #[test]
    fn bare_bool_inside_and_normalizes_too() {
        let expr = field("Active").and(field("Age").ge(lit(18)));
        let criteria = translate("Person", &expr).unwrap();
        let Criteria::And(left, _) = criteria else {
            panic!("expected And");
        };
        let Criteria::Where(clause) = *left else {
            panic!("expected leaf");
        };
        assert_eq!(clause.value, FieldValue::Bool(true));
    }

    #[test]
    fn negated_field_normalizes_to_eq_false() {
        let criteria = translate("Person", &field("Active").negate()).unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.value, FieldValue::Bool(false));
    }

    #[test]
    fn negated_comparison_inverts_the_operator() {
        let criteria =
            translate("Person", &field("Age").lt(lit(18)).negate()).unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.op, CriteriaOp::GreaterOrEqual);
    }

    #[test]
    fn double_negation_cancels() {
        let criteria =
            translate("Person", &field("Age").lt(lit(18)).negate().negate()).unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.op, CriteriaOp::LessThan);
    }

    #[test]
    fn reference_paths_survive_translation() {
        let criteria = translate(
            "Person",
            &path(["Home", "City"]).eq(lit("Berlin")),
        )
        .unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.path, vec!["Home".to_string(), "City".to_string()]);
    }

    #[test]
    fn ignore_case_sets_the_clause_flag() {
        let criteria = translate(
            "Person",
            &field("Name").eq(lit("alice")).ignore_case(),
        )
        .unwrap();
        let Criteria::Where(clause) = criteria else {
            panic!("expected leaf");
        };
        assert_eq!(clause.case_sensitive, Some(false));
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(matches!(
            translate("P", &lit(1).eq(lit(1))),
            Err(DbError::UnsupportedPredicate(_))
        ));
        assert!(matches!(
            translate("P", &field("A").eq(field("B"))),
            Err(DbError::UnsupportedPredicate(_))
        ));
        assert!(matches!(
            translate("P", &field("Name").contains(lit("x")).negate()),
            Err(DbError::UnsupportedPredicate(_))
        ));
        assert!(matches!(
            translate("P", &lit(true)),
            Err(DbError::UnsupportedPredicate(_))
        ));
        assert!(matches!(
            translate("P", &lit("x").starts_with(field("Name"))),
            Err(DbError::UnsupportedPredicate(_))
        ));
    }
}
