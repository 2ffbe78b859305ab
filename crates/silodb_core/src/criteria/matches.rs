//! Predicate evaluation for scan-path criteria.
//!
//! Given a stored field value and a clause's operator and literal, decides
//! whether the record matches. Reference-valued fields support structural
//! equality: the literal is a dictionary of field-name / expected-value
//! pairs evaluated against the referenced object, recursively for nested
//! references, with a visited set to terminate on cycles.

use super::compare::{
    compare_values, text_contains, text_ends_with, text_starts_with, values_equal,
};
use super::CriteriaOp;
use crate::error::{DbError, DbResult};
use silodb_codec::{FieldValue, ObjectRef};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Loads referenced objects for structural comparison during scans.
pub trait RefResolver {
    /// Returns the named field values of the referenced object, or `None`
    /// when the reference is null, dangling or tombstoned.
    ///
    /// # Errors
    ///
    /// Returns storage or codec errors.
    fn resolve_ref(&self, r: ObjectRef) -> DbResult<Option<Vec<(String, FieldValue)>>>;
}

/// Evaluates one predicate against a stored value.
///
/// # Errors
///
/// Returns `InvalidCriteria` for operator/kind combinations that have no
/// meaning, and propagates resolver errors.
pub fn matches(
    resolver: &dyn RefResolver,
    op: CriteriaOp,
    stored: &FieldValue,
    literal: &FieldValue,
    case_sensitive: bool,
) -> DbResult<bool> {
    let mut visited = HashSet::new();
    matches_inner(resolver, op, stored, literal, case_sensitive, &mut visited)
}

fn matches_inner(
    resolver: &dyn RefResolver,
    op: CriteriaOp,
    stored: &FieldValue,
    literal: &FieldValue,
    case_sensitive: bool,
    visited: &mut HashSet<ObjectRef>,
) -> DbResult<bool> {
    match op {
        CriteriaOp::Equal => equal(resolver, stored, literal, case_sensitive, visited),
        CriteriaOp::NotEqual => match (stored, literal) {
            (FieldValue::Null, FieldValue::Null) => Ok(false),
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(true),
            _ => Ok(!equal(resolver, stored, literal, case_sensitive, visited)?),
        },
        CriteriaOp::LessThan => Ok(ordering(stored, literal) == Some(Ordering::Less)),
        CriteriaOp::LessOrEqual => Ok(matches!(
            ordering(stored, literal),
            Some(Ordering::Less | Ordering::Equal)
        )),
        CriteriaOp::GreaterThan => Ok(ordering(stored, literal) == Some(Ordering::Greater)),
        CriteriaOp::GreaterOrEqual => Ok(matches!(
            ordering(stored, literal),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        CriteriaOp::StartsWith => text_op(stored, literal, |s, p| {
            text_starts_with(s, p, case_sensitive)
        }),
        CriteriaOp::EndsWith => text_op(stored, literal, |s, p| {
            text_ends_with(s, p, case_sensitive)
        }),
        CriteriaOp::Contains => contains(resolver, stored, literal, case_sensitive, visited),
        CriteriaOp::ContainsKey => match stored {
            FieldValue::Null => Ok(false),
            FieldValue::Dict(pairs) => Ok(pairs
                .iter()
                .any(|(key, _)| values_equal(key, literal, case_sensitive))),
            _ => Err(DbError::invalid_criteria(format!(
                "ContainsKey over {} field",
                stored.kind_name()
            ))),
        },
        CriteriaOp::ContainsValue => match stored {
            FieldValue::Null => Ok(false),
            FieldValue::Dict(pairs) => {
                for (_, value) in pairs {
                    if equal(resolver, value, literal, case_sensitive, visited)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(DbError::invalid_criteria(format!(
                "ContainsValue over {} field",
                stored.kind_name()
            ))),
        },
    }
}

fn ordering(stored: &FieldValue, literal: &FieldValue) -> Option<Ordering> {
    compare_values(stored, literal)
}

fn text_op(
    stored: &FieldValue,
    literal: &FieldValue,
    f: impl Fn(&str, &str) -> bool,
) -> DbResult<bool> {
    match (stored, literal) {
        (FieldValue::Null, _) => Ok(false),
        (FieldValue::Text(s), FieldValue::Text(p)) => Ok(f(s, p)),
        _ => Err(DbError::invalid_criteria(format!(
            "text operator over {} field with {} literal",
            stored.kind_name(),
            literal.kind_name()
        ))),
    }
}

fn equal(
    resolver: &dyn RefResolver,
    stored: &FieldValue,
    literal: &FieldValue,
    case_sensitive: bool,
    visited: &mut HashSet<ObjectRef>,
) -> DbResult<bool> {
    match (stored, literal) {
        (FieldValue::Ref(r), FieldValue::Dict(expected)) => {
            structural_eq(resolver, *r, expected, case_sensitive, visited)
        }
        _ => Ok(values_equal(stored, literal, case_sensitive)),
    }
}

/// Compares a referenced object against expected field values, field by
/// field. Revisiting a reference already on the comparison path terminates
/// that branch as a match, which keeps cyclic graphs from recursing
/// forever.
fn structural_eq(
    resolver: &dyn RefResolver,
    r: ObjectRef,
    expected: &[(FieldValue, FieldValue)],
    case_sensitive: bool,
    visited: &mut HashSet<ObjectRef>,
) -> DbResult<bool> {
    if r.is_null() {
        return Ok(false);
    }
    if !visited.insert(r) {
        return Ok(true);
    }
    let Some(fields) = resolver.resolve_ref(r)? else {
        return Ok(false);
    };
    for (key, want) in expected {
        let FieldValue::Text(name) = key else {
            return Err(DbError::invalid_criteria(
                "structural equality keys must be field names",
            ));
        };
        let Some((_, stored)) = fields.iter().find(|(n, _)| n == name) else {
            return Ok(false);
        };
        if !matches_inner(
            resolver,
            CriteriaOp::Equal,
            stored,
            want,
            case_sensitive,
            visited,
        )? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn contains(
    resolver: &dyn RefResolver,
    stored: &FieldValue,
    literal: &FieldValue,
    case_sensitive: bool,
    visited: &mut HashSet<ObjectRef>,
) -> DbResult<bool> {
    match stored {
        FieldValue::Null => Ok(false),
        FieldValue::Text(_) => text_op(stored, literal, |s, n| {
            text_contains(s, n, case_sensitive)
        }),
        FieldValue::List(items) => {
            for item in items {
                if equal(resolver, item, literal, case_sensitive, visited)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FieldValue::RefList(refs) => match literal {
            FieldValue::Ref(want) => Ok(refs.contains(want)),
            FieldValue::Dict(expected) => {
                for r in refs {
                    if structural_eq(resolver, *r, expected, case_sensitive, visited)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(DbError::invalid_criteria(
                "Contains over a reference list needs a reference or structural literal",
            )),
        },
        _ => Err(DbError::invalid_criteria(format!(
            "Contains over {} field",
            stored.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Resolver over a fixed set of objects.
    #[derive(Default)]
    struct FixedResolver {
        objects: HashMap<ObjectRef, Vec<(String, FieldValue)>>,
    }

    impl RefResolver for FixedResolver {
        fn resolve_ref(&self, r: ObjectRef) -> DbResult<Option<Vec<(String, FieldValue)>>> {
            Ok(self.objects.get(&r).cloned())
        }
    }

    fn check(op: CriteriaOp, stored: FieldValue, literal: FieldValue) -> bool {
        matches(&FixedResolver::default(), op, &stored, &literal, true).unwrap()
    }

    #[test]
    fn equality_and_ordering() {
        assert!(check(CriteriaOp::Equal, FieldValue::Int(4), FieldValue::Int(4)));
        assert!(check(
            CriteriaOp::LessThan,
            FieldValue::Int(3),
            FieldValue::Int(4)
        ));
        assert!(check(
            CriteriaOp::GreaterOrEqual,
            FieldValue::Real(4.0),
            FieldValue::Int(4)
        ));
        assert!(!check(
            CriteriaOp::GreaterThan,
            FieldValue::Int(3),
            FieldValue::Int(4)
        ));
    }

    #[test]
    fn null_rules() {
        assert!(check(CriteriaOp::Equal, FieldValue::Null, FieldValue::Null));
        assert!(!check(CriteriaOp::Equal, FieldValue::Null, FieldValue::Int(0)));
        assert!(check(CriteriaOp::NotEqual, FieldValue::Null, FieldValue::Int(0)));
        assert!(!check(CriteriaOp::NotEqual, FieldValue::Null, FieldValue::Null));
        assert!(!check(CriteriaOp::LessThan, FieldValue::Null, FieldValue::Int(9)));
        assert!(!check(
            CriteriaOp::StartsWith,
            FieldValue::Null,
            FieldValue::Text("x".into())
        ));
    }

    #[test]
    fn text_operators() {
        let name = FieldValue::Text("Alice".into());
        assert!(check(CriteriaOp::StartsWith, name.clone(), "Al".into()));
        assert!(check(CriteriaOp::EndsWith, name.clone(), "ice".into()));
        assert!(check(CriteriaOp::Contains, name.clone(), "lic".into()));
        assert!(!check(CriteriaOp::Contains, name, "xyz".into()));
    }

    #[test]
    fn list_and_dict_membership() {
        let list = FieldValue::List(vec![FieldValue::Int(1), FieldValue::Int(2)]);
        assert!(check(CriteriaOp::Contains, list.clone(), FieldValue::Int(2)));
        assert!(!check(CriteriaOp::Contains, list, FieldValue::Int(9)));

        let dict = FieldValue::Dict(vec![
            (FieldValue::Text("a".into()), FieldValue::Int(1)),
            (FieldValue::Text("b".into()), FieldValue::Int(2)),
        ]);
        assert!(check(CriteriaOp::ContainsKey, dict.clone(), "b".into()));
        assert!(check(CriteriaOp::ContainsValue, dict.clone(), FieldValue::Int(1)));
        assert!(!check(CriteriaOp::ContainsKey, dict, "z".into()));
    }

    #[test]
    fn structural_equality_over_references() {
        let mut resolver = FixedResolver::default();
        let home = ObjectRef::new(1, 2);
        resolver.objects.insert(
            home,
            vec![
                ("City".into(), FieldValue::Text("Berlin".into())),
                ("Zip".into(), FieldValue::Int(10115)),
            ],
        );

        let expected = FieldValue::Dict(vec![(
            FieldValue::Text("City".into()),
            FieldValue::Text("Berlin".into()),
        )]);
        assert!(matches(
            &resolver,
            CriteriaOp::Equal,
            &FieldValue::Ref(home),
            &expected,
            true
        )
        .unwrap());

        let wrong = FieldValue::Dict(vec![(
            FieldValue::Text("City".into()),
            FieldValue::Text("Paris".into()),
        )]);
        assert!(!matches(
            &resolver,
            CriteriaOp::Equal,
            &FieldValue::Ref(home),
            &wrong,
            true
        )
        .unwrap());
    }

    #[test]
    fn structural_equality_terminates_on_cycles() {
        let mut resolver = FixedResolver::default();
        let a = ObjectRef::new(1, 1);
        let b = ObjectRef::new(2, 1);
        resolver
            .objects
            .insert(a, vec![("Next".into(), FieldValue::Ref(b))]);
        resolver
            .objects
            .insert(b, vec![("Next".into(), FieldValue::Ref(a))]);

        // expected shape mirrors the cycle
        let expected = FieldValue::Dict(vec![(
            FieldValue::Text("Next".into()),
            FieldValue::Dict(vec![(
                FieldValue::Text("Next".into()),
                FieldValue::Dict(vec![]),
            )]),
        )]);
        assert!(matches(
            &resolver,
            CriteriaOp::Equal,
            &FieldValue::Ref(a),
            &expected,
            true
        )
        .unwrap());
    }

    #[test]
    fn dangling_reference_never_matches() {
        let resolver = FixedResolver::default();
        let expected = FieldValue::Dict(vec![]);
        assert!(!matches(
            &resolver,
            CriteriaOp::Equal,
            &FieldValue::Ref(ObjectRef::new(9, 9)),
            &expected,
            true
        )
        .unwrap());
    }

    #[test]
    fn ref_list_membership() {
        let refs = FieldValue::RefList(vec![ObjectRef::new(1, 4), ObjectRef::new(2, 4)]);
        assert!(check(
            CriteriaOp::Contains,
            refs.clone(),
            FieldValue::Ref(ObjectRef::new(2, 4))
        ));
        assert!(!check(
            CriteriaOp::Contains,
            refs,
            FieldValue::Ref(ObjectRef::new(3, 4))
        ));
    }

    #[test]
    fn meaningless_combinations_error() {
        let resolver = FixedResolver::default();
        assert!(matches(
            &resolver,
            CriteriaOp::ContainsKey,
            &FieldValue::Int(1),
            &FieldValue::Int(1),
            true
        )
        .is_err());
        assert!(matches(
            &resolver,
            CriteriaOp::StartsWith,
            &FieldValue::Int(1),
            &FieldValue::Text("x".into()),
            true
        )
        .is_err());
    }
}
