//! Value comparison semantics shared by scans, index lookups and predicate
//! evaluation.
//!
//! Null ordering: null compares equal only to null, and only under the
//! equality operator; every ordering comparison involving null is
//! undefined (`None`), so no ordering clause matches a null field.

use silodb_codec::{FieldKind, FieldValue};
use std::cmp::Ordering;

/// Compares a stored value against a literal, if the two are comparable.
///
/// Numeric values compare across `Int`/`UInt`/`Real` representations;
/// everything else compares within its own kind only.
#[must_use]
pub fn compare_values(stored: &FieldValue, literal: &FieldValue) -> Option<Ordering> {
    use FieldValue::{Bool, Bytes, Int, Real, Text, UInt};
    match (stored, literal) {
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Text(a), Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
        (Int(_) | UInt(_) | Real(_), Int(_) | UInt(_) | Real(_)) => {
            numeric_cmp(stored, literal)
        }
        _ => None,
    }
}

fn numeric_cmp(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    use FieldValue::{Int, Real, UInt};
    match (a, b) {
        (Int(x), Int(y)) => Some(x.cmp(y)),
        (UInt(x), UInt(y)) => Some(x.cmp(y)),
        (Int(x), UInt(y)) => Some(cmp_int_uint(*x, *y)),
        (UInt(x), Int(y)) => Some(cmp_int_uint(*y, *x).reverse()),
        (Real(x), Real(y)) => Some(x.total_cmp(y)),
        (Real(x), Int(y)) => Some(x.total_cmp(&(*y as f64))),
        (Int(x), Real(y)) => Some((*x as f64).total_cmp(y)),
        (Real(x), UInt(y)) => Some(x.total_cmp(&(*y as f64))),
        (UInt(x), Real(y)) => Some((*x as f64).total_cmp(y)),
        _ => None,
    }
}

fn cmp_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

/// Equality with case-sensitivity control for text and the null rule
/// applied: null equals only null.
#[must_use]
pub fn values_equal(stored: &FieldValue, literal: &FieldValue, case_sensitive: bool) -> bool {
    match (stored, literal) {
        (FieldValue::Null, FieldValue::Null) => true,
        (FieldValue::Null, _) | (_, FieldValue::Null) => false,
        (FieldValue::Text(a), FieldValue::Text(b)) if !case_sensitive => {
            a.eq_ignore_ascii_case(b)
        }
        (FieldValue::Ref(a), FieldValue::Ref(b)) => a == b,
        _ => compare_values(stored, literal) == Some(Ordering::Equal),
    }
}

/// Text prefix test with case-sensitivity control.
#[must_use]
pub fn text_starts_with(stored: &str, prefix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        stored.starts_with(prefix)
    } else {
        stored.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase())
    }
}

/// Text suffix test with case-sensitivity control.
#[must_use]
pub fn text_ends_with(stored: &str, suffix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        stored.ends_with(suffix)
    } else {
        stored.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
    }
}

/// Text substring test with case-sensitivity control.
#[must_use]
pub fn text_contains(stored: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        stored.contains(needle)
    } else {
        stored.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
    }
}

/// Coerces a literal to a field's declared kind where a lossless numeric
/// conversion exists; returns the literal unchanged otherwise.
///
/// Index keys are stored in the field's kind, so lookups coerce the
/// literal first to hit the same key space.
#[must_use]
pub fn coerce_to_kind(literal: &FieldValue, kind: FieldKind) -> FieldValue {
    match (literal, kind) {
        (FieldValue::Int(n), FieldKind::UInt) if *n >= 0 => FieldValue::UInt(*n as u64),
        (FieldValue::UInt(n), FieldKind::Int) if *n <= i64::MAX as u64 => {
            FieldValue::Int(*n as i64)
        }
        (FieldValue::Int(n), FieldKind::Real) => FieldValue::Real(*n as f64),
        (FieldValue::UInt(n), FieldKind::Real) => FieldValue::Real(*n as f64),
        _ => literal.clone(),
    }
}
