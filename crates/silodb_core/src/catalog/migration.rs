//! Schema migration value conversion.
//!
//! Migration rewrites a type's file under its new schema. Fields are
//! matched by name: surviving fields convert value by value with the rules
//! here, added fields come out null, removed fields are dropped. The rules
//! are total - a conversion that cannot preserve the value degrades to the
//! target kind's default rather than failing half-way through a rewrite.

use super::TypeInfo;
use silodb_codec::{FieldKind, FieldValue};

/// Converts one stored value from its old kind to a new kind.
///
/// Null stays null under every conversion. Numeric kinds convert with
/// saturation, numbers format into text, text parses into numbers,
/// booleans map to 0/1. Anything else becomes the target kind's default.
#[must_use]
pub fn convert_value(value: FieldValue, from: FieldKind, to: FieldKind) -> FieldValue {
    if value.is_null() {
        return FieldValue::Null;
    }
    if from == to {
        return value;
    }
    match (&value, to) {
        (FieldValue::Int(n), FieldKind::UInt) => {
            FieldValue::UInt(u64::try_from(*n).unwrap_or(0))
        }
        (FieldValue::Int(n), FieldKind::Real) => FieldValue::Real(*n as f64),
        (FieldValue::Int(n), FieldKind::Bool) => FieldValue::Bool(*n != 0),
        (FieldValue::Int(n), FieldKind::Text) => FieldValue::Text(n.to_string()),
        (FieldValue::UInt(n), FieldKind::Int) => {
            FieldValue::Int(i64::try_from(*n).unwrap_or(i64::MAX))
        }
        (FieldValue::UInt(n), FieldKind::Real) => FieldValue::Real(*n as f64),
        (FieldValue::UInt(n), FieldKind::Bool) => FieldValue::Bool(*n != 0),
        (FieldValue::UInt(n), FieldKind::Text) => FieldValue::Text(n.to_string()),
        (FieldValue::Real(r), FieldKind::Int) => FieldValue::Int(*r as i64),
        (FieldValue::Real(r), FieldKind::UInt) => {
            FieldValue::UInt(if *r < 0.0 { 0 } else { *r as u64 })
        }
        (FieldValue::Real(r), FieldKind::Text) => FieldValue::Text(r.to_string()),
        (FieldValue::Bool(b), FieldKind::Int) => FieldValue::Int(i64::from(*b)),
        (FieldValue::Bool(b), FieldKind::UInt) => FieldValue::UInt(u64::from(*b)),
        (FieldValue::Bool(b), FieldKind::Text) => FieldValue::Text(b.to_string()),
        (FieldValue::Text(s), FieldKind::Int) => {
            FieldValue::Int(s.trim().parse().unwrap_or(0))
        }
        (FieldValue::Text(s), FieldKind::UInt) => {
            FieldValue::UInt(s.trim().parse().unwrap_or(0))
        }
        (FieldValue::Text(s), FieldKind::Real) => {
            FieldValue::Real(s.trim().parse().unwrap_or(0.0))
        }
        (FieldValue::Text(s), FieldKind::Bool) => {
            FieldValue::Bool(s.trim().eq_ignore_ascii_case("true"))
        }
        _ => FieldValue::default_for(to),
    }
}

/// For each field of the new schema, the index of the matching (same-name)
/// field in the old schema, if one exists.
#[must_use]
pub fn field_mapping(old: &TypeInfo, new: &TypeInfo) -> Vec<Option<usize>> {
    new.fields()
        .iter()
        .map(|field| old.field_index(&field.name))
        .collect()
}

/// Converts one old record's values into the new schema's value row.
#[must_use]
pub fn convert_record(
    old: &TypeInfo,
    new: &TypeInfo,
    mapping: &[Option<usize>],
    old_values: &[FieldValue],
) -> Vec<FieldValue> {
    new.fields()
        .iter()
        .zip(mapping)
        .map(|(field, source)| match source {
            Some(i) => convert_value(
                old_values.get(*i).cloned().unwrap_or(FieldValue::Null),
                old.fields()[*i].kind,
                field.kind,
            ),
            // a version field added by migration starts every record at
            // tick 1 so later saves can check and increment it
            None if field.version => FieldValue::UInt(1),
            None => FieldValue::Null,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDesc, TypeDesc, TypeKind};
    use crate::types::Tid;

    #[test]
    fn null_survives_every_conversion() {
        for to in [FieldKind::Int, FieldKind::Text, FieldKind::Ref] {
            assert_eq!(
                convert_value(FieldValue::Null, FieldKind::Int, to),
                FieldValue::Null
            );
        }
    }

    #[test]
    fn numeric_conversions_saturate() {
        assert_eq!(
            convert_value(FieldValue::Int(-5), FieldKind::Int, FieldKind::UInt),
            FieldValue::UInt(0)
        );
        assert_eq!(
            convert_value(FieldValue::UInt(u64::MAX), FieldKind::UInt, FieldKind::Int),
            FieldValue::Int(i64::MAX)
        );
        assert_eq!(
            convert_value(FieldValue::Int(3), FieldKind::Int, FieldKind::Real),
            FieldValue::Real(3.0)
        );
    }

    #[test]
    fn text_round_trips_through_numbers() {
        assert_eq!(
            convert_value(FieldValue::Int(42), FieldKind::Int, FieldKind::Text),
            FieldValue::Text("42".into())
        );
        assert_eq!(
            convert_value(
                FieldValue::Text(" 42 ".into()),
                FieldKind::Text,
                FieldKind::Int
            ),
            FieldValue::Int(42)
        );
        assert_eq!(
            convert_value(
                FieldValue::Text("nope".into()),
                FieldKind::Text,
                FieldKind::Int
            ),
            FieldValue::Int(0)
        );
    }

    #[test]
    fn unconvertible_kinds_degrade_to_default() {
        assert_eq!(
            convert_value(
                FieldValue::Text("x".into()),
                FieldKind::Text,
                FieldKind::List
            ),
            FieldValue::List(vec![])
        );
    }

    fn info(fields: Vec<FieldDesc>) -> TypeInfo {
        TypeInfo::from_desc(&TypeDesc::new("T", fields), Tid::new(1), TypeKind::User).unwrap()
    }

    #[test]
    fn record_conversion_maps_by_name() {
        let old = info(vec![
            FieldDesc::new("A", FieldKind::Int),
            FieldDesc::new("B", FieldKind::Text),
        ]);
        let new = info(vec![
            FieldDesc::new("B", FieldKind::Text),
            FieldDesc::new("A", FieldKind::Real),
            FieldDesc::new("C", FieldKind::Bool),
        ]);

        let mapping = field_mapping(&old, &new);
        assert_eq!(mapping, vec![Some(1), Some(0), None]);

        let converted = convert_record(
            &old,
            &new,
            &mapping,
            &[FieldValue::Int(7), FieldValue::Text("hi".into())],
        );
        assert_eq!(
            converted,
            vec![
                FieldValue::Text("hi".into()),
                FieldValue::Real(7.0),
                FieldValue::Null,
            ]
        );
    }

    #[test]
    fn added_version_field_starts_at_one() {
        let old = info(vec![FieldDesc::new("A", FieldKind::Int)]);
        let new = info(vec![
            FieldDesc::new("A", FieldKind::Int),
            FieldDesc::new("tick", FieldKind::UInt).version(),
        ]);
        let mapping = field_mapping(&old, &new);
        let converted = convert_record(&old, &new, &mapping, &[FieldValue::Int(1)]);
        assert_eq!(converted[1], FieldValue::UInt(1));
    }
}
