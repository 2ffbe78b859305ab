//! Property-based test generators using proptest.
//!
//! Provides strategies for generating fixture objects and scalar field
//! values that maintain the invariants the engine expects (unique names,
//! non-NaN ordering keys, valid text).

use crate::fixtures::Person;
use proptest::prelude::*;
use silodb_core::FieldValue;

/// Strategy for generating person names (unique enough for small sets when
/// combined with an index suffix by the caller).
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,11}").expect("invalid regex")
}

/// Strategy for generating ages within a queryable band.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..120
}

/// Strategy for generating a batch of people with unique names.
pub fn people_strategy(max: usize) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::vec((name_strategy(), age_strategy(), any::<bool>()), 1..=max).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (name, age, active))| {
                    let mut person = Person::new(format!("{name}{i}"), age);
                    person.active = active;
                    person
                })
                .collect()
        },
    )
}

/// Strategy for generating scalar field values of every orderable kind.
pub fn scalar_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Int),
        any::<u64>().prop_map(FieldValue::UInt),
        prop::num::f64::NORMAL.prop_map(FieldValue::Real),
        "[ -~]{0,24}".prop_map(FieldValue::Text),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(FieldValue::Bytes),
    ]
}
