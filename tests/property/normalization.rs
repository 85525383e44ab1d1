//! Property tests for reply normalization.
//!
//! Invariants tested:
//! - Normalizing a normalized reply changes nothing
//! - The provenance flag is always present and boolean
//! - Object fields survive; other values are wrapped under `response`

use inventory_rpc_core::{Reply, FROM_CACHE_KEY, RESPONSE_KEY};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: normalization is idempotent for a given flag
    #[test]
    fn normalization_is_idempotent(value in json_value(), from_cache in any::<bool>()) {
        let once = Reply::normalize(value, from_cache);
        let twice = Reply::normalize(once.clone().into_value(), from_cache);
        prop_assert_eq!(once, twice);
    }

    /// Property: every reply carries a boolean provenance flag
    #[test]
    fn flag_is_always_present(value in json_value(), from_cache in any::<bool>()) {
        let reply = Reply::normalize(value, from_cache);
        prop_assert_eq!(reply.get(FROM_CACHE_KEY), Some(&Value::Bool(from_cache)));
        prop_assert_eq!(reply.from_cache(), from_cache);
    }

    /// Property: objects keep their fields, anything else is wrapped
    #[test]
    fn non_objects_are_wrapped(value in json_value()) {
        let reply = Reply::live(value.clone());
        match &value {
            Value::Object(fields) => {
                let kept = fields.iter().filter(|(key, _)| key.as_str() != FROM_CACHE_KEY);
                for (key, field) in kept {
                    prop_assert_eq!(reply.get(key), Some(field));
                }
            }
            other => {
                prop_assert_eq!(reply.get(RESPONSE_KEY), Some(other));
                prop_assert_eq!(reply.fields().len(), 2);
            }
        }
    }
}
