//! Generated checks for the property differ and document matching.

mod common;

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use common::SceneBuilder;
use scenemerge_core::diff::{compare_values, ChangeKind, PropertyChange};
use scenemerge_core::{semantic_diff, DiffContext, Document};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-5i64..5).prop_map(Value::from),
        "[a-c]{0,2}".prop_map(Value::from),
        (0i64..4).prop_map(|id| json!({"fileID": id})),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
            prop::collection::vec(0i64..6, 0..4)
                .prop_map(|ids| Value::Array(ids.into_iter().map(|id| json!({"fileID": id})).collect())),
        ]
    })
}

/// Root with one child per name, each at a distinct position.
fn siblings(names: &[&str], offset: i64) -> Document {
    let mut builder = SceneBuilder::with_offset(offset).node(1, 2, "Root", None, 0.0);
    for (i, name) in names.iter().enumerate() {
        let go = 10 * (i as i64 + 1);
        builder = builder.node(go, go + 1, name, Some(2), i as f64);
    }
    builder.build()
}

fn sibling_names() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(
        prop::sample::select(vec!["Item", "Item[0]", "Item[1]", "Item[0][0]", "A[x]", "A"]),
        1..6,
    )
}

fn sorted(mut changes: Vec<PropertyChange>) -> Vec<PropertyChange> {
    changes.sort_by(|a, b| (&a.path, a.kind.to_string()).cmp(&(&b.path, b.kind.to_string())));
    changes
}

proptest! {
    #[test]
    fn test_compare_is_reflexive(value in tree()) {
        prop_assert!(compare_values(Some(&value), Some(&value)).is_empty());
    }

    #[test]
    fn test_compare_is_symmetric(left in tree(), right in tree()) {
        let forward = sorted(
            compare_values(Some(&left), Some(&right))
                .iter()
                .map(PropertyChange::inverted)
                .collect(),
        );
        let backward = sorted(compare_values(Some(&right), Some(&left)));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn test_ref_list_order_is_ignored(ids in prop::collection::vec(0i64..50, 0..8)) {
        let as_list = |ids: &[i64]| Value::Array(ids.iter().map(|id| json!({"fileID": id})).collect());
        let mut reversed = ids.clone();
        reversed.reverse();
        prop_assert!(compare_values(Some(&as_list(&ids)), Some(&as_list(&reversed))).is_empty());
    }

    #[test]
    fn test_one_sided_value_is_a_single_change(value in tree()) {
        let changes = compare_values(None, Some(&value));
        prop_assert_eq!(changes.len(), 1);
        prop_assert_eq!(changes[0].kind, ChangeKind::Added);
    }

    #[test]
    fn test_sibling_names_pair_across_renumbering(names in sibling_names()) {
        let ctx = DiffContext::default();
        let doc = siblings(&names, 0);
        prop_assert!(!semantic_diff(&doc, &doc, &ctx).has_changes());
        prop_assert!(!semantic_diff(&doc, &siblings(&names, 5000), &ctx).has_changes());
    }
}
