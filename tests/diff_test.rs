use proptest::prelude::*;
use serde_json::json;

use strategy_workbench::diff::{diff_field_array, diff_lines, DiffSegment, SegmentKind};
use strategy_workbench::script::{FieldCategory, FieldDescriptor};
use strategy_workbench::script::normalize;

fn field(key: &str, label: &str) -> FieldDescriptor {
    normalize(&json!({ "key": key, "label": label }), FieldCategory::Parameter, "string").unwrap()
}

fn reconstruct(segments: &[DiffSegment], skip: SegmentKind) -> String {
    segments
        .iter()
        .filter(|s| s.kind != skip)
        .map(|s| s.value.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_line_diff_example() {
    let segments = diff_lines("line1\nline2", "line1\nline3");
    assert_eq!(
        segments,
        vec![
            DiffSegment::new(SegmentKind::Equal, "line1"),
            DiffSegment::new(SegmentKind::Removed, "line2"),
            DiffSegment::new(SegmentKind::Added, "line3"),
        ]
    );
}

#[test]
fn test_identical_texts() {
    assert_eq!(
        diff_lines("a\nb", "a\nb"),
        vec![DiffSegment::new(SegmentKind::Equal, "a\nb")]
    );
    assert!(diff_lines("", "").is_empty());
}

#[test]
fn test_segments_serialize_with_type_tag() {
    let segments = diff_lines("x", "y");
    let encoded = serde_json::to_value(&segments).unwrap();
    assert_eq!(
        encoded,
        json!([
            { "type": "removed", "value": "x" },
            { "type": "added", "value": "y" }
        ])
    );
}

#[test]
fn test_field_diff_example() {
    let before = vec![field("p1", "A")];
    let after = vec![field("p1", "B"), field("p2", "C")];

    let diff = diff_field_array(&before, &after);

    assert_eq!(diff.changed.len(), 1);
    assert_eq!(diff.changed[0].before.label, "A");
    assert_eq!(diff.changed[0].after.label, "B");
    assert_eq!(diff.added, vec![field("p2", "C")]);
    assert!(diff.removed.is_empty());
    assert!(diff.unchanged.is_empty());
}

#[test]
fn test_field_diff_is_insensitive_to_object_key_order() {
    let mut before = field("p", "P");
    before.ui_props = Some(serde_json::from_str(r#"{"min": 1, "max": 10}"#).unwrap());
    let mut after = field("p", "P");
    after.ui_props = Some(serde_json::from_str(r#"{"max": 10, "min": 1}"#).unwrap());

    let diff = diff_field_array(&[before], &[after]);
    assert_eq!(diff.unchanged.len(), 1);
    assert!(!diff.has_changes());
}

fn lines_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "", "local x = 1"]), 0..12)
        .prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn prop_line_diff_round_trip(a in lines_strategy(), b in lines_strategy()) {
        let segments = diff_lines(&a, &b);
        if a == b && !a.is_empty() {
            prop_assert_eq!(segments.len(), 1);
        }
        prop_assert_eq!(reconstruct(&segments, SegmentKind::Added), a);
        prop_assert_eq!(reconstruct(&segments, SegmentKind::Removed), b);
    }

    #[test]
    fn prop_field_diff_partitions_keys(
        before_keys in prop::collection::btree_set("[a-e]", 0..5),
        after_keys in prop::collection::btree_set("[a-e]", 0..5),
        relabel in any::<bool>(),
    ) {
        let before: Vec<_> = before_keys.iter().map(|k| field(k, k)).collect();
        let label = |k: &String| if relabel { format!("{}!", k) } else { k.clone() };
        let after: Vec<_> = after_keys.iter().map(|k| field(k, &label(k))).collect();

        let diff = diff_field_array(&before, &after);

        let mut after_side: Vec<String> = diff.added.iter()
            .chain(diff.unchanged.iter())
            .chain(diff.changed.iter().map(|c| &c.after))
            .map(|f| f.key.clone())
            .collect();
        after_side.sort();
        let mut before_side: Vec<String> = diff.removed.iter()
            .chain(diff.unchanged.iter())
            .chain(diff.changed.iter().map(|c| &c.before))
            .map(|f| f.key.clone())
            .collect();
        before_side.sort();

        prop_assert_eq!(after_side, after_keys.iter().cloned().collect::<Vec<_>>());
        prop_assert_eq!(before_side, before_keys.iter().cloned().collect::<Vec<_>>());
    }
}
