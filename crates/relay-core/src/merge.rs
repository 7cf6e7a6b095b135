//! Recursive deep-merge with list-overwrite semantics.

use serde_json::Value;

/// Merge `src` into `dst` in place.
///
/// For each key in `src`: if the existing value in `dst` and the new value
/// are both objects, recurse; otherwise the new value replaces the old one
/// wholesale. This includes replacing an object with a list, a list with
/// anything, or a scalar with anything — lists are never concatenated.
pub fn merge(dst: &mut Value, src: &Value) {
    if let (Value::Object(dst_map), Value::Object(src_map)) = (&mut *dst, src) {
        for (key, value) in src_map {
            match dst_map.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => {
                    merge(existing, value);
                }
                _ => {
                    dst_map.insert(key.clone(), value.clone());
                }
            }
        }
    } else {
        *dst = src.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_recurses_into_nested_objects() {
        let mut dst = json!({"a": {"b": 1, "c": 2}});
        merge(&mut dst, &json!({"a": {"c": 3, "d": 4}}));
        assert_eq!(dst, json!({"a": {"b": 1, "c": 3, "d": 4}}));
    }

    #[test]
    fn merge_overwrites_list_with_list_wholesale_never_concatenating() {
        let mut dst = json!({"items": [1, 2, 3]});
        merge(&mut dst, &json!({"items": [9]}));
        assert_eq!(dst, json!({"items": [9]}));
    }

    #[test]
    fn merge_lets_list_win_over_sub_object() {
        let mut dst = json!({"a": {"b": 1}});
        merge(&mut dst, &json!({"a": [1, 2]}));
        assert_eq!(dst, json!({"a": [1, 2]}));
    }

    #[test]
    fn merge_is_left_fold_associative_over_a_sequence_of_applies() {
        let updates = [
            json!({"Lines": {"44": {"NumberOfLaps": 1}}}),
            json!({"Lines": {"44": {"NumberOfLaps": 2}, "16": {"NumberOfLaps": 1}}}),
            json!({"Lines": {"16": {"InPit": true}}}),
        ];

        let mut folded = json!({});
        for u in &updates {
            merge(&mut folded, u);
        }

        let mut expected = Value::Object(serde_json::Map::new());
        for u in &updates {
            merge(&mut expected, u);
        }
        assert_eq!(folded, expected);
        assert_eq!(
            folded,
            json!({"Lines": {"44": {"NumberOfLaps": 2}, "16": {"NumberOfLaps": 1, "InPit": true}}})
        );
    }
}
