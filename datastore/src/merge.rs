use serde_json::Value;

/// Recursive defaults-merge of two JSON documents: values from `incoming`
/// win, values from `existing` fill the gaps. Objects merge key by key;
/// anything else (arrays included) is taken wholesale from `incoming` when
/// present. Explicit `null`s in `incoming` do not erase existing values.
pub fn merge_values(incoming: Value, existing: Value) -> Value {
    match (incoming, existing) {
        (Value::Object(mut inc), Value::Object(mut exist)) => {
            for (key, old) in std::mem::take(&mut exist) {
                match inc.remove(&key) {
                    Some(new) => {
                        inc.insert(key, merge_values(new, old));
                    }
                    None => {
                        inc.insert(key, old);
                    }
                }
            }
            Value::Object(inc)
        }
        (Value::Null, existing) => existing,
        (incoming, _) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn incoming_wins_existing_fills() {
        let merged = merge_values(
            json!({ "a": 1, "nested": { "x": "new" } }),
            json!({ "a": 0, "b": 2, "nested": { "x": "old", "y": true } }),
        );
        assert_eq!(
            merged,
            json!({ "a": 1, "b": 2, "nested": { "x": "new", "y": true } })
        );
    }

    #[test]
    fn null_does_not_erase() {
        let merged = merge_values(json!({ "a": null }), json!({ "a": 5 }));
        assert_eq!(merged, json!({ "a": 5 }));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let merged = merge_values(json!({ "xs": [3] }), json!({ "xs": [1, 2] }));
        assert_eq!(merged, json!({ "xs": [3] }));
    }
}
