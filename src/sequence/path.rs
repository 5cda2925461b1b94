//! Dotted path lookup into JSON payloads.
//!
//! `"attributes.buttons.0"` walks object keys and, on arrays, numeric indices.
//! An empty path selects the payload itself.

use serde_json::Value;

/// Returns the value at `path`, or `None` when any segment is missing.
pub(crate) fn extract<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn walks_objects_and_arrays() {
        let payload = json!({
            "new_state": { "state": "on", "attributes": { "buttons": ["up", "down"] } }
        });
        assert_eq!(extract(&payload, "new_state.state"), Some(&json!("on")));
        assert_eq!(
            extract(&payload, "new_state.attributes.buttons.1"),
            Some(&json!("down"))
        );
        assert_eq!(extract(&payload, ""), Some(&payload));
    }

    #[test]
    fn missing_segments_yield_none() {
        let payload = json!({ "a": { "b": [1, 2] } });
        assert_eq!(extract(&payload, "a.c"), None);
        assert_eq!(extract(&payload, "a.b.7"), None);
        assert_eq!(extract(&payload, "a.b.x"), None);
        assert_eq!(extract(&payload, "a.b.0.deeper"), None);
    }
}
