use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

/// Keys of an API object worth handing to a model. `links` and `meta` are
/// navigation noise.
const OBJECT_KEYS: &[&str] = &["id", "type", "attributes", "context_attributes", "relationships"];

/// Identifier of a URL object: the URL as unpadded URL-safe base64.
pub fn url_id(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// Reduce a raw API object to `{id, type, attributes, context_attributes, relationships}`.
///
/// Relationship entries are flattened to their `data` member and
/// `attributes.aggregations` is dropped. Non-object values pass through.
pub fn normalize_object(raw: Value) -> Value {
    let Value::Object(mut raw) = raw else {
        return raw;
    };

    let mut out = Map::new();
    for key in OBJECT_KEYS {
        if let Some(value) = raw.remove(*key) {
            out.insert((*key).to_string(), value);
        }
    }

    if let Some(Value::Object(attributes)) = out.get_mut("attributes") {
        attributes.remove("aggregations");
    }

    if let Some(Value::Object(relationships)) = out.get_mut("relationships") {
        for entry in relationships.values_mut() {
            if let Some(data) = entry.get_mut("data").map(Value::take) {
                *entry = data;
            }
        }
    }

    Value::Object(out)
}

/// Recursively drop `null`, `{}` and `[]` values.
///
/// Empty containers produced by the pruning itself are dropped as well.
/// A top-level empty value is returned as-is.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(sanitize)
                .filter(|v| !is_empty(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_id_is_unpadded_urlsafe_base64() {
        assert_eq!(url_id("http://www.example.com/"), "aHR0cDovL3d3dy5leGFtcGxlLmNvbS8");
        assert!(!url_id("https://a.b/?q=1").contains('='));
    }

    #[test]
    fn normalize_strips_links_and_aggregations() {
        let raw = json!({
            "id": "abc",
            "type": "file",
            "links": {"self": "https://example/files/abc"},
            "attributes": {"size": 10, "aggregations": {"x": 1}},
            "relationships": {
                "contacted_ips": {
                    "data": [{"type": "ip_address", "id": "1.2.3.4"}],
                    "links": {"related": "..."},
                    "meta": {"cursor": "c"}
                }
            }
        });

        let out = normalize_object(raw);
        assert_eq!(
            out,
            json!({
                "id": "abc",
                "type": "file",
                "attributes": {"size": 10},
                "relationships": {
                    "contacted_ips": [{"type": "ip_address", "id": "1.2.3.4"}]
                }
            })
        );
    }

    #[test]
    fn sanitize_prunes_nested_empties() {
        let raw = json!({
            "a": null,
            "b": {},
            "c": [],
            "d": {"e": {"f": null}},
            "g": [null, {}, 1],
            "h": "",
            "i": 0,
            "j": false
        });
        assert_eq!(sanitize(raw), json!({"g": [1], "h": "", "i": 0, "j": false}));
    }
}
