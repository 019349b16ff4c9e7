//! Decoding of typed attribute values (`{"S": "Bob"}`, `{"N": "42"}`, ...) into plain JSON.
//! Plain values pass through unchanged, so callers may use either form.

use serde_json::{Number, Value as JsonValue};

use super::Item;

const TYPE_TAGS: [&str; 10] = ["S", "N", "B", "BOOL", "NULL", "L", "M", "SS", "NS", "BS"];

fn number_from_str(s: &str) -> JsonValue {
    if let Ok(i) = s.parse::<i64>() { return JsonValue::Number(i.into()); }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(s.to_string()))
}

/// Decode a single attribute value.
pub fn plain_value(v: JsonValue) -> JsonValue {
    let map = match v {
        JsonValue::Object(map) => map,
        other => return other,
    };
    if map.len() != 1 { return JsonValue::Object(plain_item(map)); }
    let Some((tag, inner)) = map.iter().next().map(|(k, v)| (k.clone(), v.clone())) else { return JsonValue::Object(map); };
    if !TYPE_TAGS.contains(&tag.as_str()) { return JsonValue::Object(plain_item(map)); }
    match (tag.as_str(), inner) {
        ("S", JsonValue::String(s)) | ("B", JsonValue::String(s)) => JsonValue::String(s),
        ("N", JsonValue::String(s)) => number_from_str(&s),
        ("N", n @ JsonValue::Number(_)) => n,
        ("BOOL", b @ JsonValue::Bool(_)) => b,
        ("NULL", _) => JsonValue::Null,
        ("L", JsonValue::Array(xs)) => JsonValue::Array(xs.into_iter().map(plain_value).collect()),
        ("M", JsonValue::Object(m)) => JsonValue::Object(plain_item(m)),
        ("SS", JsonValue::Array(xs)) | ("BS", JsonValue::Array(xs)) => JsonValue::Array(xs),
        ("NS", JsonValue::Array(xs)) => JsonValue::Array(
            xs.into_iter()
                .map(|x| match x {
                    JsonValue::String(s) => number_from_str(&s),
                    other => other,
                })
                .collect(),
        ),
        // tag present but payload of an unexpected shape: keep as a plain object
        (_, _) => JsonValue::Object(map),
    }
}

/// Decode every attribute of an item.
pub fn plain_item(item: Item) -> Item {
    item.into_iter().map(|(k, v)| (k, plain_value(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: JsonValue) -> Item { v.as_object().cloned().unwrap() }

    #[test]
    fn typed_scalars_decode() {
        let item = plain_item(obj(json!({
            "customer_name": {"S": "Bob"},
            "age": {"N": "42"},
            "score": {"N": "1.5"},
            "active": {"BOOL": true},
            "nothing": {"NULL": true}
        })));
        assert_eq!(JsonValue::Object(item), json!({"customer_name": "Bob", "age": 42, "score": 1.5, "active": true, "nothing": null}));
    }

    #[test]
    fn nested_lists_and_maps_decode() {
        let v = plain_value(json!({"L": [{"S": "a"}, {"M": {"n": {"N": "1"}}}]}));
        assert_eq!(v, json!(["a", {"n": 1}]));
        assert_eq!(plain_value(json!({"NS": ["1", "2"]})), json!([1, 2]));
    }

    #[test]
    fn plain_values_pass_through() {
        let item = plain_item(obj(json!({"customer_name": "Bob", "address": {"city": "Rio", "zip": "1"}})));
        assert_eq!(JsonValue::Object(item), json!({"customer_name": "Bob", "address": {"city": "Rio", "zip": "1"}}));
    }
}
