use serde_json::{Map, Value};

/// Flatten nested metadata into dotted keys.
///
/// Object fields join their key with `.`, list elements use their index,
/// and everything else is copied as is. An empty object or empty list has
/// no leaves to expand into, so it is stored under its own key; these are the
/// only non-scalar values in the output:
///
/// `{"a": {"b": 1, "c": {"d": 2}}}` -> `{"a.b": 1, "a.c.d": 2}`
/// `{"tags": [{"name": "x"}, "y"]}` -> `{"tags.0.name": "x", "tags.1": "y"}`
///
/// Fails with the offending key when two paths flatten to the same key,
/// e.g. `{"a.b": 1, "a": {"b": 2}}`.
pub fn flatten_metadata(metadata: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    let mut out = Map::new();
    for (key, value) in metadata {
        flatten_into(key.clone(), value, &mut out)?;
    }
    Ok(out)
}

fn flatten_into(key: String, value: &Value, out: &mut Map<String, Value>) -> Result<(), String> {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (field, inner) in fields {
                flatten_into(format!("{key}.{field}"), inner, out)?;
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (idx, inner) in items.iter().enumerate() {
                flatten_into(format!("{key}.{idx}"), inner, out)?;
            }
        }
        _ => {
            if out.contains_key(&key) {
                return Err(key);
            }
            out.insert(key, value.clone());
        }
    }
    Ok(())
}
