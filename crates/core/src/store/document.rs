use serde_json::{Map, Value};

/// Value at `field` inside a record document. Null counts as absent.
pub(crate) fn read_field<'a>(document: &'a Value, field: &[String]) -> Option<&'a Value> {
    let mut current = document;
    for segment in field {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Write `value` at `field`, creating intermediate objects as needed.
pub(crate) fn write_field(document: &mut Value, field: &[String], value: Value) {
    let Some((last, parents)) = field.split_last() else {
        *document = value;
        return;
    };

    let mut current = document;
    for segment in parents {
        current = ensure_object(current)
            .entry(segment.clone())
            .or_insert(Value::Null);
    }
    ensure_object(current).insert(last.clone(), value);
}

pub(crate) fn merge_fields(current: Option<&Value>, fields: &Map<String, Value>) -> Value {
    let mut merged = match current {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    for (name, value) in fields {
        merged.insert(name.clone(), value.clone());
    }
    Value::Object(merged)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was replaced with an object"),
    }
}
