//! Keyed navigation over server payloads that reports missing keys by path.

use serde_json::{Map, Value};

use crate::error::{LabError, LabResult};

/// Follow `path` through nested objects.
pub(crate) fn get<'a>(value: &'a Value, path: &[&str]) -> LabResult<&'a Value> {
    let mut current = value;
    for (depth, key) in path.iter().enumerate() {
        current = current
            .get(*key)
            .ok_or_else(|| LabError::missing(path[..=depth].join(".")))?;
    }
    Ok(current)
}

/// Mutable counterpart of [`get`].
pub(crate) fn get_mut<'a>(value: &'a mut Value, path: &[&str]) -> LabResult<&'a mut Value> {
    let mut current = value;
    for (depth, key) in path.iter().enumerate() {
        current = current
            .get_mut(*key)
            .ok_or_else(|| LabError::missing(path[..=depth].join(".")))?;
    }
    Ok(current)
}

/// Follow `path` and require the target to be an object.
pub(crate) fn object<'a>(value: &'a Value, path: &[&str]) -> LabResult<&'a Map<String, Value>> {
    get(value, path)?
        .as_object()
        .ok_or_else(|| LabError::missing(format!("{} (object)", path.join("."))))
}

/// Mutable counterpart of [`object`].
pub(crate) fn object_mut<'a>(
    value: &'a mut Value,
    path: &[&str],
) -> LabResult<&'a mut Map<String, Value>> {
    get_mut(value, path)?
        .as_object_mut()
        .ok_or_else(|| LabError::missing(format!("{} (object)", path.join("."))))
}

/// Deep copy of an object with the listed top-level keys removed.
pub(crate) fn without_keys(value: &Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}
