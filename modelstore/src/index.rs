//! The Index Validator (spec §4.8).

use bson::Document;
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::model::IndexSpec;

/// Validates a caller-supplied index specification, returning a structured
/// [`IndexSpec`] on success.
///
/// Rejects, all with [`ErrorKind::InvalidIndex`], when: the value isn't a
/// mapping; `key` is missing or not a mapping; `name` is present but not a
/// string; `unique`/`sparse` are present but not booleans;
/// `expireAfterSeconds` is present but not a number; or
/// `partialFilterExpression` is present but not a mapping.
pub fn validate_index(value: &Value) -> Result<IndexSpec> {
    let map = value
        .as_object()
        .ok_or_else(|| Error::new(ErrorKind::InvalidIndex, "index specification must be a mapping"))?;

    let key_map = map
        .get("key")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::new(ErrorKind::InvalidIndex, "index specification requires a `key` mapping"))?;

    let mut key = Vec::with_capacity(key_map.len());
    for (field, direction) in key_map {
        let dir = direction
            .as_i64()
            .ok_or_else(|| Error::new(ErrorKind::InvalidIndex, format!("key direction for {field:?} must be a number")))?;
        key.push((field.clone(), dir as i32));
    }

    let name = match map.get("name") {
        None | Some(Value::Null) => default_index_name(&key),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(Error::new(ErrorKind::InvalidIndex, "`name` must be a string")),
    };

    let unique = optional_bool(map, "unique")?.unwrap_or(false);
    let sparse = optional_bool(map, "sparse")?.unwrap_or(false);

    let expire_after_seconds = match map.get("expireAfterSeconds") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_i64().ok_or_else(|| {
            Error::new(ErrorKind::InvalidIndex, "`expireAfterSeconds` must be an integer")
        })?),
        Some(_) => {
            return Err(Error::new(
                ErrorKind::InvalidIndex,
                "`expireAfterSeconds` must be a number",
            ))
        }
    };

    let partial_filter_expression = match map.get("partialFilterExpression") {
        None | Some(Value::Null) => None,
        Some(obj @ Value::Object(_)) => Some(bson::to_document(obj)?),
        Some(_) => {
            return Err(Error::new(
                ErrorKind::InvalidIndex,
                "`partialFilterExpression` must be a mapping",
            ))
        }
    };

    Ok(IndexSpec {
        name,
        key,
        unique,
        expire_after_seconds,
        partial_filter_expression,
        sparse,
    })
}

fn optional_bool(map: &serde_json::Map<String, Value>, field: &str) -> Result<Option<bool>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::new(ErrorKind::InvalidIndex, format!("`{field}` must be a boolean"))),
    }
}

fn default_index_name(key: &[(String, i32)]) -> String {
    key.iter()
        .map(|(field, dir)| format!("{field}_{dir}"))
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalizes the shape the driver returns for an existing index
/// (`getIndexes`, spec §4.6) into `{name, key, unique}`.
pub fn normalize_existing_index(raw: &Document) -> Document {
    let mut out = Document::new();
    out.insert("name", raw.get_str("name").unwrap_or_default());
    out.insert(
        "key",
        raw.get_document("key").cloned().unwrap_or_default(),
    );
    out.insert("unique", raw.get_bool("unique").unwrap_or(false));
    out
}
