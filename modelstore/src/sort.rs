//! Sort-directive translation (spec §4.7).

use bson::Document;
use serde_json::Value;

/// Translates a logical `{field: "asc"|"desc"}` mapping into a native sort
/// document. Renames `id -> _id`, maps `asc -> 1` / `desc -> -1`, drops any
/// entry whose direction isn't recognized, and appends a stable `_id: -1`
/// tiebreaker whenever at least one valid entry survives. Returns `None`
/// when no valid entries remain — callers must not pass an empty sort
/// document to the driver.
pub fn compile_sort(order: &Value) -> Option<Document> {
    let map = order.as_object()?;
    let mut out = Document::new();

    for (field, direction) in map {
        let dir = match direction.as_str() {
            Some("asc") => 1,
            Some("desc") => -1,
            _ => continue,
        };
        let key = if field == "id" { "_id" } else { field.as_str() };
        out.insert(key, dir);
    }

    if out.is_empty() {
        return None;
    }

    out.insert("_id", -1);
    Some(out)
}
