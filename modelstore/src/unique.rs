//! The Unique-Key Matcher (spec §4.5).
//!
//! Given a write item (already coerced for write — `_id` present if the
//! caller supplied one) and a model's unique indexes, derives the smallest
//! filter that uniquely identifies the item, without ever touching the
//! driver.

use bson::Document;

use crate::error::{Error, ErrorKind, Result};
use crate::model::ModelDescriptor;

/// Derives a unique filter for `item` against `model`'s unique indexes
/// (spec §4.5):
/// 1. If `_id` is present, `{_id}` is returned.
/// 2. Otherwise, the first unique index whose every field is present on
///    the item yields `{field: value, ...}`.
/// 3. If none matches, fails with [`ErrorKind::EmptyUniqueIndexes`].
/// 4. If the model declares no unique indexes at all, fails with
///    [`ErrorKind::ModelEmptyUniqueIndexes`].
pub fn unique_filter(model: &dyn ModelDescriptor, item: &Document) -> Result<Document> {
    if let Some(id) = item.get("_id") {
        let mut filter = Document::new();
        filter.insert("_id", id.clone());
        return Ok(filter);
    }

    let candidates = model.unique_indexes();

    if candidates.is_empty() {
        return Err(Error::new(
            ErrorKind::ModelEmptyUniqueIndexes,
            format!("model {:?} declares no unique indexes", model.table()),
        ));
    }

    for fields in candidates {
        if fields.iter().all(|field| item.contains_key(field)) {
            let mut filter = Document::new();
            for field in fields {
                filter.insert(field.clone(), item.get(field).expect("checked above").clone());
            }
            return Ok(filter);
        }
    }

    Err(Error::new(
        ErrorKind::EmptyUniqueIndexes,
        "no unique index of the model is fully satisfied by the given item",
    ))
}
