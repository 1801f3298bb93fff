//! Identifier coercion at the caller/store boundary (spec §4.3).
//!
//! Grounded on the teacher's `uid.rs`, but reworked: the teacher expresses
//! "this document's id is a native object identifier" as a compile-time
//! type parameter (`Uid<T: Doc>`), because `Doc::Id` is fixed per Rust
//! type. Here the model descriptor is a runtime value, so the coercion
//! point is a pair of free functions operating directly on
//! `bson::Document`/`bson::Bson`, driven by each field's `is_id` flag.

use bson::oid::ObjectId;
use bson::{Bson, Document};

use crate::model::ModelDescriptor;

/// Coerces a single `Bson` value to a native object identifier.
///
/// Strings are parsed as hex object-id strings; values already in native
/// form pass through unchanged; anything else is left untouched (the
/// engine does not reject malformed identifiers at this layer — a
/// downstream driver call will surface the failure).
fn coerce_one(value: Bson) -> Bson {
    match value {
        Bson::String(ref s) => match ObjectId::parse_str(s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => value,
        },
        other => other,
    }
}

/// Coerces `value` to a native identifier, element-wise if it is an array.
fn coerce(value: Bson) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(items.into_iter().map(coerce_one).collect()),
        scalar => coerce_one(scalar),
    }
}

/// Coerces a filter constraint's already-mapped value to native object
/// identifiers, element-wise. Used by the Filter Compiler for fields
/// flagged `isID` (spec §4.4.g).
pub(crate) fn coerce_value_for_filter(value: Bson) -> Bson {
    coerce(value)
}

/// Produces a new document where the caller's `id` becomes `_id`, and every
/// field flagged `isID` in the model has its value(s) coerced to native
/// identifiers. When the model declares `hasCustomId`, the `id` value is
/// preserved as-is under `_id` rather than coerced.
pub fn coerce_for_write(model: &dyn ModelDescriptor, item: &Document) -> Document {
    let mut out = Document::new();

    for (key, value) in item {
        if key == "id" {
            let renamed = if model.has_custom_id() {
                value.clone()
            } else {
                coerce_one(value.clone())
            };
            out.insert("_id", renamed);
            continue;
        }

        let is_id = model.field(key).map(|spec| spec.is_id).unwrap_or(false);
        let physical = model
            .field(key)
            .and_then(|spec| spec.field.clone())
            .unwrap_or_else(|| key.clone());

        let coerced = if is_id {
            coerce(value.clone())
        } else {
            value.clone()
        };

        out.insert(physical, coerced);
    }

    out
}

/// Batch form of [`coerce_for_write`].
pub fn coerce_many_for_write<'a, I>(model: &dyn ModelDescriptor, items: I) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    items.into_iter().map(|item| coerce_for_write(model, item)).collect()
}

/// Produces a copy of `document` with `_id` removed and `id` set to its
/// string form, if `_id` is present. Documents with no `_id` pass through
/// unchanged.
pub fn rename_for_client(document: Document) -> Document {
    let mut out = document;

    if let Some(id) = out.remove("_id") {
        let rendered = match id {
            Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
            Bson::String(s) => Bson::String(s),
            other => Bson::String(other.to_string()),
        };
        out.insert("id", rendered);
    }

    out
}

/// Renders a raw `_id` value (as found in a driver result) as the string
/// form callers see under `id`.
pub fn stringify_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Batch form of [`rename_for_client`].
pub fn rename_many_for_client<I>(documents: I) -> Vec<Document>
where
    I: IntoIterator<Item = Document>,
{
    documents.into_iter().map(rename_for_client).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, SimpleModel};
    use bson::doc;

    #[test]
    fn id_renamed_and_coerced_by_default() {
        let model = SimpleModel::new("widgets");
        let oid = ObjectId::new();
        let item = doc! { "id": oid.to_hex(), "name": "thing" };
        let out = coerce_for_write(&model, &item);
        assert_eq!(out.get("_id"), Some(&Bson::ObjectId(oid)));
        assert_eq!(out.get_str("name").unwrap(), "thing");
        assert!(!out.contains_key("id"));
    }

    #[test]
    fn custom_id_preserved_verbatim() {
        let model = SimpleModel::new("widgets").with_custom_id();
        let item = doc! { "id": "slug-1" };
        let out = coerce_for_write(&model, &item);
        assert_eq!(out.get_str("_id").unwrap(), "slug-1");
    }

    #[test]
    fn is_id_fields_coerced_elementwise() {
        let model = SimpleModel::new("widgets")
            .with_field("otherId", FieldSpec::new().as_id());
        let a = ObjectId::new();
        let b = ObjectId::new();
        let item = doc! { "otherId": [a.to_hex(), b.to_hex()] };
        let out = coerce_for_write(&model, &item);
        assert_eq!(
            out.get_array("otherId").unwrap(),
            &vec![Bson::ObjectId(a), Bson::ObjectId(b)]
        );
    }

    #[test]
    fn physical_rename_applies_on_write() {
        let model = SimpleModel::new("widgets")
            .with_field("niceName", FieldSpec::new().with_field("n"));
        let item = doc! { "niceName": "x" };
        let out = coerce_for_write(&model, &item);
        assert_eq!(out.get_str("n").unwrap(), "x");
        assert!(!out.contains_key("niceName"));
    }

    #[test]
    fn rename_for_client_round_trips_object_id() {
        let oid = ObjectId::new();
        let document = doc! { "_id": oid, "name": "thing" };
        let out = rename_for_client(document);
        assert_eq!(out.get_str("id").unwrap(), oid.to_hex());
        assert!(!out.contains_key("_id"));
    }

    #[test]
    fn rename_for_client_is_noop_without_id() {
        let document = doc! { "name": "thing" };
        let out = rename_for_client(document.clone());
        assert_eq!(out, document);
    }
}
