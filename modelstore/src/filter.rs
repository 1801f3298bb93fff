//! The Filter Compiler (spec §4.4) — the centerpiece of the engine.
//!
//! Declarative filter input (a mapping of logical field → constraint, or an
//! ordered sequence of such mappings) compiles to a native document-store
//! query. The polymorphic constraint shape — scalar shorthand, sequence
//! shorthand, or a full `{value, type?, mapper?, raw?}` mapping — is
//! normalized once at entry (spec §9's design note), rather than scattering
//! shape checks across the compiler.

use bson::{doc, Bson, Document};
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::ident;
use crate::mapper::{self, Mapper};
use crate::model::ModelDescriptor;

/// How a constraint's `mapper` key (if any) overrides the field spec's
/// mapper.
enum MapperOverride {
    /// No override: defer to the field spec.
    None,
    /// `mapper: false` — mapping disabled for this constraint.
    Disabled,
    /// `mapper: "name"` — use the named built-in mapper.
    Named(String),
}

struct NormalizedConstraint {
    value: Value,
    r#type: Option<String>,
    mapper_override: MapperOverride,
    raw: bool,
}

/// Normalizes a raw constraint per spec §4.4.c: a mapping carrying a
/// `value` key is used as-is; anything else (scalar, sequence, bare
/// mapping without `value`, or `null`) is treated as shorthand for
/// `{value: <original>}`.
fn normalize_constraint(raw: &Value) -> NormalizedConstraint {
    if let Value::Object(map) = raw {
        if map.contains_key("value") {
            let value = map.get("value").cloned().unwrap_or(Value::Null);
            let r#type = map.get("type").and_then(Value::as_str).map(String::from);
            let raw_flag = map.get("raw").and_then(Value::as_bool).unwrap_or(false);
            let mapper_override = match map.get("mapper") {
                Some(Value::Bool(false)) => MapperOverride::Disabled,
                Some(Value::String(name)) => MapperOverride::Named(name.clone()),
                _ => MapperOverride::None,
            };
            return NormalizedConstraint {
                value,
                r#type,
                mapper_override,
                raw: raw_flag,
            };
        }
    }

    NormalizedConstraint {
        value: raw.clone(),
        r#type: None,
        mapper_override: MapperOverride::None,
        raw: false,
    }
}

fn resolve_mapper(
    field: Option<&crate::model::FieldSpec>,
    over: &MapperOverride,
    logical_name: &str,
) -> Option<Mapper> {
    match over {
        MapperOverride::Disabled => None,
        MapperOverride::Named(name) => Some(Mapper::Named(name.clone())),
        MapperOverride::None => match field.and_then(|f| f.mapper.clone()) {
            Some(Mapper::Disabled) => None,
            Some(m) => Some(m),
            None => mapper::default_mapper_for(logical_name).map(Mapper::func),
        },
    }
}

/// Maps a filter-type tag to its native operator, per the vocabulary table
/// in spec §4.4. Any tag beginning with `$` passes through unchanged (the
/// escape hatch); an unrecognized non-`$` tag is a compile error.
fn native_op(type_tag: &str) -> Result<String> {
    let op = match type_tag {
        "equal" => "$eq",
        "notEqual" => "$ne",
        "greater" => "$gt",
        "greaterOrEqual" => "$gte",
        "lesser" => "$lt",
        "lesserOrEqual" => "$lte",
        "in" => "$in",
        "notIn" => "$nin",
        "all" => "$all",
        "search" => "$regex",
        "exists" => "$exists",
        "elemMatch" => "$elemMatch",
        "nearSphere" => "$nearSphere",
        "geoIntersects" => "$geoIntersects",
        other if other.starts_with('$') => other,
        other => {
            return Err(Error::new(
                ErrorKind::InvalidFilterType,
                format!("unknown filter type {other:?}"),
            ))
        }
    };
    Ok(op.to_string())
}

/// Escapes regex metacharacters so a `search` constraint's value is matched
/// literally rather than interpreted as a pattern.
fn escape_regex(input: &str) -> String {
    regex::escape(input)
}

fn build_search_regex(value: &Bson) -> Bson {
    let pattern = match value {
        Bson::String(s) => escape_regex(s),
        other => escape_regex(&other.to_string()),
    };
    Bson::RegularExpression(bson::Regex {
        pattern,
        options: "i".to_string(),
    })
}

/// Compiles a single filter group (a logical-field → constraint mapping)
/// into a native filter document. The logical field `id` always renames
/// to the physical `_id` and coerces to a native object identifier,
/// matching every other boundary component (`sort::compile_sort`,
/// `ident::coerce_for_write`/`rename_for_client`).
fn compile_group(model: &dyn ModelDescriptor, group: &serde_json::Map<String, Value>) -> Result<Document> {
    let mut out = Document::new();

    for (logical, raw_constraint) in group {
        let field = model.field(logical);
        let physical = if logical == "id" {
            "_id".to_string()
        } else {
            field.and_then(|f| f.field.clone()).unwrap_or_else(|| logical.clone())
        };

        let normalized = normalize_constraint(raw_constraint);

        if normalized.raw {
            let value_bson = bson::to_bson(&normalized.value)?;
            out.insert(physical, value_bson);
            continue;
        }

        let value_bson = bson::to_bson(&normalized.value)?;
        let selected_mapper = resolve_mapper(field, &normalized.mapper_override, logical);
        let mapped = mapper::apply_elementwise(selected_mapper.as_ref(), value_bson)?;

        let type_tag = normalized
            .r#type
            .clone()
            .or_else(|| field.and_then(|f| f.r#type.clone()))
            .unwrap_or_else(|| {
                if matches!(mapped, Bson::Array(_)) {
                    "in".to_string()
                } else {
                    "equal".to_string()
                }
            });

        if type_tag == "text" {
            let frag = doc! {
                "$search": mapped,
                "$caseSensitive": false,
                "$diacriticSensitive": false,
            };
            out.insert("$text", frag);
            continue;
        }

        let is_id = logical == "id" || field.map(|f| f.is_id).unwrap_or(false);

        let coerced = if type_tag == "search" {
            build_search_regex(&mapped)
        } else if is_id {
            ident::coerce_value_for_filter(mapped)
        } else {
            mapped
        };

        let op = native_op(&type_tag)?;

        match out.get_document_mut(&physical) {
            Ok(existing) => {
                existing.insert(op, coerced);
            }
            Err(_) => {
                let mut frag = Document::new();
                frag.insert(op, coerced);
                out.insert(physical, frag);
            }
        }
    }

    Ok(out)
}

/// Compiles filter input per spec §4.4: `None`/empty ⇒ `{}`; a single
/// mapping ⇒ that group; a sequence of mappings of length > 1 ⇒
/// `{$or: [...]}`; a sequence of length 1 ⇒ indistinguishable from
/// compiling its sole group directly.
pub fn compile_filter(model: &dyn ModelDescriptor, input: Option<&Value>) -> Result<Document> {
    let input = match input {
        None | Some(Value::Null) => return Ok(Document::new()),
        Some(v) => v,
    };

    match input {
        Value::Object(map) if map.is_empty() => Ok(Document::new()),
        Value::Object(map) => compile_group(model, map),
        Value::Array(items) if items.is_empty() => Ok(Document::new()),
        Value::Array(items) => {
            let mut compiled = Vec::with_capacity(items.len());
            for item in items {
                let group = item.as_object().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidFilter, "each filter group must be a mapping")
                })?;
                compiled.push(compile_group(model, group)?);
            }

            if compiled.len() == 1 {
                Ok(compiled.into_iter().next().expect("length checked above"))
            } else {
                let mut out = Document::new();
                out.insert("$or", compiled.into_iter().map(Bson::Document).collect::<Vec<_>>());
                Ok(out)
            }
        }
        _ => Err(Error::new(
            ErrorKind::InvalidFilter,
            "filter must be a mapping or a sequence of mappings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, SimpleModel};
    use bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn empty_input_is_empty_filter() {
        let model = SimpleModel::new("widgets");
        assert_eq!(compile_filter(&model, None).unwrap(), Document::new());
        assert_eq!(compile_filter(&model, Some(&json!({}))).unwrap(), Document::new());
        assert_eq!(compile_filter(&model, Some(&json!([]))).unwrap(), Document::new());
    }

    #[test]
    fn non_object_non_array_is_invalid_filter() {
        let model = SimpleModel::new("widgets");
        let err = compile_filter(&model, Some(&json!("oops"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn scalar_shorthand_defaults_to_equal() {
        let model = SimpleModel::new("widgets");
        let out = compile_filter(&model, Some(&json!({ "name": "bar" }))).unwrap();
        assert_eq!(out, doc! { "name": { "$eq": "bar" } });
    }

    #[test]
    fn sequence_shorthand_defaults_to_in() {
        let model = SimpleModel::new("widgets");
        let out = compile_filter(&model, Some(&json!({ "tag": [1, 2] }))).unwrap();
        assert_eq!(out, doc! { "tag": { "$in": [1, 2] } });
    }

    #[test]
    fn null_value_is_kept_not_dropped() {
        let model = SimpleModel::new("widgets");
        let out = compile_filter(&model, Some(&json!({ "x": null }))).unwrap();
        assert_eq!(out, doc! { "x": { "$eq": Bson::Null } });
    }

    #[test]
    fn falsy_scalars_are_kept_verbatim() {
        let model = SimpleModel::new("widgets");
        for (input, expected) in [
            (json!({ "x": 0 }), Bson::Int32(0)),
            (json!({ "x": "" }), Bson::String(String::new())),
            (json!({ "x": false }), Bson::Boolean(false)),
        ] {
            let out = compile_filter(&model, Some(&input)).unwrap();
            assert_eq!(out.get_document("x").unwrap().get("$eq").unwrap(), &expected);
        }
    }

    #[test]
    fn unknown_non_dollar_type_is_invalid_filter_type() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "x": { "value": 1, "type": "bogus" } });
        let err = compile_filter(&model, Some(&input)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilterType);
    }

    #[test]
    fn dollar_prefixed_type_passes_through() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "x": { "value": 1, "type": "$customOp" } });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(out, doc! { "x": { "$customOp": 1 } });
    }

    #[test]
    fn raw_passthrough_skips_type_and_mapper() {
        let model = SimpleModel::new("widgets")
            .with_field("dateCreated", FieldSpec::new());
        let input = json!({ "dateCreated": { "value": { "$gt": "ignored" }, "raw": true } });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(out.get_document("dateCreated").unwrap().get_str("$gt").unwrap(), "ignored");
    }

    #[test]
    fn merges_fragments_on_shared_physical_key() {
        let model = SimpleModel::new("widgets")
            .with_field("dateFrom", FieldSpec::new().with_field("date").with_type("greaterOrEqual"))
            .with_field("dateTo", FieldSpec::new().with_field("date").with_type("lesserOrEqual"));
        let input = json!({ "dateFrom": "2019-12-11T00:00:00Z", "dateTo": "2019-12-11T23:59:59.999Z" });
        let out = compile_filter(&model, Some(&input)).unwrap();
        let frag = out.get_document("date").unwrap();
        assert!(frag.contains_key("$gte"));
        assert!(frag.contains_key("$lte"));
    }

    #[test]
    fn is_id_fields_are_coerced() {
        let model = SimpleModel::new("widgets").with_field("otherId", FieldSpec::new().as_id());
        let a = ObjectId::new();
        let b = ObjectId::new();
        let input = json!({ "otherId": [a.to_hex(), b.to_hex()] });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(
            out.get_document("otherId").unwrap().get_array("$in").unwrap(),
            &vec![Bson::ObjectId(a), Bson::ObjectId(b)],
        );
    }

    #[test]
    fn id_field_renames_to_underscore_id_and_coerces() {
        let model = SimpleModel::new("widgets");
        let oid = ObjectId::new();
        let input = json!({ "id": oid.to_hex() });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert!(!out.contains_key("id"));
        assert_eq!(out.get_document("_id").unwrap().get("$eq").unwrap(), &Bson::ObjectId(oid));
    }

    #[test]
    fn id_field_coerces_elementwise_under_in() {
        let model = SimpleModel::new("widgets");
        let a = ObjectId::new();
        let b = ObjectId::new();
        let input = json!({ "id": [a.to_hex(), b.to_hex()] });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(
            out.get_document("_id").unwrap().get_array("$in").unwrap(),
            &vec![Bson::ObjectId(a), Bson::ObjectId(b)],
        );
    }

    #[test]
    fn array_of_one_group_is_indistinguishable_from_direct() {
        let model = SimpleModel::new("widgets");
        let direct = compile_filter(&model, Some(&json!({ "x": 1 }))).unwrap();
        let wrapped = compile_filter(&model, Some(&json!([{ "x": 1 }]))).unwrap();
        assert_eq!(direct, wrapped);
    }

    #[test]
    fn array_of_many_groups_wraps_in_or() {
        let model = SimpleModel::new("widgets").with_field("otherId", FieldSpec::new().as_id());
        let oid = ObjectId::new();
        let input = json!([
            { "foo": "bar", "id": oid.to_hex() },
            { "baz": { "type": "equal", "value": [1, 2] } },
        ]);
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["$or"]);
        let branches = out.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn search_builds_case_insensitive_regex() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "name": { "value": "a.b", "type": "search" } });
        let out = compile_filter(&model, Some(&input)).unwrap();
        match out.get_document("name").unwrap().get("$regex").unwrap() {
            Bson::RegularExpression(re) => {
                assert_eq!(re.pattern, "a\\.b");
                assert_eq!(re.options, "i");
            }
            other => panic!("expected regex, got {other:?}"),
        }
    }

    #[test]
    fn text_type_emits_top_level_dollar_text() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "whatever": { "value": "hello", "type": "text" } });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert!(!out.contains_key("whatever"));
        let frag = out.get_document("$text").unwrap();
        assert_eq!(frag.get_str("$search").unwrap(), "hello");
        assert_eq!(frag.get_bool("$caseSensitive").unwrap(), false);
    }

    #[test]
    fn default_mapper_applies_to_well_known_date_fields() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "dateCreated": "2019-12-11T00:00:00Z" });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert!(matches!(
            out.get_document("dateCreated").unwrap().get("$eq").unwrap(),
            Bson::DateTime(_)
        ));
    }

    #[test]
    fn mapper_false_on_field_spec_disables_default() {
        let model = SimpleModel::new("widgets")
            .with_field("dateCreated", FieldSpec::new().with_mapper(Mapper::Disabled));
        let input = json!({ "dateCreated": "2019-12-11T00:00:00Z" });
        let out = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(
            out.get_document("dateCreated").unwrap().get_str("$eq").unwrap(),
            "2019-12-11T00:00:00Z"
        );
    }

    #[test]
    fn compiling_twice_is_idempotent() {
        let model = SimpleModel::new("widgets");
        let input = json!({ "x": 1, "y": "z" });
        let first = compile_filter(&model, Some(&input)).unwrap();
        let second = compile_filter(&model, Some(&input)).unwrap();
        assert_eq!(first, second);
    }
}
