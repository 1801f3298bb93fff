//! The value-mapper registry (spec §4.4, §9 design notes).
//!
//! A mapper transforms a constraint's `value` before it is emitted into the
//! compiled filter, element-wise across sequences. Three shapes are
//! supported: a named lookup against a small built-in registry, a
//! caller-supplied function pointer, and an explicit `false` disabling
//! mapping altogether for a field that would otherwise get a default.

use std::fmt;

use bson::{Bson, DateTime};
use chrono::{DateTime as ChronoDateTime, Utc};

use crate::error::{Error, ErrorKind, Result};

/// A mapper attached to a [`crate::model::FieldSpec`].
#[derive(Clone)]
pub enum Mapper {
    /// Disables mapping outright, even if a default would otherwise apply.
    Disabled,
    /// Look up a named mapper in the built-in registry at compile time.
    Named(String),
    /// A caller-supplied transform.
    Func(std::sync::Arc<dyn Fn(Bson) -> Bson + Send + Sync>),
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapper::Disabled => f.write_str("Mapper::Disabled"),
            Mapper::Named(name) => f.debug_tuple("Mapper::Named").field(name).finish(),
            Mapper::Func(_) => f.write_str("Mapper::Func(..)"),
        }
    }
}

impl Mapper {
    /// Convenience constructor for a caller-supplied function mapper.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        Mapper::Func(std::sync::Arc::new(f))
    }
}

/// Resolves the named built-in mapper, returning a configuration error if
/// the name is unknown. This is a *compile-time* error per spec §4.4.e —
/// it must surface before any driver call is issued.
fn resolve_named(name: &str) -> Result<fn(Bson) -> Bson> {
    match name {
        "toDate" => Ok(to_date as fn(Bson) -> Bson),
        other => Err(Error::new(
            ErrorKind::InvalidFilterType,
            format!("unknown mapper {other:?}"),
        )),
    }
}

/// The built-in default mapper lookup by logical field name (spec §4.4.e).
///
/// Fields whose logical name is one of the well-known timestamp fields are
/// passed through `toDate` unless the field spec overrides or disables it.
pub fn default_mapper_for(logical_name: &str) -> Option<fn(Bson) -> Bson> {
    match logical_name {
        "dateCreated"
        | "dateCreatedFrom"
        | "dateCreatedTo"
        | "dateModified"
        | "dateModifiedFrom"
        | "dateModifiedTo" => Some(to_date as fn(Bson) -> Bson),
        _ => None,
    }
}

/// `toDate`: strings parse as RFC 3339 timestamps, falling back to "now" on
/// a parse failure; an already-`DateTime` value passes through unchanged;
/// anything else is returned verbatim (the compiler does not reject it —
/// mappers are best-effort transforms, not validators).
pub fn to_date(value: Bson) -> Bson {
    match value {
        Bson::String(ref s) => match ChronoDateTime::parse_from_rfc3339(s) {
            Ok(parsed) => Bson::DateTime(DateTime::from_chrono(parsed.with_timezone(&Utc))),
            Err(_) => Bson::DateTime(DateTime::now()),
        },
        Bson::DateTime(dt) => Bson::DateTime(dt),
        other => other,
    }
}

/// Applies `mapper` to `value`, resolving named mappers against the
/// built-in registry. `None` means "no mapper configured for this field" —
/// callers should have already substituted the logical-name default before
/// calling this, if any applies.
pub fn apply(mapper: Option<&Mapper>, value: Bson) -> Result<Bson> {
    match mapper {
        None | Some(Mapper::Disabled) => Ok(value),
        Some(Mapper::Named(name)) => Ok(resolve_named(name)?(value)),
        Some(Mapper::Func(f)) => Ok(f(value)),
    }
}

/// Applies a mapper element-wise across a `Bson::Array`, or once to a
/// scalar value.
pub fn apply_elementwise(mapper: Option<&Mapper>, value: Bson) -> Result<Bson> {
    match value {
        Bson::Array(items) => {
            let mapped: Result<Vec<Bson>> =
                items.into_iter().map(|item| apply(mapper, item)).collect();
            Ok(Bson::Array(mapped?))
        }
        scalar => apply(mapper, scalar),
    }
}
