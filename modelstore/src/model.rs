//! The model descriptor contract.
//!
//! A [`ModelDescriptor`] is a read-only, caller-provided capability the
//! engine consumes to learn a collection's name, its field metadata, and
//! its unique indexes. Unlike the teacher crate's `Doc` trait — a
//! compile-time marker tied to a single Rust type via `Doc::Id` — this
//! descriptor is a runtime value: the same engine instance may serve many
//! differently-shaped collections side by side, and a descriptor may be
//! constructed dynamically (from configuration, from a derive macro, or
//! by hand).

use std::collections::HashMap;

use crate::mapper::Mapper;

/// A single logical-field → physical-field mapping, plus the metadata the
/// Filter Compiler and Identifier Helper need to interpret it.
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    /// Physical (stored) field name, when it differs from the logical name.
    pub field: Option<String>,
    /// Default filter-type tag applied when a constraint doesn't override it.
    pub r#type: Option<String>,
    /// Whether values for this field should be coerced to native object
    /// identifiers on write.
    pub is_id: bool,
    /// Value mapper: absent means "use the default mapper lookup by logical
    /// name", `Some(Mapper::Disabled)` disables mapping outright.
    pub mapper: Option<Mapper>,
}

impl FieldSpec {
    /// Creates an empty field spec (no physical rename, no type override,
    /// not an identifier field, default mapper resolution).
    pub fn new() -> Self {
        FieldSpec::default()
    }

    /// Builder-style setter for `field`.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Builder-style setter for `type`.
    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.r#type = Some(ty.into());
        self
    }

    /// Builder-style setter marking this field as an identifier field.
    pub fn as_id(mut self) -> Self {
        self.is_id = true;
        self
    }

    /// Builder-style setter for `mapper`.
    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = Some(mapper);
        self
    }
}

/// A single index specification, as validated by [`crate::index`].
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Ordered key → direction mapping (`1` ascending, `-1` descending).
    pub key: Vec<(String, i32)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// TTL, in seconds, for a TTL index.
    pub expire_after_seconds: Option<i64>,
    /// Partial filter expression, restricting which documents are indexed.
    pub partial_filter_expression: Option<bson::Document>,
    /// Whether the index omits documents missing the indexed field(s).
    pub sparse: bool,
}

/// A unique-key candidate: an ordered list of logical field names whose
/// combined values uniquely identify a document.
pub type UniqueIndex = Vec<String>;

/// The read-only capability the engine consumes to interpret a collection.
///
/// Implementations are typically generated by `#[derive(Model)]` from
/// `modelstore_derive`, but the trait is fully hand-implementable; nothing
/// in the engine requires the derive.
pub trait ModelDescriptor {
    /// The collection name.
    fn table(&self) -> &str;

    /// An optional database override, superseding the configured default.
    fn database(&self) -> Option<&str> {
        None
    }

    /// Field metadata, keyed by logical field name.
    fn fields(&self) -> &HashMap<String, FieldSpec> {
        static EMPTY: std::sync::OnceLock<HashMap<String, FieldSpec>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashMap::new)
    }

    /// Looks up a single field's spec, if declared.
    fn field(&self, logical_name: &str) -> Option<&FieldSpec> {
        self.fields().get(logical_name)
    }

    /// Index specifications declared by this model.
    fn indexes(&self) -> &[IndexSpec] {
        &[]
    }

    /// Unique-key candidates, in declaration order.
    ///
    /// When `indexes()` is non-empty, implementations are expected to
    /// derive this from entries whose `unique` flag is set; callers that
    /// don't declare `indexes` may provide `unique_indexes` directly.
    fn unique_indexes(&self) -> &[UniqueIndex] {
        &[]
    }

    /// When true, the caller-supplied `id` is preserved as-is rather than
    /// coerced to a native object identifier.
    fn has_custom_id(&self) -> bool {
        false
    }
}

/// A plain-data [`ModelDescriptor`] implementation, useful for tests, ad hoc
/// models, and models assembled dynamically from configuration.
#[derive(Debug, Clone, Default)]
pub struct SimpleModel {
    /// The collection name.
    pub table: String,
    /// An optional database override.
    pub database: Option<String>,
    /// Field metadata, keyed by logical field name.
    pub fields: HashMap<String, FieldSpec>,
    /// Index specifications.
    pub indexes: Vec<IndexSpec>,
    /// Unique-key candidates.
    pub unique_indexes: Vec<UniqueIndex>,
    /// Whether `id` is a non-object-identifier scheme.
    pub has_custom_id: bool,
}

impl SimpleModel {
    /// Creates a new model descriptor for the named collection, with no
    /// field metadata, indexes, or unique indexes declared.
    pub fn new(table: impl Into<String>) -> Self {
        SimpleModel {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter for `database`.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder-style inserter for a single field spec.
    pub fn with_field(mut self, logical_name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(logical_name.into(), spec);
        self
    }

    /// Builder-style inserter for an index specification.
    ///
    /// Per the descriptor contract, a unique index also becomes a
    /// unique-key candidate, in declaration order.
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        if index.unique {
            let fields = index.key.iter().map(|(name, _)| name.clone()).collect();
            self.unique_indexes.push(fields);
        }
        self.indexes.push(index);
        self
    }

    /// Builder-style inserter for a unique-index candidate.
    pub fn with_unique_index(mut self, fields: UniqueIndex) -> Self {
        self.unique_indexes.push(fields);
        self
    }

    /// Builder-style setter marking this model as using a custom id scheme.
    pub fn with_custom_id(mut self) -> Self {
        self.has_custom_id = true;
        self
    }
}

impl ModelDescriptor for SimpleModel {
    fn table(&self) -> &str {
        &self.table
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn fields(&self) -> &HashMap<String, FieldSpec> {
        &self.fields
    }

    fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    fn unique_indexes(&self) -> &[UniqueIndex] {
        &self.unique_indexes
    }

    fn has_custom_id(&self) -> bool {
        self.has_custom_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_model_defaults() {
        let model = SimpleModel::new("widgets");
        assert_eq!(model.table(), "widgets");
        assert!(model.database().is_none());
        assert!(model.indexes().is_empty());
        assert!(model.unique_indexes().is_empty());
        assert!(!model.has_custom_id());
    }

    #[test]
    fn field_lookup_through_trait_default() {
        let model = SimpleModel::new("widgets")
            .with_field("otherId", FieldSpec::new().as_id());
        let spec = model.field("otherId").unwrap();
        assert!(spec.is_id);
        assert!(model.field("missing").is_none());
    }
}
