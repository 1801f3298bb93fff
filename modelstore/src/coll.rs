//! The Query Engine (spec §4.6) — public operations over a resolved
//! collection.
//!
//! Grounded on the teacher's `Collection<T: Doc>` (`avocado/src/coll.rs`):
//! the same sequencing (compile → matcher → driver call, with every
//! driver call wrapped in error context) carries over, generalized from a
//! compile-time `T: Doc` type parameter to a runtime `&dyn ModelDescriptor`
//! and from synchronous calls to `async fn`s against the official async
//! driver.

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    CountOptions, FindOneAndUpdateOptions, FindOptions, InsertManyOptions, ReturnDocument, UpdateOptions,
};
use mongodb::Cursor;
use serde_json::Value;

use crate::cursor::{self, PagedTotals};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::filter;
use crate::ident;
use crate::index::{self, normalize_existing_index};
use crate::model::{IndexSpec, ModelDescriptor};
use crate::sort;
use crate::unique;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// The per-model totals cache (spec §3 "Query Totals Cache", §9 "Totals
/// cache"). Deliberately owned by the caller, not the engine: co-locating
/// it with the model instance means `getTotals` needs no extra arguments.
/// This is NOT thread-safe — callers sharing a model across parallel
/// workers must serialize `get`/`getTotals` calls themselves.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    last_filters: Option<Document>,
    last_limit: Option<u64>,
    last_page: Option<u64>,
    last_order: Option<Document>,
    last_query_has_results: bool,
}

impl ModelState {
    /// Creates a fresh, empty totals cache.
    pub fn new() -> Self {
        ModelState::default()
    }
}

/// Parameters for [`Collection::get`].
#[derive(Debug, Clone, Default)]
pub struct GetParams {
    /// Declarative filter input, as accepted by the Filter Compiler.
    pub filters: Option<Value>,
    /// Declarative sort input, as accepted by the Sort Parser.
    pub order: Option<Value>,
    /// Page size; defaults to the configured limit.
    pub limit: Option<u64>,
    /// 1-based page number; defaults to 1.
    pub page: Option<u64>,
    /// Inclusion projection (logical field names). Wins over `exclude_fields`.
    pub fields: Option<Vec<String>>,
    /// Exclusion projection (logical field names).
    pub exclude_fields: Option<Vec<String>>,
    /// When `Some("cursor")`, `get` returns the driver cursor unmaterialized.
    pub return_type: Option<String>,
}

/// The result of [`Collection::get`].
pub enum GetOutcome {
    /// Materialized, `id`-renamed documents.
    Documents(Vec<Document>),
    /// The raw driver cursor, for callers that asked for `returnType: "cursor"`.
    Cursor(Cursor<Document>),
}

/// Options for [`Collection::update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFlags {
    /// Update only the first match rather than every match.
    pub update_one: bool,
    /// Skip injecting `dateModified` on the updated document(s).
    pub skip_automatic_set_modified_data: bool,
}

/// A single bulk update/upsert operation for [`Collection::multi_update`].
pub struct BulkUpdateOp {
    /// Declarative filter selecting the target document(s).
    pub filter: Value,
    /// The update payload (merged into `$set`).
    pub data: Document,
    /// Update only the first match.
    pub update_one: bool,
}

/// Structured summary returned by `multi_update` when `raw_response` is
/// requested. Field names and shape follow spec §4.6's `multiUpdate`
/// `rawResponse` contract exactly.
#[derive(Debug, Clone, Default)]
pub struct BulkUpdateSummary {
    /// Whether every operation succeeded.
    pub success: bool,
    /// Total documents modified across all operations.
    pub modified_count: u64,
    /// Total documents matched across all operations.
    pub matched_count: u64,
    /// Total documents upserted (none — `multi_update` never upserts).
    pub upserted_count: u64,
    /// Error messages collected across every failed operation.
    pub write_errors: Vec<String>,
    /// Per-operation outcomes, in input order.
    pub operations: Vec<BulkUpdateOpResult>,
}

/// Per-operation outcome within a [`BulkUpdateSummary`].
#[derive(Debug, Clone)]
pub struct BulkUpdateOpResult {
    /// Index of the operation within the input sequence.
    pub index: usize,
    /// Whether this operation succeeded.
    pub success: bool,
    /// Error messages, if this operation failed.
    pub errors: Vec<String>,
}

fn build_projection(params: &GetParams) -> Option<Document> {
    let rename = |field: &str| if field == "id" { "_id".to_string() } else { field.to_string() };

    if let Some(fields) = &params.fields {
        let mut projection = Document::new();
        for field in fields {
            projection.insert(rename(field), 1);
        }
        return Some(projection);
    }

    if let Some(fields) = &params.exclude_fields {
        let mut projection = Document::new();
        for field in fields {
            projection.insert(rename(field), 0);
        }
        return Some(projection);
    }

    None
}

/// A resolved collection handle, bound to a single model descriptor for
/// the duration of the calls made through it.
pub struct Collection<'a> {
    inner: mongodb::Collection<Document>,
    model: &'a dyn ModelDescriptor,
    default_limit: u64,
}

impl<'a> Collection<'a> {
    /// Wraps an already-resolved driver collection handle. Use
    /// [`crate::registry::ConnectionRegistry::resolve`] to obtain one.
    pub fn new(inner: mongodb::Collection<Document>, model: &'a dyn ModelDescriptor, default_limit: u64) -> Self {
        Collection { inner, model, default_limit }
    }

    /// `get(model, params)` — spec §4.6.
    pub async fn get(&self, params: &GetParams, state: &mut ModelState) -> Result<GetOutcome> {
        let filter = filter::compile_filter(self.model, params.filters.as_ref())
            .chain(|| format!("compiling filter for {}", self.model.table()))?;
        let sort = params.order.as_ref().and_then(sort::compile_sort);

        let limit = params.limit.unwrap_or(self.default_limit).max(1);
        let page = params.page.unwrap_or(1).max(1);
        let skip = limit.saturating_mul(page - 1);

        let mut options = FindOptions::default();
        options.limit = i64::try_from(limit).ok();
        options.skip = Some(skip);
        options.sort = sort.clone();
        options.projection = build_projection(params);

        state.last_filters = Some(filter.clone());
        state.last_limit = Some(limit);
        state.last_page = Some(page);
        state.last_order = sort;

        if params.return_type.as_deref() == Some("cursor") {
            let driver_cursor = self
                .inner
                .find(filter, options)
                .await
                .chain(|| format!("finding documents in {}", self.model.table()))?;
            return Ok(GetOutcome::Cursor(driver_cursor));
        }

        let mut driver_cursor = self
            .inner
            .find(filter, options)
            .await
            .chain(|| format!("finding documents in {}", self.model.table()))?;

        let mut documents = Vec::new();
        while let Some(document) = driver_cursor
            .try_next()
            .await
            .chain(|| format!("draining cursor for {}", self.model.table()))?
        {
            documents.push(ident::rename_for_client(document));
        }

        state.last_query_has_results = !documents.is_empty();

        Ok(GetOutcome::Documents(documents))
    }

    /// `distinct(model, {key, filters?})` — spec §4.6.
    pub async fn distinct(&self, key: &str, filters: Option<&Value>) -> Result<Vec<Bson>> {
        if key.is_empty() {
            return Err(Error::new(ErrorKind::InvalidDistinctKey, "distinct key must be a non-empty string"));
        }

        let filter = filter::compile_filter(self.model, filters)?;
        self.inner
            .distinct(key, filter, None)
            .await
            .chain(|| format!("distinct {key} on {}", self.model.table()))
    }

    /// `save(model, item, setOnInsert?)` — spec §4.6.
    pub async fn save(&self, item: &Document, set_on_insert: Option<&Document>) -> Result<Option<String>> {
        let coerced = ident::coerce_for_write(self.model, item);
        let filter = unique::unique_filter(self.model, &coerced)?;

        let mut body = coerced.clone();
        body.remove("_id");
        body.remove("dateCreated");
        body.remove("dateModified");

        let mut insert_only = doc! { "dateCreated": bson::DateTime::now() };
        if let Some(extra) = set_on_insert {
            for (key, value) in extra {
                if !body.contains_key(key) {
                    insert_only.insert(key.clone(), value.clone());
                }
            }
        }

        let update = doc! {
            "$set": body,
            "$currentDate": { "dateModified": true },
            "$setOnInsert": insert_only,
        };

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let result = self
            .inner
            .find_one_and_update(filter, update, options)
            .await
            .chain(|| format!("saving document in {}", self.model.table()))?;

        Ok(result.and_then(|doc| doc.get("_id").map(ident::stringify_id)))
    }

    /// `multiSave(model, items, setOnInsert?)` — spec §4.6.
    ///
    /// The official driver's bulk-write API does not mix heterogeneous
    /// upserts the way the teacher's `bulkWrite(operations)` does, so this
    /// is expressed as a sequence of per-item upserts rather than a single
    /// bulk request; the public contract (succeeds as a whole, returns
    /// `true`) is unchanged.
    pub async fn multi_save(&self, items: &[Document], set_on_insert: Option<&Document>) -> Result<bool> {
        if items.is_empty() {
            return Err(Error::new(ErrorKind::InvalidItem, "multiSave requires at least one item"));
        }

        for item in items {
            self.save(item, set_on_insert).await?;
        }

        Ok(true)
    }

    /// `insert(model, item)` — spec §4.6.
    pub async fn insert(&self, item: &Document) -> Result<String> {
        let mut coerced = ident::coerce_for_write(self.model, item);
        coerced.insert("dateCreated", bson::DateTime::now());

        let result = self
            .inner
            .insert_one(coerced, None)
            .await
            .chain(|| format!("inserting document into {}", self.model.table()))?;

        Ok(ident::stringify_id(&result.inserted_id))
    }

    /// `multiInsert(model, items, {failOnDuplicateErrors?})` — spec §4.6.
    pub async fn multi_insert(&self, items: &[Document], fail_on_duplicate_errors: bool) -> Result<Vec<Document>> {
        if items.is_empty() {
            return Err(Error::new(ErrorKind::InvalidItem, "multiInsert requires a non-empty sequence of items"));
        }

        let now = bson::DateTime::now();
        let coerced: Vec<Document> = items
            .iter()
            .map(|item| {
                let mut doc = ident::coerce_for_write(self.model, item);
                doc.insert("dateCreated", now);
                doc
            })
            .collect();

        let options = InsertManyOptions::builder().ordered(false).build();

        match self.inner.insert_many(coerced.clone(), options).await {
            Ok(result) => Ok(zip_inserted(&coerced, result.inserted_ids.into_iter())),
            Err(err) => {
                if !fail_on_duplicate_errors {
                    if let mongodb::error::ErrorKind::BulkWrite(ref failure) = *err.kind {
                        let duplicates_only = failure
                            .write_errors
                            .as_ref()
                            .map(|errs| !errs.is_empty() && errs.iter().all(|e| e.code == DUPLICATE_KEY_CODE))
                            .unwrap_or(false);

                        if duplicates_only {
                            let inserted = failure.inserted_ids.clone();
                            return Ok(zip_inserted(&coerced, inserted.into_iter()));
                        }
                    }
                }
                Err(Error::from(err)).chain(|| format!("multiInsert into {}", self.model.table()))
            }
        }
    }

    /// `update(model, values, filter, options?)` — spec §4.6.
    pub async fn update(&self, values: &Document, filter: Option<&Value>, flags: UpdateFlags) -> Result<u64> {
        let mut body = ident::coerce_for_write(self.model, values);
        body.remove("_id");

        let mut set_doc = doc! { "$set": body.clone() };
        if !flags.skip_automatic_set_modified_data {
            set_doc.insert("$currentDate", doc! { "dateModified": true });
        }

        let compiled_filter = filter::compile_filter(self.model, filter)?;

        if flags.update_one {
            let result = self
                .inner
                .update_one(compiled_filter, set_doc, None)
                .await
                .chain(|| format!("updating one document in {}", self.model.table()))?;
            Ok(result.modified_count)
        } else {
            let result = self
                .inner
                .update_many(compiled_filter, set_doc, None)
                .await
                .chain(|| format!("updating documents in {}", self.model.table()))?;
            Ok(result.modified_count)
        }
    }

    /// `multiUpdate(model, operations, {rawResponse?})` — spec §4.6.
    pub async fn multi_update(&self, operations: &[BulkUpdateOp], raw_response: bool) -> Result<Option<BulkUpdateSummary>> {
        let mut summary = BulkUpdateSummary {
            success: true,
            ..Default::default()
        };

        for (index, op) in operations.iter().enumerate() {
            let compiled_filter = filter::compile_filter(self.model, Some(&op.filter))?;
            let mut body = ident::coerce_for_write(self.model, &op.data);
            body.remove("_id");
            let update = doc! {
                "$set": body,
                "$currentDate": { "dateModified": true },
            };

            let options = UpdateOptions::builder().build();
            let outcome = if op.update_one {
                self.inner.update_one(compiled_filter, update, options).await
            } else {
                self.inner.update_many(compiled_filter, update, options).await
            };

            match outcome {
                Ok(result) => {
                    summary.matched_count += result.matched_count;
                    summary.modified_count += result.modified_count;
                    summary.upserted_count += result.upserted_id.is_some() as u64;
                    summary.operations.push(BulkUpdateOpResult { index, success: true, errors: Vec::new() });
                }
                Err(err) => {
                    summary.success = false;
                    summary.write_errors.push(err.to_string());
                    summary.operations.push(BulkUpdateOpResult {
                        index,
                        success: false,
                        errors: vec![err.to_string()],
                    });
                }
            }
        }

        if !summary.success {
            return Err(Error::new(
                ErrorKind::MongoDbInternalError,
                format!("{} of {} multiUpdate operations failed", summary.operations.iter().filter(|o| !o.success).count(), operations.len()),
            ));
        }

        Ok(if raw_response { Some(summary) } else { None })
    }

    /// `remove(model, item)` — spec §4.6.
    pub async fn remove(&self, item: &Document) -> Result<bool> {
        let coerced = ident::coerce_for_write(self.model, item);
        let filter = unique::unique_filter(self.model, &coerced)?;

        let result = self
            .inner
            .delete_one(filter, None)
            .await
            .chain(|| format!("removing document from {}", self.model.table()))?;

        Ok(result.deleted_count == 1)
    }

    /// `multiRemove(model, filter)` — spec §4.6.
    pub async fn multi_remove(&self, filter: Option<&Value>) -> Result<u64> {
        let compiled_filter = filter::compile_filter(self.model, filter)?;

        let result = self
            .inner
            .delete_many(compiled_filter, None)
            .await
            .chain(|| format!("removing documents from {}", self.model.table()))?;

        Ok(result.deleted_count)
    }

    /// `increment(model, filter, incrementData, setData?)` — spec §4.6.
    pub async fn increment(
        &self,
        filter: Option<&Value>,
        increment_data: &Document,
        set_data: Option<&Document>,
    ) -> Result<Option<Document>> {
        if increment_data.is_empty() || !increment_data.iter().all(|(_, v)| matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))) {
            return Err(Error::new(ErrorKind::InvalidIncrementData, "incrementData must be a non-empty mapping of field to number"));
        }

        let compiled_filter = filter::compile_filter(self.model, filter)?;

        let mut update = doc! {
            "$inc": increment_data.clone(),
            "$currentDate": { "dateModified": true },
        };
        if let Some(set_data) = set_data {
            update.insert("$set", ident::coerce_for_write(self.model, set_data));
        }

        let options = FindOneAndUpdateOptions::builder()
            .upsert(false)
            .return_document(ReturnDocument::After)
            .build();

        let result = self
            .inner
            .find_one_and_update(compiled_filter, update, options)
            .await
            .chain(|| format!("incrementing document in {}", self.model.table()))?;

        Ok(result.map(ident::rename_for_client))
    }

    /// `getTotals(model, filter?, {limit?}?)` — spec §4.6.
    pub async fn get_totals(&self, filter: Option<&Value>, limit: Option<u64>, state: &ModelState) -> Result<Totals> {
        let effective_filter = match (filter, &state.last_filters) {
            (None, None) => return Ok(Totals { total: 0, page_size: None, pages: 0, page: None }),
            (Some(f), _) => filter::compile_filter(self.model, Some(f))?,
            (None, Some(cached)) => cached.clone(),
        };

        let page_size = limit.or(state.last_limit);

        let mut count_options = CountOptions::default();
        if let Some(cap) = page_size {
            count_options.limit = i64::try_from(cap).ok();
        }

        let total = self
            .inner
            .count_documents(effective_filter, count_options)
            .await
            .chain(|| format!("counting documents in {}", self.model.table()))?;

        let pages = page_size.filter(|&p| p > 0).map(|p| total.div_ceil(p)).unwrap_or(0);

        Ok(Totals { total, page_size, pages, page: state.last_page })
    }

    /// `getPaged(model, params, callback)` — spec §4.6.
    pub async fn get_paged<F, Fut>(&self, params: &GetParams, callback: F) -> Result<PagedTotals>
    where
        F: FnMut(Vec<Document>, u64, u64) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let filter = filter::compile_filter(self.model, params.filters.as_ref())?;
        let sort = params.order.as_ref().and_then(sort::compile_sort);
        let batch_size = params.limit.unwrap_or(self.default_limit).max(1);

        cursor::get_paged(&self.inner, filter, sort, batch_size, callback).await
    }

    /// `getIndexes(model)` — spec §4.6.
    pub async fn get_indexes(&self) -> Result<Vec<Document>> {
        let mut cursor = self
            .inner
            .list_indexes(None)
            .await
            .chain(|| format!("listing indexes for {}", self.model.table()))?;

        let mut out = Vec::new();
        while let Some(index_model) = cursor.try_next().await.chain(|| "draining index cursor")? {
            let raw = bson::to_document(&index_model)?;
            out.push(normalize_existing_index(&raw));
        }

        Ok(out)
    }

    /// `createIndex(model, spec)` — spec §4.6/§4.8.
    pub async fn create_index(&self, spec: &Value) -> Result<String> {
        let validated = index::validate_index(spec)?;
        self.create_index_internal(validated).await
    }

    /// `createIndexes(model, specs)` — spec §4.6/§4.8.
    pub async fn create_indexes(&self, specs: &[Value]) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            names.push(self.create_index(spec).await?);
        }
        Ok(names)
    }

    async fn create_index_internal(&self, spec: IndexSpec) -> Result<String> {
        let mut key = Document::new();
        for (field, direction) in &spec.key {
            key.insert(field.clone(), *direction);
        }

        let mut options_builder = mongodb::options::IndexOptions::builder()
            .name(spec.name.clone())
            .unique(spec.unique)
            .sparse(spec.sparse);

        if let Some(ttl) = spec.expire_after_seconds {
            options_builder = options_builder.expire_after(std::time::Duration::from_secs(ttl.max(0) as u64));
        }
        if let Some(partial) = spec.partial_filter_expression.clone() {
            options_builder = options_builder.partial_filter_expression(partial);
        }

        let index_model = mongodb::IndexModel::builder().keys(key).options(options_builder.build()).build();

        let result = self
            .inner
            .create_index(index_model, None)
            .await
            .chain(|| format!("creating index on {}", self.model.table()))?;

        Ok(result.index_name)
    }

    /// `dropIndex(model, name)` — spec §4.6.
    pub async fn drop_index(&self, name: &str) -> Result<()> {
        self.inner
            .drop_index(name, None)
            .await
            .chain(|| format!("dropping index {name} on {}", self.model.table()))
    }

    /// `dropIndexes(model, names)` — spec §4.6.
    pub async fn drop_indexes(&self, names: &[String]) -> Result<()> {
        for name in names {
            self.drop_index(name).await?;
        }
        Ok(())
    }
}

/// Result of [`Collection::get_totals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    /// Total documents matching the (possibly cached) filter.
    pub total: u64,
    /// Page size used to compute `pages`, if known.
    pub page_size: Option<u64>,
    /// Number of pages at `page_size`.
    pub pages: u64,
    /// The page number of the last recorded `get`, if any.
    pub page: Option<u64>,
}

fn zip_inserted(items: &[Document], inserted_ids: impl Iterator<Item = (usize, Bson)>) -> Vec<Document> {
    let mut by_index: std::collections::HashMap<usize, Bson> = inserted_ids.collect();
    let mut out = Vec::with_capacity(by_index.len());

    for (i, item) in items.iter().enumerate() {
        if let Some(id) = by_index.remove(&i) {
            let mut with_id = item.clone();
            with_id.insert("id", ident::stringify_id(&id));
            out.push(with_id);
        }
    }

    out
}
