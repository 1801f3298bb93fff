//! End-to-end tests against a real, containerized MongoDB instance.
//!
//! Every test here is `#[ignore]`d because it needs a Docker daemon;
//! grounded on `dbflux_driver_mongodb`'s own `tests/live_integration.rs`,
//! down to the "spin up a container, hand the URL to a closure, run a
//! blocking `tokio` runtime inside it" shape — the engine's operations are
//! all `async fn`s, so each test builds its own current-thread runtime
//! rather than relying on `#[tokio::test]`, keeping the container (a plain
//! `testcontainers::Container`, not `Send`-friendly across an executor
//! hop) and the runtime on the same thread.
//!
//! Run with `cargo test --test live_integration -- --ignored`.

mod support;

use bson::doc;
use modelstore::coll::{BulkUpdateOp, Collection, GetOutcome, GetParams, ModelState, UpdateFlags};
use modelstore::config::Config;
use modelstore::model::{FieldSpec, SimpleModel};
use modelstore::registry::ConnectionRegistry;
use serde_json::json;

fn widget_model() -> SimpleModel {
    SimpleModel::new("widgets")
        .with_field("sku", FieldSpec::new())
        .with_unique_index(vec!["sku".to_string()])
}

fn connect(uri: &str) -> Config {
    Config::validate(&json!({ "connectionString": uri })).expect("valid connection string")
}

#[test]
#[ignore = "requires Docker daemon"]
fn connects_and_resolves_collection() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();

            let handle = registry.resolve(&config, &model).await.expect("resolve collection");
            assert_eq!(handle.name(), "widgets");
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn insert_then_get_round_trips_a_document() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            let id = collection
                .insert(&doc! { "sku": "abc-1", "name": "Left Widget" })
                .await
                .expect("insert");
            assert!(!id.is_empty());

            let mut state = ModelState::new();
            let params = GetParams {
                filters: Some(json!({ "sku": "abc-1" })),
                ..Default::default()
            };
            let outcome = collection.get(&params, &mut state).await.expect("get");

            let GetOutcome::Documents(docs) = outcome else {
                panic!("expected materialized documents");
            };
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].get_str("name").unwrap(), "Left Widget");
            assert_eq!(docs[0].get_str("id").unwrap(), id);
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn get_by_id_finds_the_inserted_document() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            let id = collection
                .insert(&doc! { "sku": "by-id-1", "name": "Findable Widget" })
                .await
                .expect("insert");

            let mut state = ModelState::new();
            let params = GetParams { filters: Some(json!({ "id": id })), ..Default::default() };
            let GetOutcome::Documents(docs) = collection.get(&params, &mut state).await.expect("get by id") else {
                panic!("expected materialized documents");
            };

            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].get_str("sku").unwrap(), "by-id-1");
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn save_upserts_by_unique_index_then_updates_in_place() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            let first_id = collection
                .save(&doc! { "sku": "abc-2", "name": "Right Widget" }, None)
                .await
                .expect("save inserts")
                .expect("returns an id");

            let second_id = collection
                .save(&doc! { "sku": "abc-2", "name": "Right Widget, renamed" }, None)
                .await
                .expect("save updates")
                .expect("returns the same id");

            assert_eq!(first_id, second_id);

            let mut state = ModelState::new();
            let params = GetParams {
                filters: Some(json!({ "sku": "abc-2" })),
                ..Default::default()
            };
            let GetOutcome::Documents(docs) = collection.get(&params, &mut state).await.unwrap() else {
                panic!("expected materialized documents");
            };
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].get_str("name").unwrap(), "Right Widget, renamed");
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn multi_insert_ignores_duplicates_when_not_failing_on_them() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            collection
                .insert(&doc! { "sku": "dup-1", "name": "Original" })
                .await
                .expect("seed insert");

            let accepted = collection
                .multi_insert(
                    &[
                        doc! { "sku": "dup-1", "name": "Duplicate" },
                        doc! { "sku": "fresh-1", "name": "New Widget" },
                    ],
                    false,
                )
                .await
                .expect("multiInsert tolerates the duplicate");

            assert_eq!(accepted.len(), 1);
            assert_eq!(accepted[0].get_str("sku").unwrap(), "fresh-1");
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn update_and_remove_affect_matching_documents() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            collection.insert(&doc! { "sku": "upd-1", "name": "Before" }).await.unwrap();

            let modified = collection
                .update(
                    &doc! { "name": "After" },
                    Some(&json!({ "sku": "upd-1" })),
                    UpdateFlags { update_one: true, ..Default::default() },
                )
                .await
                .expect("update");
            assert_eq!(modified, 1);

            let removed = collection.remove(&doc! { "sku": "upd-1" }).await.expect("remove");
            assert!(removed);

            let mut state = ModelState::new();
            let params = GetParams { filters: Some(json!({ "sku": "upd-1" })), ..Default::default() };
            let GetOutcome::Documents(docs) = collection.get(&params, &mut state).await.unwrap() else {
                panic!("expected materialized documents");
            };
            assert!(docs.is_empty());
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn multi_update_applies_every_operation() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            collection.insert(&doc! { "sku": "bulk-1", "name": "A" }).await.unwrap();
            collection.insert(&doc! { "sku": "bulk-2", "name": "B" }).await.unwrap();

            let ops = vec![
                BulkUpdateOp { filter: json!({ "sku": "bulk-1" }), data: doc! { "name": "A2" }, update_one: true },
                BulkUpdateOp { filter: json!({ "sku": "bulk-2" }), data: doc! { "name": "B2" }, update_one: true },
            ];

            let summary = collection.multi_update(&ops, true).await.expect("multiUpdate").expect("raw response requested");
            assert!(summary.success);
            assert_eq!(summary.modified_count, 2);
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn increment_bumps_a_numeric_field() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            collection.insert(&doc! { "sku": "inc-1", "stock": 3i32 }).await.unwrap();

            let updated = collection
                .increment(Some(&json!({ "sku": "inc-1" })), &doc! { "stock": 2i32 }, None)
                .await
                .expect("increment")
                .expect("matched a document");

            assert_eq!(updated.get_i32("stock").unwrap(), 5);
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn get_paged_visits_every_page() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            for i in 0..5 {
                collection
                    .insert(&doc! { "sku": format!("page-{i}"), "batch": "paged" })
                    .await
                    .unwrap();
            }

            let params = GetParams {
                filters: Some(json!({ "batch": "paged" })),
                limit: Some(2),
                ..Default::default()
            };

            let mut seen = 0u64;
            let totals = collection
                .get_paged(&params, |page, _page_number, _page_count| {
                    seen += page.len() as u64;
                    async { Ok(()) }
                })
                .await
                .expect("getPaged");

            assert_eq!(totals.total, 5);
            assert_eq!(seen, 5);
        });
    });
}

#[test]
#[ignore = "requires Docker daemon"]
fn index_lifecycle_create_list_drop() {
    support::with_mongodb_url(|uri| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = connect(&uri);
            let registry = ConnectionRegistry::new();
            let model = widget_model();
            let handle = registry.resolve(&config, &model).await.unwrap();
            let collection = Collection::new(handle, &model, config.limit);

            let name = collection
                .create_index(&json!({ "key": { "sku": 1 }, "unique": true }))
                .await
                .expect("createIndex");

            let indexes = collection.get_indexes().await.expect("getIndexes");
            assert!(indexes.iter().any(|index| index.get_str("name").ok() == Some(name.as_str())));

            collection.drop_index(&name).await.expect("dropIndex");

            let indexes_after = collection.get_indexes().await.expect("getIndexes after drop");
            assert!(!indexes_after.iter().any(|index| index.get_str("name").ok() == Some(name.as_str())));
        });
    });
}
