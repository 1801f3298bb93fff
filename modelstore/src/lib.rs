//! A typed, model-driven façade over a MongoDB-compatible document store.
//!
//! `modelstore` translates a compact, declarative query vocabulary —
//! filters, sorts, projections, increments, upserts — into native
//! document-store operations. Callers provide a [`model::ModelDescriptor`]
//! (by hand, or generated with `#[derive(Model)]` from `modelstore_derive`)
//! describing a collection's name, field metadata, and unique indexes; the
//! engine owns everything from there: connection pooling keyed by
//! endpoint, identifier coercion at the `id`/`_id` boundary, filter
//! compilation, and lifecycle timestamps.
//!
//! ```no_run
//! use modelstore::config::Config;
//! use modelstore::model::{FieldSpec, SimpleModel};
//! use modelstore::registry::ConnectionRegistry;
//! use modelstore::coll::{Collection, GetParams, ModelState};
//! use serde_json::json;
//!
//! # async fn run() -> modelstore::error::Result<()> {
//! let config = Config::validate(&json!({ "database": "app" }))?;
//! let model = SimpleModel::new("widgets")
//!     .with_field("otherId", FieldSpec::new().as_id())
//!     .with_unique_index(vec!["sku".into()]);
//!
//! let registry = ConnectionRegistry::new();
//! let handle = registry.resolve(&config, &model).await?;
//! let collection = Collection::new(handle, &model, config.limit);
//!
//! let mut state = ModelState::new();
//! let params = GetParams { filters: Some(json!({ "sku": "abc" })), ..Default::default() };
//! collection.get(&params, &mut state).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Out of scope (spec §1): bootstrapping the host process, authentication
//! secret storage, schema migrations, and the wire protocol itself — those
//! are left to the official `mongodb` driver and the caller.

pub mod coll;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod ident;
pub mod index;
pub mod mapper;
pub mod model;
pub mod prelude;
pub mod registry;
pub mod sort;
pub mod unique;

pub use error::{Error, ErrorKind, Result};
