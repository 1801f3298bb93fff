//! The Connection Registry (spec §4.2, §5, §9).
//!
//! Keyed by endpoint (`{protocol}{user:pass@}{host}:{port}`), this holds at
//! most one driver client per endpoint and at most one database handle per
//! `(endpoint, database)` pair. Concurrent first-resolvers of the same
//! endpoint must coalesce into a single connect attempt; this is the
//! "single-flight per endpoint key" design note of spec §9, implemented
//! with a narrow `std::sync::Mutex` critical section that never spans an
//! `.await`, and a per-key [`tokio::sync::OnceCell`] that performs the
//! actual (possibly slow) connect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use mongodb::{Client, Database};
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::model::ModelDescriptor;

type ClientCell = Arc<OnceCell<Client>>;

/// Process-wide (or caller-scoped) cache of driver clients and database
/// handles, deduplicated by endpoint.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<String, ClientCell>>,
    databases: Mutex<HashMap<(String, String), Database>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry with no cached clients or database
    /// handles.
    pub fn new() -> Self {
        ConnectionRegistry::default()
    }

    /// Returns (lazily connecting, if necessary) the driver client for
    /// `config`'s endpoint. Concurrent callers racing to resolve the same
    /// endpoint key coalesce onto one in-flight connect attempt.
    pub async fn client_for(&self, config: &Config) -> Result<Client> {
        let key = config.endpoint_key();

        let cell = {
            let mut clients = self.clients.lock().expect("connection registry poisoned");
            clients.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let client = cell
            .get_or_try_init(|| async {
                debug!("connecting to endpoint {key}");
                let mut options = mongodb::options::ClientOptions::parse(config.connection_string())
                    .await
                    .map_err(Error::from)?;
                options.app_name = options.app_name.or_else(|| Some("modelstore".to_string()));
                Client::with_options(options).map_err(Error::from)
            })
            .await?;

        Ok(client.clone())
    }

    /// Returns (caching per `(endpoint, database)`) the database handle a
    /// model resolves against: `model.database()` when set, otherwise
    /// `config.database`.
    pub async fn database_for(
        &self,
        config: &Config,
        model: &dyn ModelDescriptor,
    ) -> Result<Database> {
        let endpoint = config.endpoint_key();
        let database_name = model.database().unwrap_or(&config.database).to_string();
        let cache_key = (endpoint.clone(), database_name.clone());

        if let Some(db) = self.databases.lock().expect("connection registry poisoned").get(&cache_key) {
            return Ok(db.clone());
        }

        let client = self.client_for(config).await?;
        let db = client.database(&database_name);

        self.databases
            .lock()
            .expect("connection registry poisoned")
            .insert(cache_key, db.clone());

        Ok(db)
    }

    /// Resolves the `mongodb::Collection<bson::Document>` handle a model
    /// operation runs against (spec §4.2's `resolve`).
    pub async fn resolve(
        &self,
        config: &Config,
        model: &dyn ModelDescriptor,
    ) -> Result<mongodb::Collection<bson::Document>> {
        if model.table().is_empty() {
            return Err(Error::new(ErrorKind::InvalidModel, "model has no table name"));
        }

        let db = self.database_for(config, model).await?;
        Ok(db.collection(model.table()))
    }

    /// Drains and drops all cached clients and database handles — the
    /// process-end lifecycle hook of spec §5.
    pub fn shutdown(&self) {
        let mut clients = self.clients.lock().expect("connection registry poisoned");
        let mut databases = self.databases.lock().expect("connection registry poisoned");

        if !clients.is_empty() {
            warn!("shutting down connection registry: dropping {} cached client(s)", clients.len());
        }

        databases.clear();
        clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_registry_has_no_cached_state() {
        let registry = ConnectionRegistry::new();
        assert!(registry.clients.lock().unwrap().is_empty());
        assert!(registry.databases.lock().unwrap().is_empty());
    }

    #[test]
    fn shutdown_clears_caches() {
        let registry = ConnectionRegistry::new();
        registry.shutdown();
        assert!(registry.clients.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_rejects_empty_table_name() {
        let registry = ConnectionRegistry::new();
        let config = Config::validate(&json!({ "database": "app" })).unwrap();
        let model = crate::model::SimpleModel::new("");
        let err = registry.resolve(&config, &model).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidModel);
    }
}
