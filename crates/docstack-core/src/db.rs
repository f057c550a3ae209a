//! Database facade
//!
//! Wires the three tier clients together, applies the endpoint-name mapping,
//! and hands out collection references by logical name.

use std::sync::Arc;

use tracing::info;

use crate::client::{MemoryClient, StorageClient};
use crate::collection::CollectionRef;
use crate::config::Config;
use crate::document::IdGenerator;
use crate::endpoints::EndpointMap;
use crate::error::DbResult;

/// The three tier clients, in role order
#[derive(Clone)]
pub struct TierClients {
    /// Fast local cache tier
    pub cache: Arc<dyn StorageClient>,
    /// Authoritative tier; source of truth and live-tail provider
    pub primary: Arc<dyn StorageClient>,
    /// Bulk-read mirror tier; used only to cold-populate the cache
    pub mirror: Arc<dyn StorageClient>,
}

impl TierClients {
    pub fn new(
        cache: Arc<dyn StorageClient>,
        primary: Arc<dyn StorageClient>,
        mirror: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            cache,
            primary,
            mirror,
        }
    }

    /// Three independent in-process tiers (embedded and test use)
    pub fn in_memory() -> Self {
        Self {
            cache: Arc::new(MemoryClient::new()),
            primary: Arc::new(MemoryClient::new()),
            mirror: Arc::new(MemoryClient::new()),
        }
    }
}

/// Entry point: tier wiring and endpoint naming
pub struct Database {
    config: Config,
    endpoints: EndpointMap,
    cache: Arc<dyn StorageClient>,
    primary: Arc<dyn StorageClient>,
    mirror: Arc<dyn StorageClient>,
    ids: IdGenerator,
}

impl Database {
    /// Open the database over an externally-constructed tier triple
    ///
    /// When the configuration disables the cache, the cache handle *is* the
    /// authoritative handle: cache operations pass through to the source of
    /// truth and the supplied cache client is never called.
    pub fn open(config: Config, tiers: TierClients) -> Self {
        let endpoints = EndpointMap::new(&config.endpoint_prefix, &config.collections);
        let cache = if config.cache_enabled {
            tiers.cache
        } else {
            tiers.primary.clone()
        };

        info!(
            cache_enabled = config.cache_enabled,
            endpoint_prefix = %config.endpoint_prefix,
            collections = config.collections.len(),
            "opening database"
        );

        Self {
            config,
            endpoints,
            cache,
            primary: tiers.primary,
            mirror: tiers.mirror,
            ids: IdGenerator::new(),
        }
    }

    /// Open with fully in-process tiers
    pub fn in_memory(config: Config) -> Self {
        Self::open(config, TierClients::in_memory())
    }

    /// Replace the id generator (deterministic tests)
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// The configuration this database was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The logical-to-physical endpoint map
    pub fn endpoints(&self) -> &EndpointMap {
        &self.endpoints
    }

    /// Get a collection reference by logical name
    pub fn collection(&self, name: &str) -> DbResult<CollectionRef> {
        let endpoint = self.endpoints.resolve(name)?;
        Ok(CollectionRef::new(
            endpoint.to_string(),
            self.cache.clone(),
            self.primary.clone(),
            self.mirror.clone(),
            self.ids.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_ref::ReadSource;
    use crate::document::Doc;
    use crate::error::DbError;
    use serde_json::json;

    fn config() -> Config {
        Config::with_collections("dev_", &["items"])
    }

    fn seeded(id: &str, v: i64, modified: &str) -> Doc {
        let mut doc = Doc::from_value(json!({"v": v})).unwrap();
        doc.id = id.to_string();
        doc.created = modified.to_string();
        doc.modified = modified.to_string();
        doc
    }

    #[test]
    fn test_collection_resolves_physical_endpoint() {
        let db = Database::in_memory(config());

        let items = db.collection("items").unwrap();
        assert_eq!(items.endpoint(), "dev_items");
    }

    #[test]
    fn test_unknown_collection_is_rejected() {
        let db = Database::in_memory(config());

        let err = db.collection("orders").unwrap_err();
        assert!(matches!(err, DbError::UnknownEndpoint(_)));
    }

    #[test]
    fn test_endpoint_map_is_exported() {
        let db = Database::in_memory(config());

        assert_eq!(db.endpoints().resolve("items").unwrap(), "dev_items");
        assert_eq!(db.endpoints().physical_name("other"), "dev_other");
    }

    #[test]
    fn test_generated_ids_are_deterministic_with_seed() {
        let db = Database::in_memory(config()).with_id_generator(IdGenerator::from_seed(9));
        let reference = IdGenerator::from_seed(9);

        let items = db.collection("items").unwrap();
        assert_eq!(items.new_doc().id(), reference.generate());
    }

    #[tokio::test]
    async fn test_cache_disabled_passes_through_to_primary() {
        let mut config = config();
        config.cache_enabled = false;

        let cache = Arc::new(MemoryClient::new());
        let primary = Arc::new(MemoryClient::new());
        let mirror = Arc::new(MemoryClient::new());
        let db = Database::open(
            config,
            TierClients::new(cache.clone(), primary.clone(), mirror),
        );

        let items = db.collection("items").unwrap();
        items.doc("a").set(&json!({"v": 1})).await.unwrap();

        // Both write legs landed on the authoritative tier
        assert_eq!(primary.len("dev_items"), 1);
        assert_eq!(cache.len("dev_items"), 0);

        // Cache-sourced reads are served by the authoritative tier too
        let found = items.doc("a").get().await.unwrap().unwrap();
        assert_eq!(found.field("v"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_cache_and_server_read_scenario() {
        // Authoritative has v:1 at T2, cache has stale v:0 at T1
        let cache = Arc::new(MemoryClient::new());
        let primary = Arc::new(MemoryClient::new());
        let mirror = Arc::new(MemoryClient::new());
        cache.set_doc("dev_items", &seeded("a", 0, "T1")).await.unwrap();
        primary.set_doc("dev_items", &seeded("a", 1, "T2")).await.unwrap();

        let db = Database::open(
            config(),
            TierClients::new(cache, primary, mirror),
        );
        let items = db.collection("items").unwrap();

        let cached = items.doc("a").get_from(ReadSource::Cache).await.unwrap().unwrap();
        assert_eq!(cached.field("v"), Some(&json!(0)));

        let fresh = items.doc("a").get_from(ReadSource::Server).await.unwrap().unwrap();
        assert_eq!(fresh.field("v"), Some(&json!(1)));

        // Default read returns the cache value because the cache is non-absent
        let default = items.doc("a").get().await.unwrap().unwrap();
        assert_eq!(default.field("v"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_end_to_end_write_then_stream() {
        let db = Database::in_memory(config());
        let items = db.collection("items").unwrap();

        items
            .set(&[json!({"_id": "a", "title": "one"})])
            .await
            .unwrap();

        let mut sub = items.stream();
        match sub.next_event().await.unwrap() {
            crate::collection::StreamEvent::Snapshot(docs) => {
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].id, "a");
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }
}
