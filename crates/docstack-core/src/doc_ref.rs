//! Single-document reference
//!
//! A [`DocRef`] owns the identity and lifecycle of one document within one
//! collection: cache-first reads with a single server fallback hop, stamped
//! fan-out writes, and soft deletion.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::client::StorageClient;
use crate::collection::Subscription;
use crate::document::{now_timestamp, Doc};
use crate::error::{DbError, DbResult, Tier};

/// Which tier a read is served from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadSource {
    /// Cache tier, falling back to the server on a miss (one hop)
    #[default]
    Cache,
    /// Authoritative tier directly
    Server,
}

/// Reference to one document within one collection
pub struct DocRef {
    endpoint: String,
    id: String,
    cache: Arc<dyn StorageClient>,
    primary: Arc<dyn StorageClient>,
}

impl DocRef {
    pub(crate) fn new(
        endpoint: String,
        id: String,
        cache: Arc<dyn StorageClient>,
        primary: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            endpoint,
            id,
            cache,
            primary,
        }
    }

    /// The document id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The physical collection endpoint this document belongs to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Read the document, cache-first
    pub async fn get(&self) -> DbResult<Option<Doc>> {
        self.get_from(ReadSource::Cache).await
    }

    /// Read the document from a specific tier
    ///
    /// `Cache` falls back to the server on a miss, one hop only.
    /// `Server` reads the authoritative tier and does NOT write the result
    /// back into the cache: a write-back here could race a concurrent
    /// full-collection cache populate.
    pub async fn get_from(&self, source: ReadSource) -> DbResult<Option<Doc>> {
        match source {
            ReadSource::Cache => {
                let cached = self
                    .cache
                    .get_doc(&self.endpoint, &self.id)
                    .await
                    .map_err(|e| DbError::read(Tier::Cache, &self.endpoint, e))?;
                match cached {
                    Some(doc) => Ok(Some(doc)),
                    None => {
                        debug!(
                            endpoint = %self.endpoint,
                            id = %self.id,
                            "cache miss, reading from server"
                        );
                        // One hop only: the server leg, not a recursive get
                        self.primary
                            .get_doc(&self.endpoint, &self.id)
                            .await
                            .map_err(|e| DbError::read(Tier::Primary, &self.endpoint, e))
                    }
                }
            }
            ReadSource::Server => self
                .primary
                .get_doc(&self.endpoint, &self.id)
                .await
                .map_err(|e| DbError::read(Tier::Primary, &self.endpoint, e)),
        }
    }

    /// Write the document, fanning out to the authoritative tier then the cache
    ///
    /// The payload is stamped (`_id`, `_created` when absent, fresh
    /// `_modified`) and written whole. Authoritative-first ordering means an
    /// interruption leaves the cache stale, never ahead of the source of
    /// truth. Neither leg is rolled back when the other fails; retries are
    /// idempotent given the stable id.
    ///
    /// Returns the stamped document as written.
    pub async fn set<T: Serialize>(&self, data: &T) -> DbResult<Doc> {
        let mut doc = Doc::from_typed(data)?;
        doc.stamp(&self.id, &now_timestamp());

        self.primary
            .set_doc(&self.endpoint, &doc)
            .await
            .map_err(|e| DbError::write(Tier::Primary, &self.endpoint, e))?;
        self.cache
            .set_doc(&self.endpoint, &doc)
            .await
            .map_err(|e| DbError::write(Tier::Cache, &self.endpoint, e))?;

        Ok(doc)
    }

    /// Soft-delete the document
    ///
    /// Writes a tombstone: `_deleted: true` with no application fields.
    /// Prior fields are not merged in, so deletion clears them; the
    /// tombstone propagates through the same sync channel as any update.
    pub async fn delete(&self) -> DbResult<Doc> {
        self.set(&serde_json::json!({ "_deleted": true })).await
    }

    /// Streaming is a collection-level capability only
    pub fn stream(&self) -> DbResult<Subscription> {
        Err(DbError::Unsupported("document-level streaming"))
    }
}
