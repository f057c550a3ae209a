//! Storage client capability
//!
//! The contract every backing tier satisfies. The engine holds tiers only as
//! `Arc<dyn StorageClient>`: cache, authoritative store, and bulk mirror are
//! interchangeable behind this seam, and each can be replaced by a test
//! double in isolation.
//!
//! Absence is a normal result: a missing document is `Ok(None)`, an empty
//! collection is `Ok(vec![])`. Streaming is optional; only authoritative
//! tiers implement it, everything else inherits the unsupported default.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::document::Doc;
use crate::error::{DbError, DbResult};
use crate::query::Query;

mod memory;

pub use memory::MemoryClient;

/// Push-subscription of document batches from a live tail
pub type DocBatchStream = Pin<Box<dyn Stream<Item = DbResult<Vec<Doc>>> + Send>>;

/// Capability contract for one backing storage tier
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetch one document by id; absent documents are `Ok(None)`
    async fn get_doc(&self, endpoint: &str, id: &str) -> DbResult<Option<Doc>>;

    /// Write one full document
    async fn set_doc(&self, endpoint: &str, doc: &Doc) -> DbResult<()>;

    /// Fetch the entire collection
    async fn get_collection(&self, endpoint: &str) -> DbResult<Vec<Doc>>;

    /// Write a batch of full documents
    async fn set_bulk_docs(&self, endpoint: &str, docs: &[Doc]) -> DbResult<()>;

    /// Fetch the documents matching a filter/sort/limit spec
    async fn query_collection(&self, endpoint: &str, query: &Query) -> DbResult<Vec<Doc>>;

    /// Open an incremental subscription for documents matching `query`
    ///
    /// The subscription delivers the currently-matching documents, then every
    /// subsequently written matching batch. Authoritative tiers override
    /// this; the default is the unsupported-capability error.
    async fn stream_collection(&self, _endpoint: &str, _query: &Query) -> DbResult<DocBatchStream> {
        Err(DbError::Unsupported("streamCollection"))
    }
}
