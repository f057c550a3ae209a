//! In-process storage client
//!
//! A complete [`StorageClient`] backed by in-memory maps, including the
//! streaming capability. Serves as the reference tier for embedded use and
//! as the test double for every engine test; `set_unreachable` turns the
//! whole client into a failing tier to exercise partial-unavailability
//! paths.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;

use super::{DocBatchStream, StorageClient};
use crate::document::Doc;
use crate::error::{DbError, DbResult};
use crate::query::Query;

/// A registered live-tail subscription
struct Watcher {
    endpoint: String,
    query: Query,
    tx: mpsc::UnboundedSender<Vec<Doc>>,
}

/// In-memory storage tier
#[derive(Default)]
pub struct MemoryClient {
    /// endpoint -> (doc id -> doc)
    collections: Mutex<HashMap<String, BTreeMap<String, Doc>>>,
    /// Open live-tail subscriptions, fed on every write
    watchers: Mutex<Vec<Watcher>>,
    /// Failure injection: every operation fails while set
    unreachable: AtomicBool,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`DbError::Unreachable`]
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of documents currently stored for an endpoint
    pub fn len(&self, endpoint: &str) -> usize {
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .get(endpoint)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, endpoint: &str) -> bool {
        self.len(endpoint) == 0
    }

    fn check_reachable(&self) -> DbResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(DbError::Unreachable("client marked unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn insert(&self, endpoint: &str, docs: &[Doc]) {
        let mut collections = self.collections.lock().expect("collections lock poisoned");
        let collection = collections.entry(endpoint.to_string()).or_default();
        for doc in docs {
            collection.insert(doc.id.clone(), doc.clone());
        }
    }

    /// Push a written batch to every watcher whose query it matches
    fn notify(&self, endpoint: &str, docs: &[Doc]) {
        let mut watchers = self.watchers.lock().expect("watchers lock poisoned");
        watchers.retain(|watcher| {
            if watcher.endpoint != endpoint {
                return true;
            }
            let batch = watcher.query.apply(docs.to_vec());
            if batch.is_empty() {
                return true;
            }
            // A failed send means the subscriber is gone
            watcher.tx.send(batch).is_ok()
        });
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn get_doc(&self, endpoint: &str, id: &str) -> DbResult<Option<Doc>> {
        self.check_reachable()?;
        let collections = self.collections.lock().expect("collections lock poisoned");
        Ok(collections
            .get(endpoint)
            .and_then(|collection| collection.get(id))
            .cloned())
    }

    async fn set_doc(&self, endpoint: &str, doc: &Doc) -> DbResult<()> {
        self.check_reachable()?;
        self.insert(endpoint, std::slice::from_ref(doc));
        self.notify(endpoint, std::slice::from_ref(doc));
        Ok(())
    }

    async fn get_collection(&self, endpoint: &str) -> DbResult<Vec<Doc>> {
        self.check_reachable()?;
        let collections = self.collections.lock().expect("collections lock poisoned");
        Ok(collections
            .get(endpoint)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_bulk_docs(&self, endpoint: &str, docs: &[Doc]) -> DbResult<()> {
        self.check_reachable()?;
        self.insert(endpoint, docs);
        self.notify(endpoint, docs);
        Ok(())
    }

    async fn query_collection(&self, endpoint: &str, query: &Query) -> DbResult<Vec<Doc>> {
        self.check_reachable()?;
        let docs = self.get_collection(endpoint).await?;
        Ok(query.apply(docs))
    }

    async fn stream_collection(&self, endpoint: &str, query: &Query) -> DbResult<DocBatchStream> {
        self.check_reachable()?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Catch-up: everything already matching is the first batch
        let initial = query.apply(self.get_collection(endpoint).await?);
        if !initial.is_empty() {
            let _ = tx.send(initial);
        }

        self.watchers
            .lock()
            .expect("watchers lock poisoned")
            .push(Watcher {
                endpoint: endpoint.to_string(),
                query: query.clone(),
                tx,
            });

        Ok(Box::pin(WatcherStream { rx }))
    }
}

/// Adapts the watcher channel to the capability's stream type
struct WatcherStream {
    rx: mpsc::UnboundedReceiver<Vec<Doc>>,
}

impl Stream for WatcherStream {
    type Item = DbResult<Vec<Doc>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|batch| batch.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterOp;
    use futures_util::StreamExt;
    use serde_json::json;

    fn doc(id: &str, modified: &str, fields: serde_json::Value) -> Doc {
        let mut doc = Doc::from_value(fields).unwrap();
        doc.id = id.to_string();
        doc.created = modified.to_string();
        doc.modified = modified.to_string();
        doc
    }

    #[tokio::test]
    async fn test_set_and_get_doc() {
        let client = MemoryClient::new();
        let d = doc("a", "T1", json!({"v": 1}));

        client.set_doc("items", &d).await.unwrap();

        let found = client.get_doc("items", "a").await.unwrap();
        assert_eq!(found, Some(d));
        assert_eq!(client.get_doc("items", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_doc_overwrites_by_id() {
        let client = MemoryClient::new();
        client.set_doc("items", &doc("a", "T1", json!({"v": 1}))).await.unwrap();
        client.set_doc("items", &doc("a", "T2", json!({"v": 2}))).await.unwrap();

        assert_eq!(client.len("items"), 1);
        let found = client.get_doc("items", "a").await.unwrap().unwrap();
        assert_eq!(found.field("v"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_bulk_write_and_get_collection() {
        let client = MemoryClient::new();
        let docs = vec![
            doc("a", "T1", json!({})),
            doc("b", "T2", json!({})),
        ];

        client.set_bulk_docs("items", &docs).await.unwrap();

        let all = client.get_collection("items").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(client.get_collection("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_collection() {
        let client = MemoryClient::new();
        client
            .set_bulk_docs(
                "items",
                &[
                    doc("a", "T1", json!({})),
                    doc("b", "T3", json!({})),
                    doc("c", "T2", json!({})),
                ],
            )
            .await
            .unwrap();

        let latest = client
            .query_collection(
                "items",
                &Query::new().order_by("_modified").descending().limit(1),
            )
            .await
            .unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, "b");
    }

    #[tokio::test]
    async fn test_unreachable_fails_everything() {
        let client = MemoryClient::new();
        client.set_unreachable(true);

        assert!(client.get_doc("items", "a").await.is_err());
        assert!(client.get_collection("items").await.is_err());
        assert!(client.set_doc("items", &doc("a", "T1", json!({}))).await.is_err());

        client.set_unreachable(false);
        assert!(client.get_collection("items").await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_delivers_catch_up_then_tail() {
        let client = MemoryClient::new();
        client.set_doc("items", &doc("a", "T2", json!({}))).await.unwrap();

        let query = Query::new()
            .where_field("_modified", FilterOp::Gt, "T1")
            .order_by("_modified");
        let mut stream = client.stream_collection("items", &query).await.unwrap();

        // Existing matching doc arrives as the catch-up batch
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "a");

        // A later write arrives as its own batch
        client.set_doc("items", &doc("b", "T3", json!({}))).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second[0].id, "b");
    }

    #[tokio::test]
    async fn test_stream_filters_by_query() {
        let client = MemoryClient::new();
        let query = Query::new().where_field("_modified", FilterOp::Gt, "T5");
        let mut stream = client.stream_collection("items", &query).await.unwrap();

        // Below the watermark: no delivery
        client.set_doc("items", &doc("a", "T3", json!({}))).await.unwrap();
        // Above the watermark: delivered
        client.set_doc("items", &doc("b", "T6", json!({}))).await.unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "b");
    }

    #[tokio::test]
    async fn test_stream_ignores_other_endpoints() {
        let client = MemoryClient::new();
        let mut stream = client
            .stream_collection("items", &Query::new())
            .await
            .unwrap();

        client.set_doc("other", &doc("x", "T1", json!({}))).await.unwrap();
        client.set_doc("items", &doc("a", "T1", json!({}))).await.unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch[0].id, "a");
    }

    #[tokio::test]
    async fn test_dropped_stream_unregisters_watcher() {
        let client = MemoryClient::new();
        let stream = client
            .stream_collection("items", &Query::new())
            .await
            .unwrap();
        drop(stream);

        // The next write prunes the dead watcher
        client.set_doc("items", &doc("a", "T1", json!({}))).await.unwrap();
        assert!(client.watchers.lock().unwrap().is_empty());
    }
}
