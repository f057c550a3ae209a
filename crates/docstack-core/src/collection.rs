//! Collection reference and the streaming merge protocol
//!
//! A [`CollectionRef`] provides bulk stamped writes, filtered queries with a
//! cache fallback, and live subscriptions. A subscription is driven by a
//! spawned task through an explicit phase machine:
//!
//! 1. `Bootstrapping`: emit the cached collection immediately, even empty
//! 2. `Backfilling`: only on an empty bootstrap, populate the cache from
//!    the bulk mirror and emit the result
//! 3. `Tailing`: follow the authoritative tier's incremental stream above
//!    the cache watermark; every batch is written into the cache and the
//!    full cache collection is re-emitted (subscribers always see complete
//!    snapshots, never deltas)
//!
//! `Cancelled` is terminal; dropping the [`Subscription`] tears the task
//! down and stops all tier activity for that subscriber.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::client::StorageClient;
use crate::doc_ref::DocRef;
use crate::document::{meta, now_timestamp, Doc, IdGenerator};
use crate::error::{DbError, DbResult, Tier};
use crate::query::{FieldValue, FilterOp, Query};

/// Subscription lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Reading the cached collection for the initial emission
    Bootstrapping,
    /// Cold cache: populating it from the bulk mirror
    Backfilling,
    /// Following the authoritative tier's incremental stream
    Tailing,
    /// Terminal: cancelled, or ended after a fatal setup error
    Cancelled,
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamPhase::Bootstrapping => write!(f, "bootstrapping"),
            StreamPhase::Backfilling => write!(f, "backfilling"),
            StreamPhase::Tailing => write!(f, "tailing"),
            StreamPhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events delivered to a subscriber
#[derive(Debug)]
pub enum StreamEvent {
    /// Complete current collection state
    Snapshot(Vec<Doc>),
    /// A bootstrap, backfill, or watermark step failed
    Error(DbError),
}

/// Handle to a live collection subscription
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// cancels the subscription: the driving task stops at its next suspension
/// point and performs no further cache or network activity.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    phase_rx: watch::Receiver<StreamPhase>,
    cancel_tx: watch::Sender<bool>,
}

impl Subscription {
    /// Receive the next event; `None` after the subscription ends
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Current phase
    pub fn phase(&self) -> StreamPhase {
        *self.phase_rx.borrow()
    }

    /// Watch phase transitions
    pub fn watch_phase(&self) -> watch::Receiver<StreamPhase> {
        self.phase_rx.clone()
    }

    /// Cancel the subscription
    pub fn unsubscribe(self) {
        // Dropping tears the task down
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("phase", &*self.phase_rx.borrow())
            .finish()
    }
}

/// Reference to a named collection across the three tiers
pub struct CollectionRef {
    endpoint: String,
    cache: Arc<dyn StorageClient>,
    primary: Arc<dyn StorageClient>,
    mirror: Arc<dyn StorageClient>,
    ids: IdGenerator,
}

impl std::fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRef")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl CollectionRef {
    pub(crate) fn new(
        endpoint: String,
        cache: Arc<dyn StorageClient>,
        primary: Arc<dyn StorageClient>,
        mirror: Arc<dyn StorageClient>,
        ids: IdGenerator,
    ) -> Self {
        Self {
            endpoint,
            cache,
            primary,
            mirror,
            ids,
        }
    }

    /// The physical endpoint name
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reference an existing document by id
    pub fn doc(&self, id: &str) -> DocRef {
        DocRef::new(
            self.endpoint.clone(),
            id.to_string(),
            self.cache.clone(),
            self.primary.clone(),
        )
    }

    /// Reference a new document with a generated id
    pub fn new_doc(&self) -> DocRef {
        let id = self.ids.generate();
        self.doc(&id)
    }

    /// Bulk write, stamping every item
    ///
    /// An item's own `_id` is kept; items without one get a generated id.
    /// One bulk write goes to the authoritative tier, then one to the cache
    /// tier. Authoritative-first ordering means an interruption between the
    /// two leaves the cache stale, never ahead of the source of truth.
    ///
    /// Returns the stamped documents as written.
    pub async fn set<T: Serialize>(&self, items: &[T]) -> DbResult<Vec<Doc>> {
        let now = now_timestamp();
        let mut docs = Vec::with_capacity(items.len());
        for item in items {
            let mut doc = Doc::from_typed(item)?;
            let id = if doc.id.is_empty() {
                self.ids.generate()
            } else {
                doc.id.clone()
            };
            doc.stamp(&id, &now);
            docs.push(doc);
        }

        self.primary
            .set_bulk_docs(&self.endpoint, &docs)
            .await
            .map_err(|e| DbError::write(Tier::Primary, &self.endpoint, e))?;
        self.cache
            .set_bulk_docs(&self.endpoint, &docs)
            .await
            .map_err(|e| DbError::write(Tier::Cache, &self.endpoint, e))?;

        Ok(docs)
    }

    /// Filtered query with cache fallback
    ///
    /// The authoritative tier is asked first. Zero rows (including an
    /// unreachable authoritative tier) fall back to the same query against
    /// the cache (covers offline use and documents not yet indexed
    /// remotely). A fallback failure is logged and swallowed: the call
    /// returns an empty result rather than raising.
    pub async fn get_where(
        &self,
        field: &str,
        op: FilterOp,
        value: impl Into<FieldValue>,
    ) -> DbResult<Vec<Doc>> {
        let query = Query::new().where_field(field, op, value);

        let rows = match self.primary.query_collection(&self.endpoint, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "authoritative query failed, falling back to cache"
                );
                Vec::new()
            }
        };
        if !rows.is_empty() {
            return Ok(rows);
        }

        match self.cache.query_collection(&self.endpoint, &query).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "cache fallback query failed, returning empty result"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Open a live subscription to this collection
    ///
    /// Returns immediately; the protocol runs in a spawned task and delivers
    /// [`StreamEvent`]s through the handle. Bootstrap, backfill, and
    /// watermark failures arrive as [`StreamEvent::Error`] and end the
    /// subscription; failures of individual live-tail batches are logged and
    /// skipped so the underlying transport can retry.
    pub fn stream(&self) -> Subscription {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(StreamPhase::Bootstrapping);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let ctx = StreamContext {
            endpoint: self.endpoint.clone(),
            cache: self.cache.clone(),
            primary: self.primary.clone(),
            mirror: self.mirror.clone(),
            events: event_tx,
            phase: phase_tx,
        };

        tokio::spawn(run_stream(ctx, cancel_rx));

        Subscription {
            events: event_rx,
            phase_rx,
            cancel_tx,
        }
    }
}

/// Everything the subscription task needs
struct StreamContext {
    endpoint: String,
    cache: Arc<dyn StorageClient>,
    primary: Arc<dyn StorageClient>,
    mirror: Arc<dyn StorageClient>,
    events: mpsc::UnboundedSender<StreamEvent>,
    phase: watch::Sender<StreamPhase>,
}

impl StreamContext {
    /// Emit an event; false means the subscriber is gone
    fn emit(&self, event: StreamEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn set_phase(&self, phase: StreamPhase) {
        let _ = self.phase.send(phase);
    }
}

/// Subscription task: the protocol raced against cancellation
///
/// Every suspension point inside [`drive_stream`] sits under this select,
/// so a cancel takes effect at the next await and no further tier activity
/// happens afterwards.
async fn run_stream(ctx: StreamContext, mut cancel_rx: watch::Receiver<bool>) {
    tokio::select! {
        biased;
        _ = cancel_rx.changed() => {
            debug!(endpoint = %ctx.endpoint, "subscription cancelled");
        }
        _ = drive_stream(&ctx) => {}
    }
    ctx.set_phase(StreamPhase::Cancelled);
}

/// The streaming merge protocol: bootstrap, backfill, watermark, live tail
async fn drive_stream(ctx: &StreamContext) {
    // Bootstrap: the cached collection is emitted no matter its size
    ctx.set_phase(StreamPhase::Bootstrapping);
    let cached = match ctx.cache.get_collection(&ctx.endpoint).await {
        Ok(docs) => docs,
        Err(e) => {
            ctx.emit(StreamEvent::Error(DbError::read(
                Tier::Cache,
                &ctx.endpoint,
                e,
            )));
            return;
        }
    };
    let cache_was_empty = cached.is_empty();
    if !ctx.emit(StreamEvent::Snapshot(cached)) {
        return;
    }

    // Cold-cache backfill from the bulk mirror. Skipped whenever the cache
    // held anything at all: a full historical dump is what the mirror is
    // for, and what the authoritative tier must not be asked for.
    if cache_was_empty {
        ctx.set_phase(StreamPhase::Backfilling);
        let mirrored = match ctx.mirror.get_collection(&ctx.endpoint).await {
            Ok(docs) => docs,
            Err(e) => {
                ctx.emit(StreamEvent::Error(DbError::read(
                    Tier::Mirror,
                    &ctx.endpoint,
                    e,
                )));
                return;
            }
        };
        debug!(
            endpoint = %ctx.endpoint,
            count = mirrored.len(),
            "backfilling cold cache from mirror"
        );
        if !mirrored.is_empty() {
            if let Err(e) = ctx.cache.set_bulk_docs(&ctx.endpoint, &mirrored).await {
                ctx.emit(StreamEvent::Error(DbError::write(
                    Tier::Cache,
                    &ctx.endpoint,
                    e,
                )));
                return;
            }
        }
        if !ctx.emit(StreamEvent::Snapshot(mirrored)) {
            return;
        }
    }

    // Resume watermark: the highest `_modified` durably cached
    let watermark_query = Query::new().order_by(meta::MODIFIED).descending().limit(1);
    let watermark = match ctx.cache.query_collection(&ctx.endpoint, &watermark_query).await {
        Ok(docs) => docs.into_iter().next().map(|d| d.modified).unwrap_or_default(),
        Err(e) => {
            ctx.emit(StreamEvent::Error(DbError::read(
                Tier::Cache,
                &ctx.endpoint,
                e,
            )));
            return;
        }
    };

    // Live tail: authoritative documents strictly newer than the watermark,
    // ascending so the cache watermark only ever advances
    ctx.set_phase(StreamPhase::Tailing);
    let tail_query = Query::new()
        .where_field(meta::MODIFIED, FilterOp::Gt, watermark.clone())
        .order_by(meta::MODIFIED);
    let mut tail = match ctx.primary.stream_collection(&ctx.endpoint, &tail_query).await {
        Ok(stream) => stream,
        Err(e) => {
            ctx.emit(StreamEvent::Error(DbError::read(
                Tier::Primary,
                &ctx.endpoint,
                e,
            )));
            return;
        }
    };
    debug!(endpoint = %ctx.endpoint, watermark = %watermark, "live tail open");

    while let Some(item) = tail.next().await {
        let batch = match item {
            Ok(batch) => batch,
            Err(e) => {
                // Transient: the transport owns retries
                warn!(endpoint = %ctx.endpoint, error = %e, "live-tail batch failed, skipping");
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }

        if let Err(e) = ctx.cache.set_bulk_docs(&ctx.endpoint, &batch).await {
            warn!(
                endpoint = %ctx.endpoint,
                error = %e,
                "cache write for live-tail batch failed, skipping"
            );
            continue;
        }

        // Always emit the complete collection state, never the delta
        match ctx.cache.get_collection(&ctx.endpoint).await {
            Ok(snapshot) => {
                if !ctx.emit(StreamEvent::Snapshot(snapshot)) {
                    return;
                }
            }
            Err(e) => {
                warn!(
                    endpoint = %ctx.endpoint,
                    error = %e,
                    "cache re-read after live-tail batch failed"
                );
            }
        }
    }
}
