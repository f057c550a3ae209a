//! docstack Core Library
//!
//! This crate provides the core functionality for docstack, a tiered
//! document store that unifies three independently-hosted backends behind
//! one collection/document API.
//!
//! # Architecture
//!
//! - **Cache tier**: fast and local; may be cold or disabled
//! - **Authoritative tier**: source of truth for reads, writes, and the
//!   incremental live tail
//! - **Mirror tier**: bulk reads only, used to cold-populate the cache
//!
//! Reads are served from the fastest tier that has the data; writes fan out
//! authoritative-first; a collection subscription bootstraps from the cache,
//! backfills from the mirror, and stays current by tailing the authoritative
//! tier above the cache's `_modified` watermark.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::with_collections("dev_", &["items"]);
//! let db = Database::open(config, tiers);
//!
//! // Write a document
//! let items = db.collection("items")?;
//! items.doc("a").set(&json!({"title": "hello"})).await?;
//!
//! // Follow the collection live
//! let mut sub = items.stream();
//! while let Some(event) = sub.next_event().await { /* ... */ }
//! ```
//!
//! # Modules
//!
//! - `db`: database facade and tier wiring (main entry point)
//! - `collection`: collection references and the streaming merge protocol
//! - `doc_ref`: single-document references
//! - `document`: the document model and metadata stamping
//! - `client`: the storage tier capability contract
//! - `query`: filter/sort/limit specification
//! - `endpoints`: logical-to-physical endpoint naming
//! - `config`: application configuration

pub mod client;
pub mod collection;
pub mod config;
pub mod db;
pub mod doc_ref;
pub mod document;
pub mod endpoints;
pub mod error;
pub mod query;

pub use client::{DocBatchStream, MemoryClient, StorageClient};
pub use collection::{CollectionRef, StreamEvent, StreamPhase, Subscription};
pub use config::Config;
pub use db::{Database, TierClients};
pub use doc_ref::{DocRef, ReadSource};
pub use document::{Doc, IdGenerator};
pub use endpoints::EndpointMap;
pub use error::{DbError, DbResult, Tier};
pub use query::{FieldValue, Filter, FilterOp, Query, SortOrder};
