//! Document model and metadata stamping
//!
//! A [`Doc`] is a JSON object carrying four reserved metadata fields next to
//! arbitrary application fields. The `_modified` stamp doubles as the sync
//! watermark, so every stamp uses one canonical RFC 3339 form whose
//! lexicographic order equals chronological order.

use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DbError, DbResult};

/// Reserved metadata field names as they appear on the wire
pub mod meta {
    pub const ID: &str = "_id";
    pub const CREATED: &str = "_created";
    pub const MODIFIED: &str = "_modified";
    pub const DELETED: &str = "_deleted";
}

/// Length of generated document ids
pub const ID_LENGTH: usize = 20;

/// Alphabet for generated document ids (62 symbols)
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Current timestamp in the canonical stamp format
///
/// RFC 3339 UTC with millisecond precision and `Z` suffix. Watermark
/// comparisons are string comparisons, which is only sound because every
/// stamp comes from here.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Random document id generator
///
/// Ids are 20 characters drawn uniformly from an alphanumeric alphabet.
/// Collisions are accepted as negligible and not checked. The generator is
/// injected rather than ambient so tests can seed it deterministically.
#[derive(Clone)]
pub struct IdGenerator {
    rng: Arc<Mutex<StdRng>>,
}

impl IdGenerator {
    /// Create a generator seeded from system entropy
    pub fn new() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Create a generator with a fixed seed (deterministic sequences)
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Generate a fresh document id
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock().expect("id generator lock poisoned");
        (0..ID_LENGTH)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A document: reserved metadata plus arbitrary application fields
///
/// Serializes to a flat JSON object; application fields sit next to the
/// `_`-prefixed metadata. A deserialized object missing any metadata field
/// gets the field's default, so unstamped payloads round-trip cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    /// Unique id within the collection; immutable once assigned
    #[serde(rename = "_id", default)]
    pub id: String,

    /// Stamped when absent from the written payload, preserved otherwise
    #[serde(rename = "_created", default)]
    pub created: String,

    /// Re-stamped on every write; the sync watermark
    #[serde(rename = "_modified", default)]
    pub modified: String,

    /// Soft-delete marker; a tombstone carries no application fields
    #[serde(rename = "_deleted", default)]
    pub deleted: bool,

    /// Application fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Doc {
    /// Create an empty, unstamped document
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON value
    ///
    /// The value must be an object; metadata fields present in it are kept.
    pub fn from_value(value: Value) -> DbResult<Self> {
        if !value.is_object() {
            return Err(DbError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                type_name(&value)
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Build a document from any serializable payload
    pub fn from_typed<T: Serialize>(data: &T) -> DbResult<Self> {
        Self::from_value(serde_json::to_value(data)?)
    }

    /// Deserialize this document into an application type
    pub fn to_typed<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Get an application field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Look up any field by its wire name, metadata included
    ///
    /// Used by query evaluation, which addresses `_modified` and friends the
    /// same way as application fields.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            meta::ID => Some(Value::String(self.id.clone())),
            meta::CREATED => Some(Value::String(self.created.clone())),
            meta::MODIFIED => Some(Value::String(self.modified.clone())),
            meta::DELETED => Some(Value::Bool(self.deleted)),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Stamp metadata for a write
    ///
    /// Assigns the id, mints `_created` only when the payload carries none,
    /// and re-stamps `_modified`. Writes are whole-document with no
    /// read-modify-write, so `_created` survives exactly when the caller
    /// round-trips the stored document.
    pub fn stamp(&mut self, id: &str, now: &str) {
        self.id = id.to_string();
        if self.created.is_empty() {
            self.created = now.to_string();
        }
        self.modified = now.to_string();
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
