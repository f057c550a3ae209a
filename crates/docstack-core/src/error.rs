//! Error handling
//!
//! Provides typed errors for tier operations. Absence of a document or an
//! empty collection is a normal result, never an error; errors here mean a
//! tier call failed or an operation is not supported.

use thiserror::Error;

/// Role a backing store plays in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Fast local cache; may be cold or absent
    Cache,
    /// Authoritative store; source of truth and live-tail provider
    Primary,
    /// Bulk-read mirror; used only to cold-populate the cache
    Mirror,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Cache => write!(f, "cache"),
            Tier::Primary => write!(f, "primary"),
            Tier::Mirror => write!(f, "mirror"),
        }
    }
}

/// Errors that can occur during database operations
#[derive(Error, Debug)]
pub enum DbError {
    /// A tier could not be reached or its call failed in transport
    #[error("storage tier unreachable: {0}")]
    Unreachable(String),

    /// A read leg failed on a specific tier
    #[error("read from {tier} tier failed for '{endpoint}': {source}")]
    Read {
        tier: Tier,
        endpoint: String,
        #[source]
        source: Box<DbError>,
    },

    /// A write leg failed on a specific tier; the other tier is not rolled back
    #[error("write to {tier} tier failed for '{endpoint}': {source}")]
    Write {
        tier: Tier,
        endpoint: String,
        #[source]
        source: Box<DbError>,
    },

    /// Deliberately unimplemented capability, distinct from a transient failure
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Logical endpoint name outside the configured set
    #[error("unknown endpoint: '{0}'")]
    UnknownEndpoint(String),

    /// Payload is not a JSON object or failed to (de)serialize
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Wrap a tier failure as a read-leg error with tier and endpoint context
    pub fn read(tier: Tier, endpoint: impl Into<String>, source: DbError) -> Self {
        DbError::Read {
            tier,
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a tier failure as a write-leg error with tier and endpoint context
    pub fn write(tier: Tier, endpoint: impl Into<String>, source: DbError) -> Self {
        DbError::Write {
            tier,
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error represents a deliberately unimplemented capability
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DbError::Unsupported(_))
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
