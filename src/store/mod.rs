//! Backing-store boundary: the system of record the cache mirrors
//!
//! The resolver only ever talks to a [`BackingStore`]; whether that is the
//! live REST backend, the in-memory store used by dry runs and tests, or
//! (for creation) the shadow flat-file writer is decided above this layer.

pub mod http;
pub mod memory;
pub mod shadow;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::kind::EntityKind;

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use shadow::{ShadowDbWriter, ShadowTable};

/// Persistent identifier assigned by a backing store.
///
/// Append-only: a pk, once issued, is never reused or reassigned.
pub type Pk = i64;

/// One entity instance as returned by a backing-store listing.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub pk: Pk,
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Failures at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{kind} create rejected: {message}")]
    Rejected { kind: EntityKind, message: String },

    #[error("unexpected response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0} is not available on this store")]
    Unsupported(&'static str),
}

/// The three operations the synchronizer needs from a system of record.
///
/// `list` must return an empty vec (not an error) when the kind has no
/// instances. `create` must not partially apply: a failed create must leave
/// nothing behind that a later `list` would return.
pub trait BackingStore {
    /// Full-collection fetch for one kind (pagination is an implementation
    /// detail of the store).
    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError>;

    /// Create one entity, returning its newly assigned pk.
    fn create(&self, kind: EntityKind, payload: &Value) -> Result<Pk, StoreError>;

    /// Patch an arbitrary resource path. `Ok(None)` is the documented
    /// "request was refused" sentinel; `Err` means transport failure.
    fn patch(&self, path: &str, payload: &Value) -> Result<Option<Value>, StoreError>;

    /// Delete one entity instance.
    fn delete(&self, kind: EntityKind, pk: Pk) -> Result<(), StoreError>;
}
