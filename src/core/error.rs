//! Error taxonomy shared by every synchronization operation
//!
//! The propagation policy (skip the row vs. abort the file) lives with the
//! pipeline; this module only names the outcomes.

use thiserror::Error;

use crate::core::kind::EntityKind;
use crate::store::StoreError;

/// Closed set of failure outcomes for resolution and ingestion.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Payload is missing a field required to compute the composite key.
    #[error("{kind} payload is missing identifier field '{field}'")]
    InvalidIdentifier {
        kind: EntityKind,
        field: &'static str,
    },

    /// Empty or NaN value where a field is mandatory.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Category path contained no usable segments.
    #[error("invalid category path: '{0}'")]
    InvalidCategoryPath(String),

    /// The backing store could not be reached or refused the request at the
    /// transport level.
    #[error("backing store unavailable")]
    BackingStoreUnavailable(#[from] StoreError),

    /// The backing store rejected the create for this entity.
    #[error("{kind} creation failed for key [{key}]: {message}")]
    EntityCreationFailed {
        kind: EntityKind,
        key: String,
        message: String,
    },

    /// Category path walk failed partway (row-fatal).
    #[error("category resolution failed for '{path}'")]
    CategoryResolutionFailed {
        path: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Part could not be resolved or created (row-fatal).
    #[error("part creation failed for '{name}'")]
    PartCreationFailed {
        name: String,
        #[source]
        source: Box<SyncError>,
    },

    /// A parameter stage failure (non-fatal, row continues).
    #[error("parameter error: {0}")]
    Parameter(String),

    /// A supplier/manufacturer stage failure (non-fatal, row continues).
    #[error("supplier resolution error: {0}")]
    Supplier(String),

    /// A pending-relation could not be resolved.
    #[error("relation resolution error: {0}")]
    Relation(String),

    /// Input file could not be read or parsed.
    #[error("file error for {path}: {message}")]
    File { path: String, message: String },
}

impl SyncError {
    /// Whether this error should abort processing of the current file.
    ///
    /// Only transport-level backing-store failures abort the file; data and
    /// creation errors skip the offending row, parameter, or relation.
    pub fn is_file_fatal(&self) -> bool {
        match self {
            SyncError::BackingStoreUnavailable(_) => true,
            SyncError::CategoryResolutionFailed { source, .. }
            | SyncError::PartCreationFailed { source, .. } => source.is_file_fatal(),
            _ => false,
        }
    }
}
