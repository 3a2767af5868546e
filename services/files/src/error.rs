use crate::metadata_store::MetadataStoreError;
use crate::object_store::ObjectStoreError;
use std::fmt;
use thiserror::Error;

/// Which backing store an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Object,
    Metadata,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Object => write!(f, "object"),
            StoreKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// Outcome of a failed registry operation
///
/// Multi-step operations name the step that failed and, after an upload
/// insert failure, whether the compensating delete succeeded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("File {id} not found")]
    NotFound { id: i64 },

    #[error("File {id} is indexed but its content at {object_key} is missing")]
    ContentMissing { id: i64, object_key: String },

    #[error("Object key {object_key} is already indexed")]
    DuplicateKey { object_key: String },

    #[error("The {store} store is unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    #[error("Failed to index {object_key} (uploaded object was removed): {message}")]
    InsertFailed { object_key: String, message: String },

    #[error(
        "Failed to index {object_key} ({insert_error}) and failed to remove the orphaned object ({cleanup_error})"
    )]
    OrphanCleanupFailed {
        object_key: String,
        insert_error: MetadataStoreError,
        cleanup_error: ObjectStoreError,
    },

    #[error("Content of file {id} at {object_key} was deleted but its record remains: {message}")]
    DanglingRecord {
        id: i64,
        object_key: String,
        message: String,
    },

    #[error("The {store} store rejected the request: {message}")]
    Storage { store: StoreKind, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<ObjectStoreError> for RegistryError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::Unavailable(message) => RegistryError::StoreUnavailable {
                store: StoreKind::Object,
                message,
            },
            ObjectStoreError::NotFound(message) | ObjectStoreError::Backend(message) => {
                RegistryError::Storage {
                    store: StoreKind::Object,
                    message,
                }
            }
        }
    }
}

impl From<MetadataStoreError> for RegistryError {
    fn from(err: MetadataStoreError) -> Self {
        match err {
            MetadataStoreError::Unavailable(message) => RegistryError::StoreUnavailable {
                store: StoreKind::Metadata,
                message,
            },
            MetadataStoreError::DuplicateKey(message) | MetadataStoreError::Query(message) => {
                RegistryError::Storage {
                    store: StoreKind::Metadata,
                    message,
                }
            }
        }
    }
}
