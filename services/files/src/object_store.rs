use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an object store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Object store rejected request: {0}")]
    Backend(String),
}

/// Key-addressed blob storage holding file content
///
/// Each call is atomic per key; there are no multi-key transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<(), ObjectStoreError>;

    /// Fetch the bytes stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Remove the object under `key`. Removing an absent key may succeed or
    /// report [`ObjectStoreError::NotFound`]; callers treat both the same.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Check whether an object exists under `key`
    ///
    /// The registry never calls this; its saga steps rely on `get` and
    /// `delete` outcomes instead. It is the probe operators and tests use to
    /// confirm that a compensating delete really removed an orphan.
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), ObjectStoreError>;
}
