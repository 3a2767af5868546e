//! Shared in-memory stores for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use files_service::{
    ContentTypeResolver, FileQuery, FileRecord, FileRegistry, KeyGenerator, MetadataStore,
    MetadataStoreError, NewFileRecord, ObjectStore, ObjectStoreError, SqliteMetadataStore,
    UuidKeyGenerator,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Object store holding blobs in a map, with switchable failures
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MemoryObjectStore {
    /// Remove an object behind the registry's back
    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("connection refused".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("connection reset".to_string()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn ping(&self) -> Result<(), ObjectStoreError> {
        Ok(())
    }
}

/// SQLite metadata store whose deletes can be made to fail
pub struct FlakyMetadataStore {
    inner: SqliteMetadataStore,
    pub fail_delete: AtomicBool,
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, MetadataStoreError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>, MetadataStoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, query: &FileQuery) -> Result<Vec<FileRecord>, MetadataStoreError> {
        self.inner.list(query).await
    }

    async fn delete(&self, id: i64) -> Result<bool, MetadataStoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(MetadataStoreError::Unavailable("database is locked".to_string()));
        }
        self.inner.delete(id).await
    }

    async fn ping(&self) -> Result<(), MetadataStoreError> {
        self.inner.ping().await
    }
}

/// Key generator that hands out the same key every time
pub struct FixedKeyGenerator(pub &'static str);

impl KeyGenerator for FixedKeyGenerator {
    fn generate(&self, _filename: &str) -> String {
        self.0.to_string()
    }
}

pub struct Harness {
    pub registry: Arc<FileRegistry>,
    pub objects: Arc<MemoryObjectStore>,
    pub metadata: Arc<FlakyMetadataStore>,
}

pub async fn harness() -> Harness {
    harness_with_keys(Arc::new(UuidKeyGenerator)).await
}

pub async fn harness_with_keys(keys: Arc<dyn KeyGenerator>) -> Harness {
    let objects = Arc::new(MemoryObjectStore::default());
    let metadata = Arc::new(FlakyMetadataStore {
        inner: SqliteMetadataStore::in_memory().await.unwrap(),
        fail_delete: AtomicBool::new(false),
    });

    let registry = Arc::new(FileRegistry::new(
        objects.clone(),
        metadata.clone(),
        keys,
        ContentTypeResolver::default(),
    ));

    Harness {
        registry,
        objects,
        metadata,
    }
}
