//! The file registry keeps object content and metadata records consistent.
//!
//! The two stores share no transaction, so each operation is a short saga:
//!
//! - upload writes content first and indexes it second. A failed insert is
//!   compensated by deleting the just-written object; only if that also fails
//!   is an orphan left behind, and it is reported rather than swallowed.
//! - delete removes content first and the record second. A failed object
//!   delete keeps the record so the file stays discoverable and the delete can
//!   be retried. A failed record delete leaves a dangling record, which
//!   downloads report as [`RegistryError::ContentMissing`] and which a retried
//!   delete cleans up.
//!
//! Operations on the same id are not serialized against each other.

use crate::content_type::{ContentTypeResolver, ContentTypeSource};
use crate::error::RegistryError;
use crate::key_generator::KeyGenerator;
use crate::metadata_store::{FileQuery, FileRecord, MetadataStore, MetadataStoreError, NewFileRecord};
use crate::object_store::{ObjectStore, ObjectStoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// A file to be stored
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original client filename
    pub filename: String,
    /// Content type declared by the client, if any
    pub content_type: Option<String>,
    /// File content; may be empty
    pub data: Vec<u8>,
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: FileRecord,
    /// Which source supplied the stored content type
    pub content_type_source: ContentTypeSource,
}

impl UploadOutcome {
    /// Zero-size uploads are accepted but worth flagging to the caller
    pub fn is_empty(&self) -> bool {
        self.record.size == 0
    }
}

/// Content returned by a download
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Reachability of both backing stores
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub object_store: Result<(), ObjectStoreError>,
    pub metadata_store: Result<(), MetadataStoreError>,
}

impl StoreHealth {
    pub fn is_ready(&self) -> bool {
        self.object_store.is_ok() && self.metadata_store.is_ok()
    }
}

/// Orchestrates uploads, downloads and deletes across both stores
pub struct FileRegistry {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    keys: Arc<dyn KeyGenerator>,
    content_types: ContentTypeResolver,
}

impl FileRegistry {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        keys: Arc<dyn KeyGenerator>,
        content_types: ContentTypeResolver,
    ) -> Self {
        Self {
            objects,
            metadata,
            keys,
            content_types,
        }
    }

    /// Store a file's content and index it
    #[instrument(skip(self, request), fields(filename = %request.filename, size_bytes = request.data.len()))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, RegistryError> {
        if request.filename.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "filename must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let object_key = self.keys.generate(&request.filename);
        let resolved = self.content_types.resolve(
            request.content_type.as_deref(),
            &request.filename,
            &request.data,
        );
        let size = request.data.len() as i64;

        if size == 0 {
            warn!(object_key = %object_key, "Storing zero-size file");
        }

        debug!(
            object_key = %object_key,
            content_type = %resolved.mime,
            content_type_source = ?resolved.source,
            "Uploading file content"
        );

        // Nothing has been indexed yet, so a failed put needs no compensation
        self.objects
            .put(&object_key, request.data, &resolved.mime)
            .await?;

        let new_record = NewFileRecord {
            filename: request.filename,
            object_key: object_key.clone(),
            content_type: Some(resolved.mime),
            size,
            created_at: Utc::now(),
        };

        let record = match self.metadata.insert(new_record).await {
            Ok(record) => record,
            Err(insert_error) => return Err(self.remove_orphan(object_key, insert_error).await),
        };

        metrics::counter!("files.uploaded").increment(1);
        metrics::counter!("files.bytes.uploaded").increment(record.size as u64);
        metrics::histogram!("files.upload.duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            id = record.id,
            object_key = %record.object_key,
            size_bytes = record.size,
            "File uploaded"
        );

        Ok(UploadOutcome {
            record,
            content_type_source: resolved.source,
        })
    }

    /// Compensate for a failed insert by deleting the object it would have indexed
    async fn remove_orphan(
        &self,
        object_key: String,
        insert_error: MetadataStoreError,
    ) -> RegistryError {
        match self.objects.delete(&object_key).await {
            Ok(()) | Err(ObjectStoreError::NotFound(_)) => {
                warn!(
                    object_key = %object_key,
                    error = %insert_error,
                    "Metadata insert failed, removed orphaned object"
                );
                metrics::counter!("files.orphans.cleaned").increment(1);

                match insert_error {
                    MetadataStoreError::DuplicateKey(_) => RegistryError::DuplicateKey { object_key },
                    MetadataStoreError::Unavailable(_) => insert_error.into(),
                    MetadataStoreError::Query(message) => {
                        RegistryError::InsertFailed { object_key, message }
                    }
                }
            }
            Err(cleanup_error) => {
                error!(
                    object_key = %object_key,
                    insert_error = %insert_error,
                    cleanup_error = %cleanup_error,
                    "Metadata insert failed and orphaned object could not be removed"
                );
                metrics::counter!("files.orphans.leaked").increment(1);

                RegistryError::OrphanCleanupFailed {
                    object_key,
                    insert_error,
                    cleanup_error,
                }
            }
        }
    }

    /// List every file ordered by id ascending
    pub async fn list(&self) -> Result<Vec<FileRecord>, RegistryError> {
        self.list_page(&FileQuery::default()).await
    }

    /// List one page of files ordered by id ascending
    #[instrument(skip(self))]
    pub async fn list_page(&self, query: &FileQuery) -> Result<Vec<FileRecord>, RegistryError> {
        Ok(self.metadata.list(query).await?)
    }

    /// Look up a single record
    pub async fn get(&self, id: i64) -> Result<FileRecord, RegistryError> {
        self.metadata
            .get(id)
            .await?
            .ok_or(RegistryError::NotFound { id })
    }

    /// Fetch a file's content
    #[instrument(skip(self))]
    pub async fn download(&self, id: i64) -> Result<Download, RegistryError> {
        let record = self.get(id).await?;

        let data = match self.objects.get(&record.object_key).await {
            Ok(data) => data,
            Err(ObjectStoreError::NotFound(_)) => {
                warn!(
                    id,
                    object_key = %record.object_key,
                    "Record present but content missing"
                );
                metrics::counter!("files.content_missing").increment(1);
                return Err(RegistryError::ContentMissing {
                    id,
                    object_key: record.object_key,
                });
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("files.downloaded").increment(1);

        Ok(Download {
            content_type: record.effective_content_type().to_string(),
            filename: record.filename,
            data,
        })
    }

    /// Delete a file's content and then its record
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<FileRecord, RegistryError> {
        let record = self.get(id).await?;

        match self.objects.delete(&record.object_key).await {
            // Already gone, e.g. a retry after a dangling record
            Ok(()) | Err(ObjectStoreError::NotFound(_)) => {}
            Err(e) => {
                warn!(
                    id,
                    object_key = %record.object_key,
                    error = %e,
                    "Object delete failed, record retained"
                );
                return Err(e.into());
            }
        }

        match self.metadata.delete(id).await {
            Ok(true) => {}
            // Removed by a concurrent delete between lookup and now
            Ok(false) => return Err(RegistryError::NotFound { id }),
            Err(e) => {
                error!(
                    id,
                    object_key = %record.object_key,
                    error = %e,
                    "Object deleted but record delete failed, record is dangling"
                );
                metrics::counter!("files.dangling_records").increment(1);
                return Err(RegistryError::DanglingRecord {
                    id,
                    object_key: record.object_key,
                    message: e.to_string(),
                });
            }
        }

        metrics::counter!("files.deleted").increment(1);
        info!(id, object_key = %record.object_key, "File deleted");

        Ok(record)
    }

    /// Probe both stores concurrently
    pub async fn health(&self) -> StoreHealth {
        let (object_store, metadata_store) = tokio::join!(self.objects.ping(), self.metadata.ping());
        StoreHealth {
            object_store,
            metadata_store,
        }
    }
}
