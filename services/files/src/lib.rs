//! Files Service
//!
//! HTTP file storage that keeps file content in an S3-compatible object store
//! (MinIO in development) and file metadata in SQLite, without a transaction
//! spanning the two.
//!
//! ## Features
//!
//! - **Ordered writes**: content is written before it is indexed and removed
//!   before it is unindexed, so a listed file always had content
//! - **Orphan compensation**: a failed index insert deletes the object it
//!   would have pointed to, and reports loudly if that fails too
//! - **Precise failures**: missing records, missing content, unreachable
//!   stores and partial deletes are all distinct [`RegistryError`] kinds
//! - **Content type resolution**: declared, sniffed or defaulted in a
//!   configurable order
//!
//! ## Architecture
//!
//! ```text
//!   HTTP (axum)
//!  ┌──────────────┐
//!  │ /files       │
//!  └──────────────┘
//!         │
//!         ▼
//!  ┌──────────────┐      ┌──────────────┐
//!  │ File         │─────▶│ Key          │
//!  │ Registry     │      │ Generator    │
//!  └──────────────┘      └──────────────┘
//!     │        │
//!     │ 1st    │ 2nd
//!     ▼        ▼
//!  ┌────────┐ ┌──────────┐
//!  │ S3     │ │ SQLite   │
//!  │ objects│ │ files    │
//!  └────────┘ └──────────┘
//! ```

pub mod api;
pub mod config;
pub mod content_type;
pub mod error;
pub mod key_generator;
pub mod metadata_store;
pub mod object_store;
pub mod registry;
pub mod s3_store;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use content_type::{ContentTypeResolver, ContentTypeSource};
pub use error::{RegistryError, StoreKind};
pub use key_generator::{KeyGenerator, UuidKeyGenerator};
pub use metadata_store::{
    FileQuery, FileRecord, MetadataStore, MetadataStoreError, NewFileRecord, SqliteMetadataStore,
};
pub use object_store::{ObjectStore, ObjectStoreError};
pub use registry::{Download, FileRegistry, UploadOutcome, UploadRequest};
pub use s3_store::S3ObjectStore;
