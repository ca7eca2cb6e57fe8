#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object storage for telemetry samples and geofence boundaries.
//!
//! Every backend is scoped to a single container (an S3 bucket or a
//! directory) and exposes the same three operations through
//! [`ObjectStore`]: fetch an object, overwrite an object, and list keys
//! under a prefix.
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---|---|
//! | [`S3ObjectStore`] | Any S3-compatible service (AWS, R2, `MinIO`) |
//! | [`LocalObjectStore`] | A directory tree on local disk |
//! | [`MemoryObjectStore`] | Process-local map, for tests and dry runs |

mod local;
mod memory;
mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("Object {container}/{key} not found")]
    NotFound {
        /// Container name.
        container: String,
        /// Object key.
        key: String,
    },

    /// Fetching an object failed.
    #[error("Failed to download {container}/{key}: {source}")]
    Get {
        /// Container name.
        container: String,
        /// Object key.
        key: String,
        /// Underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Writing an object failed.
    #[error("Failed to upload {container}/{key}: {source}")]
    Put {
        /// Container name.
        container: String,
        /// Object key.
        key: String,
        /// Underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Listing a prefix failed.
    #[error("Failed to list {container}/{prefix}: {source}")]
    List {
        /// Container name.
        container: String,
        /// Key prefix.
        prefix: String,
        /// Underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error means the object is absent rather than
    /// unreachable.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A key/value object store scoped to one container.
///
/// Implementations must be safe to share across consumer tasks; no
/// operation takes a lock that is held across an await point.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container this store reads and writes.
    fn container(&self) -> &str;

    /// Fetches the full body of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the object is absent, or a
    /// backend-specific error if the store is unreachable.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `body` to `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Put`] or [`StoreError::Io`] if the write fails.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Lists every key starting with `prefix`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] or [`StoreError::Io`] if the listing
    /// fails.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

