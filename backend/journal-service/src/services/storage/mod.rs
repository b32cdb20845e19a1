//! Object storage seam
//!
//! Posts only need four operations from the bucket: upload by key, public URL
//! by key, delete by key and list by prefix. The S3 implementation talks to any
//! S3-compatible endpoint; the in-memory one backs tests and local runs.

pub mod memory;
pub mod s3;

pub use memory::InMemoryStorage;
pub use s3::S3Storage;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage authentication failed: {0}")]
    Auth(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("storage request failed: {0}")]
    Backend(String),
}

/// Metadata returned by a prefix listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `body` under `key`, replacing any previous object
    async fn upload(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<(), StorageError>;

    /// Publicly reachable URL for `key`; no existence check
    fn public_url(&self, key: &str) -> String;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    /// Whether an object with exactly this key exists
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let entries = self.list_by_prefix(key).await?;
        Ok(entries.iter().any(|entry| entry.key == key))
    }
}

pub type SharedStorage = Arc<dyn ObjectStorage>;

/// Build the configured storage backend
pub async fn from_config(config: &StorageConfig) -> Result<SharedStorage, StorageError> {
    match config.backend {
        StorageBackend::S3 => {
            let storage = S3Storage::from_config(config).await?;
            tracing::info!(bucket = %config.bucket, "S3 object storage initialized");
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory object storage; uploads are not persisted");
            Ok(Arc::new(InMemoryStorage::new(&config.public_base_url, &config.bucket)))
        }
    }
}

/// Join a public base URL, bucket and key without doubling slashes
pub(crate) fn join_public_url(base: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        bucket.trim_matches('/'),
        key.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_public_url() {
        assert_eq!(
            join_public_url("https://x.supabase.co/storage/v1/object/public/", "media", "/uploads/a.jpg"),
            "https://x.supabase.co/storage/v1/object/public/media/uploads/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_exists_requires_exact_key() {
        let storage = InMemoryStorage::new("http://localhost", "media");
        storage
            .upload("uploads/photo.jpg.bak", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();

        assert!(!storage.exists("uploads/photo.jpg").await.unwrap());
        assert!(storage.exists("uploads/photo.jpg.bak").await.unwrap());
    }
}
