//! Storage key resolution for uploaded files
//!
//! A safe filename is stored as-is under [`UPLOAD_FOLDER`]; anything else gets
//! a generated name. With the name strategy every candidate is then checked
//! against the bucket, regenerating on collision, so two authors uploading
//! `photo.jpg` no longer overwrite each other. The content-hash strategy names
//! objects after their bytes instead, which rules out collisions between
//! different content entirely.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::{KeyStrategy, UploadConfig};
use crate::services::storage::ObjectStorage;

pub const UPLOAD_FOLDER: &str = "uploads";
pub const NAME_PREFIX: &str = "trip";
pub const MAX_FILENAME_LEN: usize = 100;
pub const AUTHOR_FRAGMENT_LEN: usize = 8;
pub const RANDOM_TOKEN_LEN: usize = 6;
pub const FALLBACK_EXTENSION: &str = "bin";

/// True when `filename` only uses `[A-Za-z0-9_.-]` and is 1..=100 chars long
pub fn is_safe(filename: &str) -> bool {
    !filename.is_empty()
        && filename.len() <= MAX_FILENAME_LEN
        && filename
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Lower-cased extension of `filename`, or `bin` when it has none or an
/// unusable one
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// `trip[_<author8>]_<epoch millis>_<token>.<ext>`
pub fn make_unique_name(original_filename: &str, author_id: Option<&str>) -> String {
    let mut parts: Vec<String> = vec![NAME_PREFIX.to_string()];

    if let Some(fragment) = author_id.map(author_fragment).filter(|f| !f.is_empty()) {
        parts.push(fragment);
    }

    parts.push(chrono::Utc::now().timestamp_millis().to_string());
    parts.push(random_token(RANDOM_TOKEN_LEN));

    format!("{}.{}", parts.join("_"), extension_of(original_filename))
}

/// Content-addressed key: `uploads/<sha256>.<ext>`
pub fn content_hash_key(original_filename: &str, body: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(body));
    format!("{}/{}.{}", UPLOAD_FOLDER, digest, extension_of(original_filename))
}

/// Key without any storage check: the safe name or a generated one, under
/// the upload folder
pub fn candidate_key(original_filename: &str, author_id: Option<&str>) -> String {
    if is_safe(original_filename) {
        folder_key(original_filename)
    } else {
        folder_key(&make_unique_name(original_filename, author_id))
    }
}

fn folder_key(name: &str) -> String {
    format!("{}/{}", UPLOAD_FOLDER, name)
}

fn author_fragment(author_id: &str) -> String {
    author_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(AUTHOR_FRAGMENT_LEN)
        .collect::<String>()
        .to_ascii_lowercase()
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Key chosen for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    /// The object is already in the bucket and must not be rewritten
    pub reused: bool,
}

impl ResolvedKey {
    fn fresh(key: String) -> Self {
        Self { key, reused: false }
    }
}

/// Resolves storage keys, checking the bucket for collisions
pub struct KeyResolver<'a> {
    storage: &'a dyn ObjectStorage,
    strategy: KeyStrategy,
    attempts: u32,
    delay: Duration,
}

impl<'a> KeyResolver<'a> {
    pub fn new(storage: &'a dyn ObjectStorage, config: &UploadConfig) -> Self {
        Self {
            storage,
            strategy: config.key_strategy,
            attempts: config.key_check_attempts.max(1),
            delay: config.key_check_delay(),
        }
    }

    /// Produce a key for one file.
    ///
    /// Never fails. Under the name strategy a storage error counts as "no
    /// collision", and once the attempt budget is spent the last generated
    /// name is used. Under the content-hash strategy an existing object is
    /// reused, and a storage error counts as "exists" so nothing is
    /// overwritten or later deleted on this batch's behalf.
    pub async fn resolve_key(
        &self,
        original_filename: &str,
        author_id: Option<&str>,
        body: &[u8],
    ) -> ResolvedKey {
        if self.strategy == KeyStrategy::ContentHash {
            return self.resolve_content_hash(original_filename, body).await;
        }

        let mut key = candidate_key(original_filename, author_id);

        for attempt in 1..=self.attempts {
            match self.storage.exists(&key).await {
                Ok(false) => return ResolvedKey::fresh(key),
                Ok(true) => {
                    tracing::info!(%key, attempt, "storage key taken, regenerating");
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err, "key existence check failed, using candidate");
                    return ResolvedKey::fresh(key);
                }
            }

            key = folder_key(&make_unique_name(original_filename, author_id));

            if attempt < self.attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        tracing::warn!(
            %key,
            attempts = self.attempts,
            "key check budget exhausted, proceeding with last generated key"
        );
        ResolvedKey::fresh(key)
    }

    async fn resolve_content_hash(&self, original_filename: &str, body: &[u8]) -> ResolvedKey {
        let key = content_hash_key(original_filename, body);
        let reused = match self.storage.exists(&key).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(%key, error = %err, "existence check failed, treating content key as present");
                true
            }
        };
        if reused {
            tracing::debug!(%key, "identical content already stored, reusing key");
        }
        ResolvedKey { key, reused }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{InMemoryStorage, ObjectEntry, StorageError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    fn is_generated(name: &str, ext: &str) -> bool {
        name.starts_with("trip_") && name.ends_with(&format!(".{}", ext))
    }

    fn name_config(attempts: u32) -> UploadConfig {
        UploadConfig {
            key_check_attempts: attempts,
            key_check_delay_ms: 1,
            ..UploadConfig::default()
        }
    }

    #[test]
    fn test_is_safe_allow_list() {
        assert!(is_safe("photo.jpg"));
        assert!(is_safe("IMG_2041-final.v2.JPG"));
        assert!(is_safe(&"a".repeat(100)));

        assert!(!is_safe(""));
        assert!(!is_safe(&"a".repeat(101)));
        assert!(!is_safe("my photo.jpg"));
        assert!(!is_safe("trips/photo.jpg"));
        assert!(!is_safe("café.jpg"));
        assert!(!is_safe("a+b.png"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Beach Day.JPEG"), "jpeg");
        assert_eq!(extension_of("README"), "bin");
        assert_eq!(extension_of(".hidden"), "bin");
        assert_eq!(extension_of("weird.j p g"), "bin");
    }

    #[test]
    fn test_make_unique_name_structure() {
        let name = make_unique_name("Sunset Over Porto.PNG", Some("3f1c9a7e-22b4-4d3e"));
        let stem = name.strip_suffix(".png").unwrap();
        let parts: Vec<_> = stem.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "trip");
        assert_eq!(parts[1], "3f1c9a7e");
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(parts[3].len(), RANDOM_TOKEN_LEN);

        let anonymous = make_unique_name("x y.gif", None);
        assert_eq!(anonymous.trim_end_matches(".gif").split('_').count(), 3);
    }

    #[test]
    fn test_make_unique_name_differs_between_calls() {
        let a = make_unique_name("a b.jpg", None);
        let b = make_unique_name("a b.jpg", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_candidate_key() {
        assert_eq!(candidate_key("photo.jpg", Some("author")), "uploads/photo.jpg");

        let generated = candidate_key("my photo.JPG", None);
        let name = generated.strip_prefix("uploads/").unwrap();
        assert!(is_generated(name, "jpg"));
        assert!(is_safe(name));
    }

    #[test]
    fn test_content_hash_key_is_stable() {
        let a = content_hash_key("a.JPG", b"same bytes");
        let b = content_hash_key("b.jpg", b"same bytes");
        assert_eq!(a, b);
        assert_ne!(a, content_hash_key("a.jpg", b"other bytes"));
        assert!(a.starts_with("uploads/") && a.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_resolve_key_keeps_free_safe_name() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        let config = name_config(5);
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("photo.jpg", Some("u1"), b"x").await;
        assert_eq!(resolved, ResolvedKey::fresh("uploads/photo.jpg".to_string()));
        assert_eq!(storage.list_calls(), vec!["uploads/photo.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_key_regenerates_on_collision() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        storage.insert("uploads/photo.jpg", b"someone else's photo");
        let config = name_config(5);
        let resolver = KeyResolver::new(&storage, &config);

        let key = resolver.resolve_key("photo.jpg", Some("u2"), b"x").await.key;
        assert_ne!(key, "uploads/photo.jpg");
        assert!(is_generated(key.strip_prefix("uploads/").unwrap(), "jpg"));
        assert_eq!(storage.list_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_key_treats_check_errors_as_free() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        storage.fail_lists();
        let config = name_config(5);
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("photo.jpg", None, b"x").await;
        assert_eq!(resolved.key, "uploads/photo.jpg");
        assert!(!resolved.reused);
    }

    /// Storage where every key is already taken
    #[derive(Default)]
    struct FullBucket {
        checked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStorage for FullBucket {
        async fn upload(&self, _: &str, _: Bytes, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            key.to_string()
        }

        async fn delete(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn list_by_prefix(&self, _: &str) -> Result<Vec<ObjectEntry>, StorageError> {
            Ok(Vec::new())
        }

        async fn exists(&self, key: &str) -> Result<bool, StorageError> {
            self.checked.lock().push(key.to_string());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_resolve_key_stops_after_attempt_budget() {
        let storage = FullBucket::default();
        let config = name_config(3);
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("photo.jpg", Some("u3"), b"x").await;

        let checked = storage.checked.lock().clone();
        assert_eq!(checked.len(), 3);
        assert_eq!(checked[0], "uploads/photo.jpg");
        assert!(!resolved.reused);
        assert!(is_generated(resolved.key.strip_prefix("uploads/").unwrap(), "jpg"));
        assert!(!checked.contains(&resolved.key));
    }

    #[tokio::test]
    async fn test_resolve_key_zero_budget_still_checks_once() {
        let storage = FullBucket::default();
        let config = name_config(0);
        let resolver = KeyResolver::new(&storage, &config);

        resolver.resolve_key("photo.jpg", None, b"x").await;
        assert_eq!(storage.checked.lock().len(), 1);
    }

    fn hash_config() -> UploadConfig {
        UploadConfig {
            key_strategy: KeyStrategy::ContentHash,
            ..UploadConfig::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_key_content_hash_new_content() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        let config = hash_config();
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("photo.jpg", None, b"bytes").await;
        assert_eq!(resolved.key, content_hash_key("photo.jpg", b"bytes"));
        assert!(!resolved.reused);
        assert_eq!(storage.list_calls(), vec![resolved.key]);
    }

    #[tokio::test]
    async fn test_resolve_key_content_hash_reuses_existing_object() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        let existing = content_hash_key("photo.jpg", b"bytes");
        storage.insert(&existing, b"bytes");
        let config = hash_config();
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("other-name.JPG", Some("u9"), b"bytes").await;
        assert_eq!(resolved, ResolvedKey { key: existing, reused: true });
    }

    #[tokio::test]
    async fn test_resolve_key_content_hash_check_error_counts_as_existing() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        storage.fail_lists();
        let config = hash_config();
        let resolver = KeyResolver::new(&storage, &config);

        let resolved = resolver.resolve_key("photo.jpg", None, b"bytes").await;
        assert!(resolved.reused);
    }
}
