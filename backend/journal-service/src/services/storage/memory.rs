/// In-memory object storage
///
/// Used by tests and by `STORAGE_BACKEND=memory` for local development.
/// Failures can be injected per key so batch behaviour can be exercised, and
/// [`InMemoryStorage::recording`] keeps a log of every call. The plain
/// constructor keeps no log, so a long-running dev server does not grow it.
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use super::{join_public_url, ObjectEntry, ObjectStorage, StorageError};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    failing_uploads: HashSet<String>,
    failing_deletes: HashSet<String>,
    failing_lists: bool,
    upload_calls: Vec<String>,
    delete_calls: Vec<String>,
    list_calls: Vec<String>,
}

pub struct InMemoryStorage {
    public_base_url: String,
    bucket: String,
    record_calls: bool,
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new(public_base_url: &str, bucket: &str) -> Self {
        Self {
            public_base_url: public_base_url.to_string(),
            bucket: bucket.to_string(),
            record_calls: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Storage that logs upload, delete and list calls for assertions
    pub fn recording(public_base_url: &str, bucket: &str) -> Self {
        Self {
            record_calls: true,
            ..Self::new(public_base_url, bucket)
        }
    }

    /// Make uploads whose key contains `fragment` fail
    pub fn fail_uploads_containing(&self, fragment: &str) {
        self.state.lock().failing_uploads.insert(fragment.to_string());
    }

    /// Make deletes of exactly `key` fail
    pub fn fail_deletes_for(&self, key: &str) {
        self.state.lock().failing_deletes.insert(key.to_string());
    }

    /// Make every prefix listing fail
    pub fn fail_lists(&self) {
        self.state.lock().failing_lists = true;
    }

    pub fn insert(&self, key: &str, body: &'static [u8]) {
        self.state.lock().objects.insert(
            key.to_string(),
            StoredObject {
                body: Bytes::from_static(body),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    pub fn upload_calls(&self) -> Vec<String> {
        self.state.lock().upload_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().delete_calls.clone()
    }

    pub fn list_calls(&self) -> Vec<String> {
        self.state.lock().list_calls.clone()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if self.record_calls {
            state.upload_calls.push(key.to_string());
        }

        if state.failing_uploads.iter().any(|f| key.contains(f.as_str())) {
            return Err(StorageError::Backend(format!("injected upload failure for {}", key)));
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base_url, &self.bucket, key)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if self.record_calls {
            state.delete_calls.push(key.to_string());
        }

        if state.failing_deletes.contains(key) {
            return Err(StorageError::Backend(format!("injected delete failure for {}", key)));
        }

        // Deleting a missing object succeeds, matching S3 semantics.
        state.objects.remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut state = self.state.lock();
        if self.record_calls {
            state.list_calls.push(prefix.to_string());
        }

        if state.failing_lists {
            return Err(StorageError::Backend("injected list failure".to_string()));
        }

        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectEntry {
                key: key.clone(),
                size: obj.body.len() as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_by_prefix_is_ordered_and_bounded() {
        let storage = InMemoryStorage::new("http://localhost", "media");
        storage.insert("uploads/a.jpg", b"a");
        storage.insert("uploads/b.jpg", b"bb");
        storage.insert("other/c.jpg", b"c");

        let entries = storage.list_by_prefix("uploads/").await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["uploads/a.jpg", "uploads/b.jpg"]);
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let storage = InMemoryStorage::recording("http://localhost", "media");
        storage.fail_uploads_containing("bad");
        storage.fail_deletes_for("uploads/keep.jpg");

        assert!(storage
            .upload("uploads/bad.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .is_err());
        assert!(storage.delete("uploads/keep.jpg").await.is_err());
        assert!(storage.delete("uploads/missing.jpg").await.is_ok());
        assert_eq!(storage.delete_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_plain_storage_keeps_no_call_log() {
        let storage = InMemoryStorage::new("http://localhost", "media");
        storage
            .upload("uploads/a.jpg", Bytes::from_static(b"a"), "image/jpeg")
            .await
            .unwrap();
        storage.delete("uploads/a.jpg").await.unwrap();
        assert!(!storage.exists("uploads/a.jpg").await.unwrap());

        assert!(storage.upload_calls().is_empty());
        assert!(storage.delete_calls().is_empty());
        assert!(storage.list_calls().is_empty());
    }
}
