//! Sequential upload pipeline
//!
//! Files of one submission are prepared, keyed and uploaded strictly in order.
//! A single [`UploadProgress`] owned by the pipeline run is updated after each
//! completed upload and pushed to a [`ProgressSink`]. The first failure aborts
//! the batch; a [`CancelSignal`] is checked before every file. Only keys the
//! batch itself wrote are reported for rollback; a reused content-hash key
//! belongs to whoever stored it first.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::UploadConfig;
use crate::services::filename::KeyResolver;
use crate::services::media::{prepare_file_blocking, ImageTranscoder, IncomingFile};
use crate::services::storage::{ObjectStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file {} of batch ({filename}) failed: {source}", .index + 1)]
    Failed {
        index: usize,
        filename: String,
        uploaded: Vec<String>,
        #[source]
        source: StorageError,
    },

    #[error("upload cancelled after {} file(s)", .uploaded.len())]
    Cancelled { uploaded: Vec<String> },
}

impl UploadError {
    /// Keys this batch created before it stopped
    pub fn uploaded(&self) -> &[String] {
        match self {
            UploadError::Failed { uploaded, .. } | UploadError::Cancelled { uploaded } => uploaded,
        }
    }
}

/// Monotonic per-batch progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UploadProgress {
    pub completed: usize,
    pub total: usize,
}

impl UploadProgress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    /// Rounded percentage; an empty batch counts as done
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u8
    }

    fn record_completed(&mut self) {
        self.completed = (self.completed + 1).min(self.total);
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: UploadProgress);
}

/// Reports progress as structured log events
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, progress: UploadProgress) {
        tracing::info!(
            completed = progress.completed,
            total = progress.total,
            percent = progress.percent(),
            "upload progress"
        );
    }
}

/// Receiving half of a cancellation flag
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Sending half of a cancellation flag
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means nobody is uploading anymore.
        let _ = self.0.send(true);
    }
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), CancelSignal(rx))
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// A file that made it into storage
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UploadedFile {
    pub key: String,
    pub public_url: String,
    pub original_filename: String,
    pub content_type: String,
    pub size: usize,
    /// Already stored before this batch; not written and not owned by it
    #[serde(skip)]
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub files: Vec<UploadedFile>,
    pub progress: UploadProgress,
}

impl UploadOutcome {
    pub fn keys(&self) -> Vec<String> {
        self.files.iter().map(|f| f.key.clone()).collect()
    }

    /// Keys written by this batch, excluding reused ones
    pub fn created_keys(&self) -> Vec<String> {
        created_keys(&self.files)
    }
}

fn created_keys(files: &[UploadedFile]) -> Vec<String> {
    files
        .iter()
        .filter(|f| !f.reused)
        .map(|f| f.key.clone())
        .collect()
}

pub struct UploadPipeline<'a> {
    storage: &'a dyn ObjectStorage,
    resolver: KeyResolver<'a>,
    transcoder: Arc<dyn ImageTranscoder>,
    sink: Arc<dyn ProgressSink>,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(
        storage: &'a dyn ObjectStorage,
        config: &UploadConfig,
        transcoder: Arc<dyn ImageTranscoder>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            storage,
            resolver: KeyResolver::new(storage, config),
            transcoder,
            sink,
        }
    }

    pub async fn run(
        &self,
        files: Vec<IncomingFile>,
        author_id: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<UploadOutcome, UploadError> {
        let mut progress = UploadProgress::new(files.len());
        let mut uploaded: Vec<UploadedFile> = Vec::with_capacity(files.len());

        for (index, file) in files.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(completed = uploaded.len(), "upload batch cancelled");
                return Err(UploadError::Cancelled {
                    uploaded: created_keys(&uploaded),
                });
            }

            let original_filename = file.filename.clone();
            let prepared = prepare_file_blocking(file, Arc::clone(&self.transcoder)).await;
            let resolved = self
                .resolver
                .resolve_key(&prepared.filename, author_id, &prepared.body)
                .await;
            let key = resolved.key;
            let size = prepared.body.len();

            if resolved.reused {
                tracing::debug!(index, %key, "content already stored, skipping upload");
            } else if let Err(source) = self
                .storage
                .upload(&key, prepared.body, &prepared.content_type)
                .await
            {
                tracing::error!(
                    index,
                    filename = %original_filename,
                    %key,
                    error = %source,
                    "upload failed, aborting batch"
                );
                return Err(UploadError::Failed {
                    index,
                    filename: original_filename,
                    uploaded: created_keys(&uploaded),
                    source,
                });
            }

            uploaded.push(UploadedFile {
                public_url: self.storage.public_url(&key),
                key,
                original_filename,
                content_type: prepared.content_type,
                size,
                reused: resolved.reused,
            });

            progress.record_completed();
            self.sink.report(progress);
        }

        Ok(UploadOutcome {
            files: uploaded,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyStrategy;
    use crate::services::filename::content_hash_key;
    use crate::services::media::{ImageCrateTranscoder, TranscodeError};
    use crate::services::storage::InMemoryStorage;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<u8>>);

    impl ProgressSink for RecordingSink {
        fn report(&self, progress: UploadProgress) {
            self.0.lock().push(progress.percent());
        }
    }

    fn file(name: &str) -> IncomingFile {
        IncomingFile {
            filename: name.to_string(),
            content_type: "image/jpeg".to_string(),
            body: Bytes::from(name.as_bytes().to_vec()),
        }
    }

    fn config() -> UploadConfig {
        UploadConfig {
            key_check_delay_ms: 1,
            ..UploadConfig::default()
        }
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = UploadProgress::new(3);
        assert_eq!(progress.percent(), 0);
        progress.record_completed();
        assert_eq!(progress.percent(), 33);
        progress.record_completed();
        assert_eq!(progress.percent(), 67);
        progress.record_completed();
        progress.record_completed();
        assert_eq!(progress.completed, 3);
        assert_eq!(UploadProgress::new(0).percent(), 100);
    }

    #[tokio::test]
    async fn test_uploads_in_order_with_monotonic_progress() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let sink = Arc::new(RecordingSink::default());
        let cfg = config();
        let pipeline = UploadPipeline::new(&storage, &cfg, Arc::new(ImageCrateTranscoder), sink.clone());

        let outcome = pipeline
            .run(
                vec![file("a.jpg"), file("b.jpg"), file("c.jpg")],
                Some("author-1"),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.keys(),
            vec!["uploads/a.jpg", "uploads/b.jpg", "uploads/c.jpg"]
        );
        assert_eq!(storage.upload_calls(), outcome.keys());
        assert_eq!(*sink.0.lock(), vec![33, 67, 100]);
        assert_eq!(outcome.files[0].public_url, "http://cdn/media/uploads/a.jpg");
    }

    #[tokio::test]
    async fn test_second_failure_aborts_before_third() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        storage.fail_uploads_containing("b.jpg");
        let cfg = config();
        let pipeline =
            UploadPipeline::new(&storage, &cfg, Arc::new(ImageCrateTranscoder), Arc::new(TracingProgress));

        let err = pipeline
            .run(
                vec![file("a.jpg"), file("b.jpg"), file("c.jpg")],
                None,
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();

        match &err {
            UploadError::Failed { index, filename, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(filename, "b.jpg");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.uploaded(), ["uploads/a.jpg".to_string()]);
        assert_eq!(storage.upload_calls(), vec!["uploads/a.jpg", "uploads/b.jpg"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let cfg = config();
        let pipeline =
            UploadPipeline::new(&storage, &cfg, Arc::new(ImageCrateTranscoder), Arc::new(TracingProgress));
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();

        let err = pipeline
            .run(vec![file("a.jpg")], None, &signal)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled { ref uploaded } if uploaded.is_empty()));
        assert!(storage.upload_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_names_get_generated_keys() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let cfg = config();
        let pipeline =
            UploadPipeline::new(&storage, &cfg, Arc::new(ImageCrateTranscoder), Arc::new(TracingProgress));

        let outcome = pipeline
            .run(vec![file("Beach Day.JPG")], Some("abc"), &CancelSignal::never())
            .await
            .unwrap();

        let key = &outcome.files[0].key;
        assert!(key.starts_with("uploads/trip_abc_"));
        assert!(key.ends_with(".jpg"));
        assert_eq!(outcome.files[0].original_filename, "Beach Day.JPG");
    }

    #[tokio::test]
    async fn test_reused_content_is_not_uploaded_or_owned() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let shared = content_hash_key("a.jpg", b"a.jpg");
        storage.insert(&shared, b"a.jpg");
        storage.fail_uploads_containing(&content_hash_key("b.jpg", b"b.jpg"));
        let cfg = UploadConfig {
            key_strategy: KeyStrategy::ContentHash,
            ..config()
        };
        let pipeline =
            UploadPipeline::new(&storage, &cfg, Arc::new(ImageCrateTranscoder), Arc::new(TracingProgress));

        let outcome = pipeline
            .run(vec![file("a.jpg"), file("c.jpg")], None, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome.keys()[0], shared);
        assert!(outcome.files[0].reused);
        assert_eq!(outcome.created_keys(), vec![outcome.keys()[1].clone()]);
        assert_eq!(storage.upload_calls(), vec![outcome.keys()[1].clone()]);

        let err = pipeline
            .run(vec![file("a.jpg"), file("b.jpg")], None, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(err.uploaded().is_empty());
        assert!(storage.get(&shared).is_some());
    }

    /// Cancels the batch as soon as the first file is reported
    struct CancelAfterFirst(CancelHandle);

    impl ProgressSink for CancelAfterFirst {
        fn report(&self, _progress: UploadProgress) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_reports_written_keys() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let cfg = config();
        let (handle, signal) = CancelSignal::pair();
        let pipeline = UploadPipeline::new(
            &storage,
            &cfg,
            Arc::new(ImageCrateTranscoder),
            Arc::new(CancelAfterFirst(handle)),
        );

        let err = pipeline
            .run(vec![file("a.jpg"), file("b.jpg"), file("c.jpg")], None, &signal)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled { .. }));
        assert_eq!(err.uploaded(), ["uploads/a.jpg".to_string()]);
        assert_eq!(storage.upload_calls(), vec!["uploads/a.jpg"]);
    }

    /// Converts slowly, like a large HEIC decode would
    struct SlowTranscoder {
        finished_at: Mutex<Option<Instant>>,
    }

    impl ImageTranscoder for SlowTranscoder {
        fn to_jpeg(&self, _body: &[u8]) -> Result<Vec<u8>, TranscodeError> {
            std::thread::sleep(Duration::from_millis(100));
            *self.finished_at.lock() = Some(Instant::now());
            Ok(b"jpeg".to_vec())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_conversion_does_not_block_the_runtime() {
        let storage = InMemoryStorage::recording("http://cdn", "media");
        let cfg = config();
        let transcoder = Arc::new(SlowTranscoder {
            finished_at: Mutex::new(None),
        });
        let pipeline =
            UploadPipeline::new(&storage, &cfg, transcoder.clone(), Arc::new(TracingProgress));

        let heic = IncomingFile {
            filename: "IMG_1.HEIC".to_string(),
            content_type: "image/heic".to_string(),
            body: Bytes::from_static(b"heic"),
        };
        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Instant::now()
        });

        let outcome = pipeline
            .run(vec![heic], None, &CancelSignal::never())
            .await
            .unwrap();
        let ticked_at = ticker.await.unwrap();

        assert_eq!(outcome.files[0].content_type, "image/jpeg");
        let converted_at = (*transcoder.finished_at.lock()).unwrap();
        assert!(ticked_at < converted_at);
    }
}
