/// Post service - create, edit, delete and read microblog posts
///
/// Writes follow one rule: the database is the source of truth for which
/// keys a post owns. Uploads happen before the row is written and are cleaned
/// up if the row cannot be written; deletes of removed keys happen after the
/// row has been updated and are never rolled back. A key is only deleted once
/// no other post lists it, since identical content shares one content-hash
/// key.
use std::sync::Arc;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::{CatalogStore, PostStore};
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::{
    validate_title, NewPost, Place, PostChanges, PostDraft, PostListQuery, PostMutationResponse,
    PostResponse, PostUpdate, PostWithRefs,
};
use crate::services::media::{ImageTranscoder, IncomingFile};
use crate::services::rich_text::ensure_canonical_format;
use crate::services::storage::SharedStorage;
use crate::services::storage_diff::{diff_and_delete_removed, release_unreferenced, DeleteReport};
use crate::services::upload::{
    CancelSignal, ProgressSink, UploadOutcome, UploadPipeline, UploadedFile,
};

pub struct PostService {
    store: Arc<dyn PostStore>,
    catalog: Arc<dyn CatalogStore>,
    storage: SharedStorage,
    uploads: UploadConfig,
    transcoder: Arc<dyn ImageTranscoder>,
    progress: Arc<dyn ProgressSink>,
}

impl PostService {
    pub fn new(
        store: Arc<dyn PostStore>,
        catalog: Arc<dyn CatalogStore>,
        storage: SharedStorage,
        uploads: UploadConfig,
        transcoder: Arc<dyn ImageTranscoder>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            storage,
            uploads,
            transcoder,
            progress,
        }
    }

    pub fn upload_limits(&self) -> &UploadConfig {
        &self.uploads
    }

    fn to_response(&self, row: PostWithRefs) -> PostResponse {
        let storage = self.storage.clone();
        PostResponse::from_row(row, move |key| storage.public_url(key))
    }

    fn validate_files(&self, files: &[IncomingFile]) -> Result<()> {
        if files.len() > self.uploads.max_files_per_post {
            return Err(AppError::ValidationError(format!(
                "at most {} files per post",
                self.uploads.max_files_per_post
            )));
        }
        if let Some(file) = files.iter().find(|f| f.body.len() > self.uploads.max_file_bytes) {
            return Err(AppError::ValidationError(format!(
                "{} exceeds the {} byte limit",
                file.filename, self.uploads.max_file_bytes
            )));
        }
        if let Some(file) = files.iter().find(|f| f.body.is_empty()) {
            return Err(AppError::ValidationError(format!("{} is empty", file.filename)));
        }
        Ok(())
    }

    async fn upload_batch(
        &self,
        session: &Session,
        files: Vec<IncomingFile>,
        cancel: &CancelSignal,
    ) -> Result<UploadOutcome> {
        let author_id = session.author_id();
        let pipeline = UploadPipeline::new(
            self.storage.as_ref(),
            &self.uploads,
            Arc::clone(&self.transcoder),
            self.progress.clone(),
        );

        match pipeline.run(files, Some(&author_id), cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.discard_uploads(err.uploaded().to_vec()).await;
                Err(err.into())
            }
        }
    }

    /// Best-effort removal of objects this request wrote and no row references
    async fn discard_uploads(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let report =
            release_unreferenced(self.storage.as_ref(), self.store.as_ref(), keys, None).await;
        if !report.is_complete() {
            tracing::warn!(
                orphaned = ?report.failed.iter().map(|f| &f.key).collect::<Vec<_>>(),
                "could not discard uploaded files"
            );
        }
    }

    /// Resolve `place_id` and make sure it belongs to `location_id`
    async fn validate_place(&self, location_id: Option<Uuid>, place_id: Uuid) -> Result<Place> {
        let place = self
            .catalog
            .get_place(place_id)
            .await?
            .ok_or_else(|| AppError::ValidationError("unknown place".to_string()))?;

        if Some(place.location_id) != location_id {
            return Err(AppError::ValidationError(
                "the place does not belong to the post's location".to_string(),
            ));
        }
        Ok(place)
    }

    /// Upload a single file outside of any post, e.g. an inline editor image
    pub async fn upload_media(
        &self,
        session: &Session,
        file: IncomingFile,
        cancel: &CancelSignal,
    ) -> Result<UploadedFile> {
        let files = vec![file];
        self.validate_files(&files)?;

        let outcome = self.upload_batch(session, files, cancel).await?;
        let uploaded = outcome
            .files
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("upload produced no file".to_string()))?;

        tracing::info!(key = %uploaded.key, reused = uploaded.reused, "media uploaded");
        Ok(uploaded)
    }

    /// Create a post after uploading its files in order
    pub async fn create_post(
        &self,
        session: &Session,
        draft: PostDraft,
        files: Vec<IncomingFile>,
        cancel: &CancelSignal,
    ) -> Result<PostMutationResponse> {
        let title = validate_title(&draft.title).map_err(AppError::ValidationError)?;
        let location_id = draft.location_id.ok_or_else(|| {
            AppError::ValidationError("a location must be selected".to_string())
        })?;
        self.validate_files(&files)?;

        let location = self
            .catalog
            .get_location(location_id)
            .await?
            .ok_or_else(|| AppError::ValidationError("unknown location".to_string()))?;

        if let Some(place_id) = draft.place_id {
            self.validate_place(Some(location.id), place_id).await?;
        }

        let content = ensure_canonical_format(&draft.content);
        let outcome = self.upload_batch(session, files, cancel).await?;

        let new_post = NewPost {
            author_id: session.user_id,
            title,
            content,
            location_id: Some(location.id),
            place_id: draft.place_id,
            country: Some(location.country),
            file_keys: outcome.keys(),
            generated_facts: Some(draft.generated_facts).filter(|f| !f.is_empty()),
        };

        let row = match self.store.insert(new_post).await {
            Ok(row) => row,
            Err(err) => {
                tracing::error!(error = %err, "failed to save post, discarding uploads");
                self.discard_uploads(outcome.created_keys()).await;
                return Err(err);
            }
        };

        tracing::info!(post_id = %row.post.id, files = row.post.file_keys.len(), "post created");

        Ok(PostMutationResponse {
            post: self.to_response(row),
            upload_progress: outcome.progress,
            storage_warning: None,
            delete_report: None,
        })
    }

    async fn owned_post(&self, session: &Session, post_id: Uuid) -> Result<PostWithRefs> {
        let existing = self
            .store
            .find(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        if existing.post.author_id != session.user_id {
            return Err(AppError::Forbidden(
                "only the author can change this post".to_string(),
            ));
        }
        Ok(existing)
    }

    /// Edit a post; files dropped from the list are deleted from storage
    pub async fn update_post(
        &self,
        session: &Session,
        post_id: Uuid,
        changes: PostChanges,
        files: Vec<IncomingFile>,
        cancel: &CancelSignal,
    ) -> Result<PostMutationResponse> {
        let existing = self.owned_post(session, post_id).await?.post;

        let title = match &changes.title {
            Some(title) => validate_title(title).map_err(AppError::ValidationError)?,
            None => existing.title.clone(),
        };
        self.validate_files(&files)?;

        let place_id = match changes.place_id {
            None => existing.place_id,
            Some(None) => None,
            Some(Some(place_id)) => {
                Some(self.validate_place(existing.location_id, place_id).await?.id)
            }
        };

        let content = ensure_canonical_format(changes.content.as_ref().unwrap_or(&existing.content));

        let retained: Vec<String> = match changes.retained_file_keys {
            Some(keys) => keys
                .into_iter()
                .filter(|key| {
                    let owned = existing.file_keys.contains(key);
                    if !owned {
                        tracing::warn!(%post_id, %key, "ignoring key the post does not own");
                    }
                    owned
                })
                .collect(),
            None => existing.file_keys.clone(),
        };

        let outcome = self.upload_batch(session, files, cancel).await?;
        let uploaded = outcome.keys();

        let mut file_keys = retained;
        file_keys.extend(uploaded.iter().cloned());

        let update = PostUpdate {
            title,
            content,
            place_id,
            file_keys: file_keys.clone(),
            generated_facts: changes.generated_facts.or(existing.generated_facts.clone()),
        };

        let row = match self.store.update(post_id, update).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.discard_uploads(outcome.created_keys()).await;
                return Err(AppError::NotFound("Post not found".to_string()));
            }
            Err(err) => {
                tracing::error!(%post_id, error = %err, "failed to update post, discarding uploads");
                self.discard_uploads(outcome.created_keys()).await;
                return Err(err);
            }
        };

        let report = diff_and_delete_removed(
            self.storage.as_ref(),
            self.store.as_ref(),
            post_id,
            &existing.file_keys,
            &file_keys,
        )
        .await;
        tracing::info!(
            %post_id,
            added = uploaded.len(),
            removed = report.deleted.len() + report.failed.len(),
            shared = report.shared.len(),
            "post updated"
        );

        Ok(PostMutationResponse {
            post: self.to_response(row),
            upload_progress: outcome.progress,
            storage_warning: report.failure_summary(),
            delete_report: Some(report),
        })
    }

    /// Delete the row first, then its files.
    ///
    /// A storage failure leaves an orphaned object, never a row that points
    /// at a missing file.
    pub async fn delete_post(&self, session: &Session, post_id: Uuid) -> Result<DeleteReport> {
        let existing = self.owned_post(session, post_id).await?.post;

        if !self.store.delete(post_id).await? {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        let report = release_unreferenced(
            self.storage.as_ref(),
            self.store.as_ref(),
            existing.file_keys,
            Some(post_id),
        )
        .await;
        tracing::info!(%post_id, files_deleted = report.deleted.len(), "post deleted");
        Ok(report)
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<PostResponse> {
        let row = self
            .store
            .find(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
        Ok(self.to_response(row))
    }

    pub async fn list_posts(&self, query: PostListQuery) -> Result<Vec<PostResponse>> {
        let rows = self.store.list(query).await?;
        Ok(rows.into_iter().map(|row| self.to_response(row)).collect())
    }
}
