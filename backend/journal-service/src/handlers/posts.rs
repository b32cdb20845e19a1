/// Post handlers - HTTP endpoints for post operations
///
/// Create and update take `multipart/form-data`: one `post` part holding the
/// JSON fields and any number of file parts. Uploads run on a detached task
/// so a client that disconnects mid-batch cancels it cleanly instead of
/// leaving half-written files behind.
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use crate::middleware::Session;
use crate::models::{PostChanges, PostDraft, PostListQuery};
use crate::services::media::IncomingFile;
use crate::services::storage_diff::DeleteReport;
use crate::services::upload::{CancelHandle, CancelSignal};
use crate::services::PostService;

/// Name of the multipart part that carries the JSON fields
pub const POST_FIELD: &str = "post";
const MAX_JSON_FIELD_BYTES: usize = 256 * 1024;

#[derive(Debug, Serialize)]
pub struct DeletePostResponse {
    pub id: Uuid,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
    pub report: DeleteReport,
}

struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `work` on its own task; dropping the request cancels it at the next
/// file boundary.
pub(crate) async fn run_detached<F, Fut, T>(work: F) -> Result<T>
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    let (handle, signal) = CancelSignal::pair();
    let _guard = CancelOnDrop(handle);

    actix_web::rt::spawn(work(signal))
        .await
        .map_err(|e| AppError::Internal(format!("upload task failed: {}", e)))?
}

async fn read_field(field: &mut Field, limit: usize, name: &str) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;
        if buf.len() + data.len() > limit {
            return Err(AppError::ValidationError(format!(
                "{} exceeds the {} byte limit",
                name, limit
            )));
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

/// Split a post form into its JSON fields and its files
pub(crate) async fn read_post_form<T: DeserializeOwned>(
    mut payload: Multipart,
    limits: &UploadConfig,
) -> Result<(Option<T>, Vec<IncomingFile>)> {
    let mut fields = None;
    let mut files = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        match filename {
            Some(filename) => {
                if files.len() >= limits.max_files_per_post {
                    return Err(AppError::ValidationError(format!(
                        "at most {} files per post",
                        limits.max_files_per_post
                    )));
                }
                let body = read_field(&mut field, limits.max_file_bytes, &filename).await?;
                files.push(IncomingFile {
                    filename,
                    content_type,
                    body,
                });
            }
            None if name == POST_FIELD => {
                let body = read_field(&mut field, MAX_JSON_FIELD_BYTES, &name).await?;
                let parsed = serde_json::from_slice(&body)
                    .map_err(|e| AppError::BadRequest(format!("Invalid post field: {}", e)))?;
                fields = Some(parsed);
            }
            None => {
                tracing::debug!(field = %name, "ignoring multipart field");
                read_field(&mut field, MAX_JSON_FIELD_BYTES, &name).await?;
            }
        }
    }

    Ok((fields, files))
}

/// Create a new post
/// POST /api/v1/posts
pub async fn create_post(
    service: web::Data<PostService>,
    session: Session,
    payload: Multipart,
) -> Result<HttpResponse> {
    let (draft, files) = read_post_form::<PostDraft>(payload, service.upload_limits()).await?;
    let draft = draft
        .ok_or_else(|| AppError::BadRequest(format!("missing \"{}\" field", POST_FIELD)))?;

    let result = run_detached(move |cancel| async move {
        service.create_post(&session, draft, files, &cancel).await
    })
    .await?;

    Ok(HttpResponse::Created().json(result))
}

/// Edit a post
/// PUT /api/v1/posts/{id}
pub async fn update_post(
    service: web::Data<PostService>,
    session: Session,
    path: web::Path<Uuid>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let (changes, files) =
        read_post_form::<PostChanges>(payload, service.upload_limits()).await?;
    let changes = changes.unwrap_or_default();

    let result = run_detached(move |cancel| async move {
        service
            .update_post(&session, post_id, changes, files, &cancel)
            .await
    })
    .await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Delete a post and its files
/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    service: web::Data<PostService>,
    session: Session,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let report = service.delete_post(&session, post_id).await?;

    Ok(HttpResponse::Ok().json(DeletePostResponse {
        id: post_id,
        deleted: true,
        storage_warning: report.failure_summary(),
        report,
    }))
}

/// Get a post by ID
/// GET /api/v1/posts/{id}
pub async fn get_post(
    service: web::Data<PostService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = service.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// List posts, newest first
/// GET /api/v1/posts?country=&location_id=&author_id=&limit=&offset=
pub async fn list_posts(
    service: web::Data<PostService>,
    query: web::Query<PostListQuery>,
) -> Result<HttpResponse> {
    let posts = service.list_posts(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(posts))
}
