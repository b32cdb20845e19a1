/// Standalone media upload
///
/// Used by the rich-text editor for inline images. The stored object is not
/// recorded on any post, so it is never deleted by post edits.
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use crate::error::{AppError, Result};
use crate::handlers::posts::{read_post_form, run_detached};
use crate::middleware::Session;
use crate::services::PostService;

/// Upload exactly one file
/// POST /api/v1/media
pub async fn upload_media(
    service: web::Data<PostService>,
    session: Session,
    payload: Multipart,
) -> Result<HttpResponse> {
    let (_, mut files) =
        read_post_form::<serde_json::Value>(payload, service.upload_limits()).await?;
    if files.len() != 1 {
        return Err(AppError::ValidationError(format!(
            "expected exactly one file, got {}",
            files.len()
        )));
    }
    let file = files.remove(0);

    let uploaded = run_detached(move |cancel| async move {
        service.upload_media(&session, file, &cancel).await
    })
    .await?;

    Ok(HttpResponse::Created().json(uploaded))
}
