/// Data models for journal-service
///
/// This module defines structures for:
/// - Post: a microblog entry with rich-text content and attached media
/// - Location: a (city, country) pair posts are filed under
/// - Place: a named spot inside a location
///
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::services::rich_text::{self, RichTextDocument};
use crate::services::storage_diff::DeleteReport;
use crate::services::upload::UploadProgress;

pub const MAX_TITLE_CHARS: usize = 200;

// ========================================
// Post Models
// ========================================

/// Post database entity
///
/// `content` is stored as JSONB and may hold legacy shapes written by older
/// clients; it is normalized on every read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: Value,
    pub location_id: Option<Uuid>,
    pub place_id: Option<Uuid>,
    pub country: Option<String>,
    pub file_keys: Vec<String>,
    pub generated_facts: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post row joined with location and place names
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostWithRefs {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: PostRow,
    pub city: Option<String>,
    pub place_name: Option<String>,
}

/// Post response DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: RichTextDocument,
    pub preview: String,
    pub location_id: Option<String>,
    pub place_id: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub place_name: Option<String>,
    pub file_keys: Vec<String>,
    pub file_urls: Vec<String>,
    pub generated_facts: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostResponse {
    /// Build the response, resolving public URLs with `public_url`
    pub fn from_row(row: PostWithRefs, public_url: impl Fn(&str) -> String) -> Self {
        let post = row.post;
        let content = rich_text::ensure_canonical_format(&post.content);
        // Preview from the stored value so legacy HTML bodies lose their tags.
        let preview = rich_text::preview(&post.content, rich_text::DEFAULT_PREVIEW_CHARS);
        let file_urls = post.file_keys.iter().map(|k| public_url(k)).collect();

        Self {
            id: post.id.to_string(),
            author_id: post.author_id.to_string(),
            title: post.title,
            content,
            preview,
            location_id: post.location_id.map(|id| id.to_string()),
            place_id: post.place_id.map(|id| id.to_string()),
            country: post.country,
            city: row.city,
            place_name: row.place_name,
            file_keys: post.file_keys,
            file_urls,
            generated_facts: post.generated_facts.unwrap_or_default(),
            created_at: post.created_at.timestamp(),
            updated_at: post.updated_at.timestamp(),
        }
    }
}

/// Fields of a post as submitted by the client (files travel separately)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    /// Canonical delta, JSON-encoded delta, HTML or plain text
    #[serde(default)]
    pub content: Value,
    pub location_id: Option<Uuid>,
    pub place_id: Option<Uuid>,
    #[serde(default)]
    pub generated_facts: Vec<String>,
}

/// Partial update of a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<Value>,
    /// Absent keeps the current place, `null` clears it
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub place_id: Option<Option<Uuid>>,
    /// Existing keys to keep, in display order. `None` keeps all of them.
    pub retained_file_keys: Option<Vec<String>>,
    pub generated_facts: Option<Vec<String>>,
}

/// Wraps a field that is present in the payload, so an explicit `null`
/// deserializes to `Some(None)` while a missing field stays `None`
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Values written by the repository on insert
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub content: RichTextDocument,
    pub location_id: Option<Uuid>,
    pub place_id: Option<Uuid>,
    pub country: Option<String>,
    pub file_keys: Vec<String>,
    pub generated_facts: Option<Vec<String>>,
}

/// Values written by the repository on update
#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub title: String,
    pub content: RichTextDocument,
    pub place_id: Option<Uuid>,
    pub file_keys: Vec<String>,
    pub generated_facts: Option<Vec<String>>,
}

/// Filters for listing posts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostListQuery {
    pub country: Option<String>,
    pub location_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PostListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Result of a create or update, including storage side effects
#[derive(Debug, Clone, Serialize)]
pub struct PostMutationResponse {
    pub post: PostResponse,
    pub upload_progress: UploadProgress,
    /// Present when some removed files could not be deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_report: Option<DeleteReport>,
}

pub fn validate_title(title: &str) -> Result<String, String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("title is required".to_string());
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(format!("title must be at most {} characters", MAX_TITLE_CHARS));
    }
    Ok(trimmed.to_string())
}

// ========================================
// Location / Place Models
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: Uuid,
    pub city: String,
    pub country: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Location {
    /// Case-insensitive (city, country) match
    pub fn matches(&self, city: &str, country: &str) -> bool {
        self.city.trim().to_lowercase() == city.trim().to_lowercase()
            && self.country.trim().to_lowercase() == country.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLocationRequest {
    pub city: String,
    pub country: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Place {
    pub id: Uuid,
    pub location_id: Uuid,
    pub place_name: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Place {
    /// Case-insensitive name match within the same location
    pub fn matches(&self, location_id: Uuid, place_name: &str) -> bool {
        self.location_id == location_id
            && self.place_name.trim().to_lowercase() == place_name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlaceRequest {
    pub location_id: Option<Uuid>,
    pub place_name: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceListQuery {
    pub location_id: Option<Uuid>,
}
