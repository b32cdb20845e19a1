//! Database access
//!
//! Repositories are plain functions over a `PgPool`. Services depend on the
//! [`PostStore`] and [`CatalogStore`] traits so their workflows can be tested
//! without Postgres.

pub mod location_repo;
pub mod post_repo;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Location, NewPost, Place, PostListQuery, PostUpdate, PostWithRefs};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: NewPost) -> Result<PostWithRefs>;
    async fn find(&self, post_id: Uuid) -> Result<Option<PostWithRefs>>;
    async fn list(&self, query: PostListQuery) -> Result<Vec<PostWithRefs>>;
    async fn update(&self, post_id: Uuid, update: PostUpdate) -> Result<Option<PostWithRefs>>;
    async fn delete(&self, post_id: Uuid) -> Result<bool>;
    /// Whether a post other than `excluding_post` still references `key`
    async fn key_in_use(&self, key: String, excluding_post: Option<Uuid>) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_location(&self, city: String, country: String) -> Result<Option<Location>>;
    async fn get_location(&self, location_id: Uuid) -> Result<Option<Location>>;
    async fn insert_location(
        &self,
        city: String,
        country: String,
        photo_url: Option<String>,
    ) -> Result<Option<Location>>;
    async fn list_locations(&self) -> Result<Vec<Location>>;
    async fn get_place(&self, place_id: Uuid) -> Result<Option<Place>>;
    async fn find_place(&self, location_id: Uuid, place_name: String) -> Result<Option<Place>>;
    async fn insert_place(
        &self,
        location_id: Uuid,
        place_name: String,
        photo_url: Option<String>,
    ) -> Result<Option<Place>>;
    async fn list_places(&self, location_id: Option<Uuid>) -> Result<Vec<Place>>;
}

/// Postgres-backed stores
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn insert(&self, post: NewPost) -> Result<PostWithRefs> {
        Ok(post_repo::insert_post(&self.pool, &post).await?)
    }

    async fn find(&self, post_id: Uuid) -> Result<Option<PostWithRefs>> {
        Ok(post_repo::find_post_by_id(&self.pool, post_id).await?)
    }

    async fn list(&self, query: PostListQuery) -> Result<Vec<PostWithRefs>> {
        Ok(post_repo::list_posts(&self.pool, &query).await?)
    }

    async fn update(&self, post_id: Uuid, update: PostUpdate) -> Result<Option<PostWithRefs>> {
        Ok(post_repo::update_post(&self.pool, post_id, &update).await?)
    }

    async fn delete(&self, post_id: Uuid) -> Result<bool> {
        Ok(post_repo::delete_post(&self.pool, post_id).await?)
    }

    async fn key_in_use(&self, key: String, excluding_post: Option<Uuid>) -> Result<bool> {
        Ok(post_repo::key_in_use(&self.pool, &key, excluding_post).await?)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_location(&self, city: String, country: String) -> Result<Option<Location>> {
        Ok(location_repo::find_location_by_name(&self.pool, &city, &country).await?)
    }

    async fn get_location(&self, location_id: Uuid) -> Result<Option<Location>> {
        Ok(location_repo::find_location_by_id(&self.pool, location_id).await?)
    }

    async fn insert_location(
        &self,
        city: String,
        country: String,
        photo_url: Option<String>,
    ) -> Result<Option<Location>> {
        Ok(
            location_repo::insert_location(&self.pool, &city, &country, photo_url.as_deref())
                .await?,
        )
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        Ok(location_repo::list_locations(&self.pool).await?)
    }

    async fn get_place(&self, place_id: Uuid) -> Result<Option<Place>> {
        Ok(location_repo::find_place_by_id(&self.pool, place_id).await?)
    }

    async fn find_place(&self, location_id: Uuid, place_name: String) -> Result<Option<Place>> {
        Ok(location_repo::find_place_by_name(&self.pool, location_id, &place_name).await?)
    }

    async fn insert_place(
        &self,
        location_id: Uuid,
        place_name: String,
        photo_url: Option<String>,
    ) -> Result<Option<Place>> {
        Ok(
            location_repo::insert_place(&self.pool, location_id, &place_name, photo_url.as_deref())
                .await?,
        )
    }

    async fn list_places(&self, location_id: Option<Uuid>) -> Result<Vec<Place>> {
        Ok(location_repo::list_places(&self.pool, location_id).await?)
    }
}
