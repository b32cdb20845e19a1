/// Location and place repository
///
/// Names are matched case-insensitively; the unique indexes in the migration
/// use the same `lower()` expressions so concurrent inserts cannot duplicate.
use crate::models::{Location, Place};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn find_location_by_name(
    pool: &PgPool,
    city: &str,
    country: &str,
) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(
        r#"
        SELECT id, city, country, photo_url, created_at
        FROM locations
        WHERE lower(city) = lower($1) AND lower(country) = lower($2)
        "#,
    )
    .bind(city.trim())
    .bind(country.trim())
    .fetch_optional(pool)
    .await
}

pub async fn find_location_by_id(
    pool: &PgPool,
    location_id: Uuid,
) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(
        "SELECT id, city, country, photo_url, created_at FROM locations WHERE id = $1",
    )
    .bind(location_id)
    .fetch_optional(pool)
    .await
}

/// Insert a location; `None` when a case-insensitive duplicate already exists
pub async fn insert_location(
    pool: &PgPool,
    city: &str,
    country: &str,
    photo_url: Option<&str>,
) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(
        r#"
        INSERT INTO locations (city, country, photo_url)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING id, city, country, photo_url, created_at
        "#,
    )
    .bind(city.trim())
    .bind(country.trim())
    .bind(photo_url)
    .fetch_optional(pool)
    .await
}

pub async fn list_locations(pool: &PgPool) -> Result<Vec<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(
        "SELECT id, city, country, photo_url, created_at FROM locations ORDER BY country, city",
    )
    .fetch_all(pool)
    .await
}

pub async fn find_place_by_id(
    pool: &PgPool,
    place_id: Uuid,
) -> Result<Option<Place>, sqlx::Error> {
    sqlx::query_as::<_, Place>(
        "SELECT id, location_id, place_name, photo_url, created_at FROM places WHERE id = $1",
    )
    .bind(place_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_place_by_name(
    pool: &PgPool,
    location_id: Uuid,
    place_name: &str,
) -> Result<Option<Place>, sqlx::Error> {
    sqlx::query_as::<_, Place>(
        r#"
        SELECT id, location_id, place_name, photo_url, created_at
        FROM places
        WHERE location_id = $1 AND lower(place_name) = lower($2)
        "#,
    )
    .bind(location_id)
    .bind(place_name.trim())
    .fetch_optional(pool)
    .await
}

/// Insert a place; `None` when the location already has it
pub async fn insert_place(
    pool: &PgPool,
    location_id: Uuid,
    place_name: &str,
    photo_url: Option<&str>,
) -> Result<Option<Place>, sqlx::Error> {
    sqlx::query_as::<_, Place>(
        r#"
        INSERT INTO places (location_id, place_name, photo_url)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING id, location_id, place_name, photo_url, created_at
        "#,
    )
    .bind(location_id)
    .bind(place_name.trim())
    .bind(photo_url)
    .fetch_optional(pool)
    .await
}

pub async fn list_places(
    pool: &PgPool,
    location_id: Option<Uuid>,
) -> Result<Vec<Place>, sqlx::Error> {
    sqlx::query_as::<_, Place>(
        r#"
        SELECT id, location_id, place_name, photo_url, created_at
        FROM places
        WHERE ($1::uuid IS NULL OR location_id = $1)
        ORDER BY place_name
        "#,
    )
    .bind(location_id)
    .fetch_all(pool)
    .await
}
