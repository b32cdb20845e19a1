/// Post repository - database operations for posts
use crate::models::{NewPost, PostListQuery, PostUpdate, PostWithRefs};
use sqlx::PgPool;
use uuid::Uuid;

const POST_COLUMNS: &str = r#"
    p.id, p.author_id, p.title, p.content, p.location_id, p.place_id, p.country,
    p.file_keys, p.generated_facts, p.created_at, p.updated_at,
    l.city AS city, pl.place_name AS place_name
"#;

/// Insert a post and return it joined with its location and place names
pub async fn insert_post(pool: &PgPool, post: &NewPost) -> Result<PostWithRefs, sqlx::Error> {
    let sql = format!(
        r#"
        WITH p AS (
            INSERT INTO posts (author_id, title, content, location_id, place_id, country,
                               file_keys, generated_facts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        )
        SELECT {POST_COLUMNS}
        FROM p
        LEFT JOIN locations l ON l.id = p.location_id
        LEFT JOIN places pl ON pl.id = p.place_id
        "#
    );

    sqlx::query_as::<_, PostWithRefs>(&sql)
        .bind(post.author_id)
        .bind(&post.title)
        .bind(post.content.to_value())
        .bind(post.location_id)
        .bind(post.place_id)
        .bind(&post.country)
        .bind(&post.file_keys)
        .bind(&post.generated_facts)
        .fetch_one(pool)
        .await
}

/// Find a post by ID
pub async fn find_post_by_id(
    pool: &PgPool,
    post_id: Uuid,
) -> Result<Option<PostWithRefs>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        LEFT JOIN locations l ON l.id = p.location_id
        LEFT JOIN places pl ON pl.id = p.place_id
        WHERE p.id = $1
        "#
    );

    sqlx::query_as::<_, PostWithRefs>(&sql)
        .bind(post_id)
        .fetch_optional(pool)
        .await
}

/// List posts newest first, optionally filtered by country, location or author
pub async fn list_posts(
    pool: &PgPool,
    query: &PostListQuery,
) -> Result<Vec<PostWithRefs>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        LEFT JOIN locations l ON l.id = p.location_id
        LEFT JOIN places pl ON pl.id = p.place_id
        WHERE ($1::text IS NULL OR lower(p.country) = lower($1))
          AND ($2::uuid IS NULL OR p.location_id = $2)
          AND ($3::uuid IS NULL OR p.author_id = $3)
        ORDER BY p.created_at DESC
        LIMIT $4 OFFSET $5
        "#
    );

    sqlx::query_as::<_, PostWithRefs>(&sql)
        .bind(&query.country)
        .bind(query.location_id)
        .bind(query.author_id)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await
}

/// Overwrite the editable fields of a post
pub async fn update_post(
    pool: &PgPool,
    post_id: Uuid,
    update: &PostUpdate,
) -> Result<Option<PostWithRefs>, sqlx::Error> {
    let sql = format!(
        r#"
        WITH p AS (
            UPDATE posts
            SET title = $2, content = $3, place_id = $4, file_keys = $5,
                generated_facts = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
        )
        SELECT {POST_COLUMNS}
        FROM p
        LEFT JOIN locations l ON l.id = p.location_id
        LEFT JOIN places pl ON pl.id = p.place_id
        "#
    );

    sqlx::query_as::<_, PostWithRefs>(&sql)
        .bind(post_id)
        .bind(&update.title)
        .bind(update.content.to_value())
        .bind(update.place_id)
        .bind(&update.file_keys)
        .bind(&update.generated_facts)
        .fetch_optional(pool)
        .await
}

/// Delete a post row; returns whether a row was removed
pub async fn delete_post(pool: &PgPool, post_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether any post other than `excluding_post` lists `key` among its files
pub async fn key_in_use(
    pool: &PgPool,
    key: &str,
    excluding_post: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM posts
            WHERE file_keys @> ARRAY[$1]::text[]
              AND ($2::uuid IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(key)
    .bind(excluding_post)
    .fetch_one(pool)
    .await
}
