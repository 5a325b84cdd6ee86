use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use super::models::{Post, PostFilter, SiteSettings, Tag, User};
use super::{like_pattern, DbConfig, Store, StoreError};

const POST_COLUMNS: &str = "id, title, cover_image_url, body, body_html, excerpt, published, created_at, updated_at";
const TAG_COLUMNS: &str = "id, cover_image_url, name, url_slug";
const USER_COLUMNS: &str = "id, email, password_hash, created_at";

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        tracing::info!("Initializing database connection pool...");
        tracing::debug!("Database URL: {}", config.redacted_url());

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::info!("Database connection pool initialized successfully");

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_lower ON users (LOWER(email))",
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                cover_image_url TEXT,
                body TEXT NOT NULL DEFAULT '',
                body_html TEXT NOT NULL DEFAULT '',
                excerpt TEXT NOT NULL DEFAULT '',
                published BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_posts_published ON posts (published)",
            "CREATE INDEX IF NOT EXISTS idx_posts_pub_created ON posts (published, created_at DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id UUID PRIMARY KEY,
                cover_image_url TEXT,
                name TEXT NOT NULL,
                url_slug TEXT NOT NULL
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_url_slug ON tags (url_slug)",
            r#"
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                tag_id UUID NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, tag_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags (tag_id)",
            r#"
            CREATE TABLE IF NOT EXISTS site_settings (
                id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                cover_image_url TEXT NOT NULL,
                posts_per_page INTEGER NOT NULL,
                author_bio TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }
}

fn conflict_or(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(start.elapsed())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "Email already registered"))?;
        Ok(())
    }

    async fn update_user_password(&self, user: &User) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&user.password_hash)
            .bind(user.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, title, cover_image_url, body, body_html, excerpt, published, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.cover_image_url)
        .bind(post.body())
        .bind(post.body_html())
        .bind(post.excerpt())
        .bind(post.published)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_post(&self, post: &Post) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = $2, cover_image_url = $3, body = $4, body_html = $5, excerpt = $6,
                published = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.cover_image_url)
        .bind(post.body())
        .bind(post.body_html())
        .bind(post.excerpt())
        .bind(post.published)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<(Vec<Post>, i64), StoreError> {
        // NULL filter matches every row
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS} FROM posts
            WHERE ($1::BOOLEAN IS NULL OR published = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(filter.published)
            .bind(filter.page_size)
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts WHERE ($1::BOOLEAN IS NULL OR published = $1)",
        )
        .bind(filter.published)
        .fetch_one(&self.pool)
        .await?;

        Ok((posts, total.0))
    }

    async fn search_posts(&self, query: &str, limit: i64) -> Result<Vec<Post>, StoreError> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS} FROM posts
            WHERE published AND (title ILIKE $1 OR body ILIKE $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(like_pattern(query))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tags (id, cover_image_url, name, url_slug) VALUES ($1, $2, $3, $4)")
            .bind(tag.id)
            .bind(&tag.cover_image_url)
            .bind(&tag.name)
            .bind(&tag.url_slug)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "Slug already exists"))?;
        Ok(())
    }

    async fn update_tag(&self, tag: &Tag) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tags SET cover_image_url = $2, name = $3, url_slug = $4 WHERE id = $1",
        )
        .bind(tag.id)
        .bind(&tag.cover_image_url)
        .bind(&tag.name)
        .bind(&tag.url_slug)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "Slug already exists"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, StoreError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = $1");
        Ok(sqlx::query_as::<_, Tag>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, StoreError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE url_slug = $1");
        Ok(sqlx::query_as::<_, Tag>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY name");
        Ok(sqlx::query_as::<_, Tag>(&sql).fetch_all(&self.pool).await?)
    }

    async fn delete_tag(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn detach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM post_tags WHERE post_id = $1 AND tag_id = $2")
            .bind(post_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tags_for_post(&self, post_id: Uuid) -> Result<Vec<Tag>, StoreError> {
        Ok(sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.cover_image_url, t.name, t.url_slug
            FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn posts_for_tag(
        &self,
        tag_id: Uuid,
        published_only: bool,
    ) -> Result<Vec<Post>, StoreError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.title, p.cover_image_url, p.body, p.body_html, p.excerpt,
                   p.published, p.created_at, p.updated_at
            FROM posts p
            JOIN post_tags pt ON pt.post_id = p.id
            WHERE pt.tag_id = $1 AND (NOT $2 OR p.published)
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(tag_id)
        .bind(published_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn load_settings(&self) -> Result<SiteSettings, StoreError> {
        let row = sqlx::query_as::<_, SiteSettings>(
            "SELECT title, description, cover_image_url, posts_per_page, author_bio FROM site_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or_default())
    }

    async fn save_settings(&self, settings: &SiteSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO site_settings (id, title, description, cover_image_url, posts_per_page, author_bio)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                cover_image_url = EXCLUDED.cover_image_url,
                posts_per_page = EXCLUDED.posts_per_page,
                author_bio = EXCLUDED.author_bio
            "#,
        )
        .bind(&settings.title)
        .bind(&settings.description)
        .bind(&settings.cover_image_url)
        .bind(settings.posts_per_page)
        .bind(&settings.author_bio)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) {
        tracing::info!("Closing database connection pool");
        self.pool.close().await;
    }
}
