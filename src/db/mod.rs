pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use self::models::{Post, PostFilter, SiteSettings, Tag, User};

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Unique constraint (email, tag slug) violated.
    #[error("{0}")]
    Conflict(String),
}

/// Pool settings, read from the environment with the same fallbacks as the
/// rest of the configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DbConfig {
    pub fn from_env(url: String) -> Self {
        Self {
            url,
            max_connections: env_parse("DB_POOL_MAX").unwrap_or(10),
            min_connections: env_parse("DB_POOL_MIN").unwrap_or(1),
            connect_timeout_secs: env_parse("DB_CONNECT_TIMEOUT").unwrap_or(10),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT").unwrap_or(300),
        }
    }

    /// Connection string with credentials masked, for logs.
    pub fn redacted_url(&self) -> String {
        match self.url.rsplit_once('@') {
            Some((prefix, host)) => {
                let scheme = prefix.split_once("://").map_or("", |(s, _)| s);
                format!("{}://***@{}", scheme, host)
            }
            None => self.url.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Record store behind the post manager and the auth gate.
///
/// Every post write replaces the whole row in one statement, so readers never
/// see `body` without its matching `body_html`/`excerpt`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip latency of a trivial query.
    async fn ping(&self) -> Result<std::time::Duration, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn update_user_password(&self, user: &User) -> Result<bool, StoreError>;

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError>;
    async fn update_post(&self, post: &Post) -> Result<bool, StoreError>;
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError>;
    /// Newest first, with the total count matching the filter.
    async fn list_posts(&self, filter: PostFilter) -> Result<(Vec<Post>, i64), StoreError>;
    async fn search_posts(&self, query: &str, limit: i64) -> Result<Vec<Post>, StoreError>;
    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_tag(&self, tag: &Tag) -> Result<(), StoreError>;
    async fn update_tag(&self, tag: &Tag) -> Result<bool, StoreError>;
    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, StoreError>;
    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, StoreError>;
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;
    async fn delete_tag(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Idempotent: attaching an already attached tag is a no-op.
    async fn attach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<(), StoreError>;
    async fn detach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError>;
    async fn tags_for_post(&self, post_id: Uuid) -> Result<Vec<Tag>, StoreError>;
    async fn posts_for_tag(&self, tag_id: Uuid, published_only: bool)
        -> Result<Vec<Post>, StoreError>;

    /// Stored settings, or the defaults when none were saved yet.
    async fn load_settings(&self) -> Result<SiteSettings, StoreError>;
    async fn save_settings(&self, settings: &SiteSettings) -> Result<(), StoreError>;

    async fn close(&self);
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
