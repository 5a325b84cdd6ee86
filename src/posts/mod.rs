//! Post Entity Manager
//! Owns post and tag records and keeps the rendered fields in step with the body.

pub mod fake;

use std::sync::Arc;

use regex::Regex;
use uuid::Uuid;

use crate::db::models::{
    NewPost, NewTag, Post, PostChanges, PostFilter, PostPage, PostSummary, PostView, SiteSettings,
    Tag, TagChanges,
};
use crate::db::Store;
use crate::error::{AppError, FieldError};

pub const MAX_PAGE_SIZE: i64 = 100;
pub const SEARCH_LIMIT: i64 = 50;

lazy_static::lazy_static! {
    /// Lowercase letters and digits in hyphen-separated runs
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Derive a url slug from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn require_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::invalid("title", "Title is required"));
    }
    Ok(title.to_string())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct PostManager {
    store: Arc<dyn Store>,
}

impl PostManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create(&self, input: NewPost) -> Result<PostView, AppError> {
        let title = require_title(&input.title)?;
        for tag_id in &input.tags {
            self.require_tag(*tag_id).await?;
        }

        let mut post = Post::new(title, blank_to_none(input.cover_image_url), &input.body);
        if let Some(published) = input.published {
            post.published = published;
        }
        self.store.insert_post(&post).await?;
        for tag_id in &input.tags {
            self.store.attach_tag(post.id, *tag_id).await?;
        }

        tracing::info!(post_id = %post.id, "Post created");
        self.view(post).await
    }

    pub async fn get(&self, id: Uuid) -> Result<PostView, AppError> {
        let post = self.require_post(id).await?;
        self.view(post).await
    }

    /// Like [`PostManager::get`], but drafts are not found.
    pub async fn get_published(&self, id: Uuid) -> Result<PostView, AppError> {
        let post = self.require_post(id).await?;
        if !post.published {
            return Err(AppError::NotFound("post"));
        }
        self.view(post).await
    }

    pub async fn list(&self, filter: PostFilter) -> Result<PostPage, AppError> {
        let filter = PostFilter {
            published: filter.published,
            page: filter.page.max(1),
            page_size: filter.page_size.clamp(1, MAX_PAGE_SIZE),
        };
        let (posts, total) = self.store.list_posts(filter).await?;
        Ok(PostPage {
            items: posts.iter().map(PostSummary::from).collect(),
            page: filter.page,
            page_size: filter.page_size,
            total,
        })
    }

    /// Published posts, paged by the site's `posts_per_page`.
    pub async fn list_public(&self, page: i64) -> Result<PostPage, AppError> {
        let settings = self.store.load_settings().await?;
        self.list(PostFilter {
            published: Some(true),
            page,
            page_size: i64::from(settings.posts_per_page),
        })
        .await
    }

    pub async fn update(&self, id: Uuid, changes: PostChanges) -> Result<PostView, AppError> {
        let mut post = self.require_post(id).await?;

        if let Some(title) = changes.title {
            post.title = require_title(&title)?;
        }
        if let Some(cover) = changes.cover_image_url {
            post.cover_image_url = blank_to_none(Some(cover));
        }
        if let Some(published) = changes.published {
            post.published = published;
        }
        match changes.body {
            Some(body) => post.set_body(&body),
            None => post.touch(),
        }

        self.save(&post).await?;
        tracing::info!(post_id = %post.id, "Post updated");
        self.view(post).await
    }

    /// Replace the body and persist it together with its rendered forms.
    pub async fn set_body(&self, id: Uuid, body: &str) -> Result<PostView, AppError> {
        let mut post = self.require_post(id).await?;
        post.set_body(body);
        self.save(&post).await?;
        tracing::debug!(post_id = %post.id, "Post body replaced");
        self.view(post).await
    }

    /// Body from raw request bytes; anything that is not UTF-8 is rejected
    /// and the stored post stays as it was.
    pub async fn set_body_bytes(&self, id: Uuid, body: &[u8]) -> Result<PostView, AppError> {
        let body = std::str::from_utf8(body).map_err(crate::content::ContentError::from)?;
        self.set_body(id, body).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_post(id).await? {
            return Err(AppError::NotFound("post"));
        }
        tracing::info!(post_id = %id, "Post deleted");
        Ok(())
    }

    pub async fn add_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<PostView, AppError> {
        let post = self.require_post(post_id).await?;
        self.require_tag(tag_id).await?;
        self.store.attach_tag(post_id, tag_id).await?;
        self.view(post).await
    }

    pub async fn remove_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<PostView, AppError> {
        let post = self.require_post(post_id).await?;
        self.require_tag(tag_id).await?;
        self.store.detach_tag(post_id, tag_id).await?;
        self.view(post).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<PostSummary>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.store.search_posts(query, SEARCH_LIMIT).await?;
        Ok(hits.iter().map(PostSummary::from).collect())
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub async fn create_tag(&self, input: NewTag) -> Result<Tag, AppError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("name", "Name is required"));
        }
        let url_slug = match blank_to_none(input.url_slug) {
            Some(slug) => slug,
            None => slugify(&name),
        };
        validate_slug(&url_slug)?;

        let tag = Tag {
            id: Uuid::new_v4(),
            cover_image_url: blank_to_none(input.cover_image_url),
            name,
            url_slug,
        };
        self.store.insert_tag(&tag).await?;
        tracing::info!(tag_id = %tag.id, slug = %tag.url_slug, "Tag created");
        Ok(tag)
    }

    pub async fn update_tag(&self, id: Uuid, changes: TagChanges) -> Result<Tag, AppError> {
        let mut tag = self.require_tag(id).await?;
        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::invalid("name", "Name is required"));
            }
            tag.name = name;
        }
        if let Some(slug) = changes.url_slug {
            let slug = slug.trim().to_string();
            validate_slug(&slug)?;
            tag.url_slug = slug;
        }
        if let Some(cover) = changes.cover_image_url {
            tag.cover_image_url = blank_to_none(Some(cover));
        }

        if !self.store.update_tag(&tag).await? {
            return Err(AppError::NotFound("tag"));
        }
        Ok(tag)
    }

    pub async fn delete_tag(&self, id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_tag(id).await? {
            return Err(AppError::NotFound("tag"));
        }
        tracing::info!(tag_id = %id, "Tag deleted");
        Ok(())
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        Ok(self.store.list_tags().await?)
    }

    /// Tag plus the published posts carrying it.
    pub async fn tag_by_slug(&self, slug: &str) -> Result<(Tag, Vec<PostSummary>), AppError> {
        let tag = self
            .store
            .get_tag_by_slug(slug)
            .await?
            .ok_or(AppError::NotFound("tag"))?;
        let posts = self.store.posts_for_tag(tag.id, true).await?;
        Ok((tag, posts.iter().map(PostSummary::from).collect()))
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn settings(&self) -> Result<SiteSettings, AppError> {
        Ok(self.store.load_settings().await?)
    }

    pub async fn save_settings(&self, settings: SiteSettings) -> Result<SiteSettings, AppError> {
        let mut fields = Vec::new();
        if settings.title.trim().is_empty() {
            fields.push(FieldError::new("title", "Title is required"));
        }
        if !(1..=MAX_PAGE_SIZE as i32).contains(&settings.posts_per_page) {
            fields.push(FieldError::new(
                "postsPerPage",
                format!("Posts per page must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        if !fields.is_empty() {
            return Err(AppError::Validation(fields));
        }

        self.store.save_settings(&settings).await?;
        tracing::info!("Site settings saved");
        Ok(settings)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn require_post(&self, id: Uuid) -> Result<Post, AppError> {
        self.store
            .get_post(id)
            .await?
            .ok_or(AppError::NotFound("post"))
    }

    async fn require_tag(&self, id: Uuid) -> Result<Tag, AppError> {
        self.store
            .get_tag(id)
            .await?
            .ok_or(AppError::NotFound("tag"))
    }

    async fn save(&self, post: &Post) -> Result<(), AppError> {
        if !self.store.update_post(post).await? {
            return Err(AppError::NotFound("post"));
        }
        Ok(())
    }

    async fn view(&self, post: Post) -> Result<PostView, AppError> {
        let tags = self.store.tags_for_post(post.id).await?;
        Ok(PostView { post, tags })
    }
}

fn validate_slug(slug: &str) -> Result<(), AppError> {
    if !is_valid_slug(slug) {
        return Err(AppError::invalid(
            "urlSlug",
            "Slug must contain only lowercase letters, numbers, and hyphens",
        ));
    }
    Ok(())
}
