//! Database Models - records for users, posts, tags and site settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::content;

/// Administrator account. The password hash never leaves the crate.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub(crate) password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Blog post. `body_html` and `excerpt` are derived from `body` and only
/// change through [`Post::set_body`].
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub cover_image_url: Option<String>,
    body: String,
    body_html: String,
    excerpt: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(title: impl Into<String>, cover_image_url: Option<String>, body: &str) -> Self {
        let now = Utc::now();
        let rendered = content::render(body);
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            cover_image_url,
            body: body.to_string(),
            body_html: rendered.body_html,
            excerpt: rendered.excerpt,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the raw body and recompute both derived fields from it.
    pub fn set_body(&mut self, body: &str) {
        let rendered = content::render(body);
        self.body = body.to_string();
        self.body_html = rendered.body_html;
        self.excerpt = rendered.excerpt;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn body_html(&self) -> &str {
        &self.body_html
    }

    pub fn excerpt(&self) -> &str {
        &self.excerpt
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub cover_image_url: Option<String>,
    pub name: String,
    pub url_slug: String,
}

/// Singleton row of blog-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
    pub posts_per_page: i32,
    pub author_bio: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            title: "Let's face reality, loyalty to an ideal.".to_string(),
            description: "Notes, essays and experiments".to_string(),
            cover_image_url: String::new(),
            posts_per_page: 5,
            author_bio: String::new(),
        }
    }
}

/// Post plus its tags, as returned by the read APIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

/// Listing entry without the body fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub cover_image_url: Option<String>,
    pub excerpt: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            cover_image_url: post.cover_image_url.clone(),
            excerpt: post.excerpt.clone(),
            published: post.published,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Paginated listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub items: Vec<PostSummary>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Listing filter; `page` is 1-based.
#[derive(Debug, Clone, Copy)]
pub struct PostFilter {
    pub published: Option<bool>,
    pub page: i64,
    pub page_size: i64,
}

impl PostFilter {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.page_size
    }
}

/// Request body for creating a post.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub body: String,
    pub published: Option<bool>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
}

/// Partial post update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChanges {
    pub title: Option<String>,
    pub cover_image_url: Option<String>,
    pub body: Option<String>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
    pub name: String,
    pub url_slug: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagChanges {
    pub name: Option<String>,
    pub url_slug: Option<String>,
    pub cover_image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_post_renders_derived_fields() {
        let post = Post::new("Hello", None, "# Hi [link](http://x.com)");
        assert!(post.body_html().contains("<h1>"));
        assert!(post.excerpt().ends_with("..."));
        assert!(post.published);
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn test_set_body_recomputes_and_touches() {
        let mut post = Post::new("Hello", None, "first");
        let before = post.updated_at;
        post.set_body("**second**");
        assert_eq!(post.body(), "**second**");
        assert!(post.body_html().contains("<strong>second</strong>"));
        assert!(post.excerpt().starts_with("second"));
        assert!(post.excerpt().ends_with("..."));
        assert!(post.updated_at >= before);
    }

    #[test]
    fn test_serialized_user_hides_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_filter_offset() {
        let filter = PostFilter {
            published: None,
            page: 3,
            page_size: 10,
        };
        assert_eq!(filter.offset(), 20);
    }
}
