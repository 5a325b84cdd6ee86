//! In-process store used when no database is configured, and by tests.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Post, PostFilter, SiteSettings, Tag, User};
use super::{Store, StoreError};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, Post>,
    tags: HashMap<Uuid, Tag>,
    post_tags: BTreeSet<(Uuid, Uuid)>,
    settings: Option<SiteSettings>,
}

/// All tables live behind one lock, so each write is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        let _tables = self.tables.read().await;
        Ok(start.elapsed())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user_password(&self, user: &User) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                existing.password_hash = user.password_hash.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .posts
            .insert(post.id, post.clone());
        Ok(())
    }

    async fn update_post(&self, post: &Post) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.posts.get_mut(&post.id) {
            Some(existing) => {
                *existing = post.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<(Vec<Post>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| filter.published.map_or(true, |wanted| p.published == wanted))
            .cloned()
            .collect();
        newest_first(&mut posts);
        let total = posts.len() as i64;
        let page = posts
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn search_posts(&self, query: &str, limit: i64) -> Result<Vec<Post>, StoreError> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;
        let mut hits: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| p.published)
            .filter(|p| {
                p.title.to_lowercase().contains(&needle) || p.body().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        newest_first(&mut hits);
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.post_tags.retain(|(post_id, _)| *post_id != id);
        Ok(tables.posts.remove(&id).is_some())
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tags.values().any(|t| t.url_slug == tag.url_slug) {
            return Err(StoreError::Conflict("Slug already exists".to_string()));
        }
        tables.tags.insert(tag.id, tag.clone());
        Ok(())
    }

    async fn update_tag(&self, tag: &Tag) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .tags
            .values()
            .any(|t| t.id != tag.id && t.url_slug == tag.url_slug)
        {
            return Err(StoreError::Conflict("Slug already exists".to_string()));
        }
        match tables.tags.get_mut(&tag.id) {
            Some(existing) => {
                *existing = tag.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, StoreError> {
        Ok(self.tables.read().await.tags.get(&id).cloned())
    }

    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.tags.values().find(|t| t.url_slug == slug).cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut tags: Vec<Tag> = self.tables.read().await.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn delete_tag(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.post_tags.retain(|(_, tag_id)| *tag_id != id);
        Ok(tables.tags.remove(&id).is_some())
    }

    async fn attach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<(), StoreError> {
        self.tables.write().await.post_tags.insert((post_id, tag_id));
        Ok(())
    }

    async fn detach_tag(&self, post_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .write()
            .await
            .post_tags
            .remove(&(post_id, tag_id)))
    }

    async fn tags_for_post(&self, post_id: Uuid) -> Result<Vec<Tag>, StoreError> {
        let tables = self.tables.read().await;
        let mut tags: Vec<Tag> = tables
            .post_tags
            .iter()
            .filter(|(p, _)| *p == post_id)
            .filter_map(|(_, t)| tables.tags.get(t).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn posts_for_tag(
        &self,
        tag_id: Uuid,
        published_only: bool,
    ) -> Result<Vec<Post>, StoreError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .post_tags
            .iter()
            .filter(|(_, t)| *t == tag_id)
            .filter_map(|(p, _)| tables.posts.get(p))
            .filter(|p| !published_only || p.published)
            .cloned()
            .collect();
        newest_first(&mut posts);
        Ok(posts)
    }

    async fn load_settings(&self) -> Result<SiteSettings, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .settings
            .clone()
            .unwrap_or_default())
    }

    async fn save_settings(&self, settings: &SiteSettings) -> Result<(), StoreError> {
        self.tables.write().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn tag(slug: &str) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            cover_image_url: None,
            name: slug.to_string(),
            url_slug: slug.to_string(),
        }
    }

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_user(&user("admin@example.com")).await.unwrap();
        let err = store
            .insert_user(&user("ADMIN@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let store = MemoryStore::new();
        store.insert_user(&user("admin@example.com")).await.unwrap();
        let found = store.find_user_by_email("Admin@Example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_tag(&tag("rust")).await.unwrap();
        assert!(matches!(
            store.insert_tag(&tag("rust")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_association_is_a_set() {
        let store = MemoryStore::new();
        let post = Post::new("p", None, "body");
        let rust = tag("rust");
        store.insert_post(&post).await.unwrap();
        store.insert_tag(&rust).await.unwrap();
        store.attach_tag(post.id, rust.id).await.unwrap();
        store.attach_tag(post.id, rust.id).await.unwrap();
        assert_eq!(store.tags_for_post(post.id).await.unwrap().len(), 1);
        assert!(store.detach_tag(post.id, rust.id).await.unwrap());
        assert!(!store.detach_tag(post.id, rust.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_post_drops_associations() {
        let store = MemoryStore::new();
        let post = Post::new("p", None, "body");
        let rust = tag("rust");
        store.insert_post(&post).await.unwrap();
        store.insert_tag(&rust).await.unwrap();
        store.attach_tag(post.id, rust.id).await.unwrap();
        assert!(store.delete_post(post.id).await.unwrap());
        assert!(store.posts_for_tag(rust.id, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let store = MemoryStore::new();
        for days in 0..5 {
            let mut post = Post::new(format!("post {days}"), None, "body");
            post.created_at = Utc::now() - ChronoDuration::days(days);
            store.insert_post(&post).await.unwrap();
        }
        let (page, total) = store
            .list_posts(PostFilter {
                published: None,
                page: 2,
                page_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(total, 5);
        let titles: Vec<_> = page.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["post 2", "post 3"]);
    }

    #[tokio::test]
    async fn test_search_only_hits_published() {
        let store = MemoryStore::new();
        let visible = Post::new("Rust notes", None, "ownership");
        let mut hidden = Post::new("Rust draft", None, "borrowing");
        hidden.published = false;
        store.insert_post(&visible).await.unwrap();
        store.insert_post(&hidden).await.unwrap();
        let hits = store.search_posts("rust", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, visible.id);
    }

    #[tokio::test]
    async fn test_settings_default_until_saved() {
        let store = MemoryStore::new();
        assert_eq!(store.load_settings().await.unwrap(), SiteSettings::default());
        let custom = SiteSettings {
            posts_per_page: 9,
            ..SiteSettings::default()
        };
        store.save_settings(&custom).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap().posts_per_page, 9);
    }
}
