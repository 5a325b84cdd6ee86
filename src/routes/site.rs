/**
 * Site Routes
 * Public read API: published posts, tags, search and site settings
 */
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{PostPage, PostSummary, PostView, SiteSettings, Tag};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Tag page: the tag and its published posts
#[derive(Debug, Serialize)]
pub struct TagPage {
    pub tag: Tag,
    pub posts: Vec<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<PostSummary>,
}

/// GET /api/posts?page=
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPage>, AppError> {
    Ok(Json(state.posts.list_public(query.page).await?))
}

/// GET /api/posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.get_published(id).await?))
}

/// GET /api/tags
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(state.posts.list_tags().await?))
}

/// GET /api/tags/{slug}
pub async fn get_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<TagPage>, AppError> {
    let (tag, posts) = state.posts.tag_by_slug(&slug).await?;
    Ok(Json(TagPage { tag, posts }))
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state.posts.search(&query.q).await?;
    Ok(Json(SearchResponse {
        query: query.q,
        results,
    }))
}

/// GET /api/settings
pub async fn settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, AppError> {
    Ok(Json(state.posts.settings().await?))
}
