/**
 * Post Routes
 * Admin CRUD for posts, tags and their associations (session required)
 */
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::{
    NewPost, NewTag, PostChanges, PostFilter, PostPage, PostView, Tag, TagChanges,
};
use crate::error::AppError;
use crate::routes::{CurrentAdmin, SuccessResponse};
use crate::AppState;

/// Query parameters for GET /admin/posts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub published: Option<bool>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

// ============================================================================
// Posts
// ============================================================================

/// GET /admin/posts - drafts included
pub async fn list_posts(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PostPage>, AppError> {
    let page = state
        .posts
        .list(PostFilter {
            published: query.published,
            page: query.page,
            page_size: query.page_size,
        })
        .await?;
    Ok(Json(page))
}

/// POST /admin/posts
pub async fn create_post(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Json(payload): Json<NewPost>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.posts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /admin/posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.get(id).await?))
}

/// PATCH /admin/posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostChanges>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.update(id, payload).await?))
}

/// PUT /admin/posts/{id}/body - raw markdown as the request body
pub async fn replace_body(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.set_body_bytes(id, &body).await?))
}

/// DELETE /admin/posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.posts.delete(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// PUT /admin/posts/{id}/tags/{tag_id}
pub async fn add_tag(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.add_tag(id, tag_id).await?))
}

/// DELETE /admin/posts/{id}/tags/{tag_id}
pub async fn remove_tag(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.remove_tag(id, tag_id).await?))
}

// ============================================================================
// Tags
// ============================================================================

/// POST /admin/tags
pub async fn create_tag(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Json(payload): Json<NewTag>,
) -> Result<impl IntoResponse, AppError> {
    let tag = state.posts.create_tag(payload).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// PATCH /admin/tags/{id}
pub async fn update_tag(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<TagChanges>,
) -> Result<Json<Tag>, AppError> {
    Ok(Json(state.posts.update_tag(id, payload).await?))
}

/// DELETE /admin/tags/{id}
pub async fn delete_tag(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.posts.delete_tag(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{session_cookie, Fingerprint};
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request};
    use axum::Router;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const AGENT: &str = "test-agent";

    /// Router plus a session cookie for a signed-in admin.
    async fn signed_in() -> (Router, String) {
        let state = AppState::in_memory(AppConfig::for_tests());
        state
            .auth
            .register_admin("admin@example.com", "s3cret-pass")
            .await
            .unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        let outcome = state
            .auth
            .login(
                "admin@example.com",
                "s3cret-pass",
                Fingerprint::new(Some(addr.ip()), Some(AGENT)),
                None,
            )
            .await
            .unwrap();
        let cookie = session_cookie(&outcome.token, false);
        (crate::create_app(state).layer(axum::Extension(ConnectInfo(addr))), cookie)
    }

    fn request(method: &str, uri: &str, cookie: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie.split(';').next().unwrap())
            .header(header::USER_AGENT, AGENT)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, cookie: &str, body: serde_json::Value) -> serde_json::Value {
        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/admin/posts",
                cookie,
                Body::from(body.to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        json(res).await
    }

    #[tokio::test]
    async fn test_create_post_renders_body() {
        let (app, cookie) = signed_in().await;
        let post = create(
            &app,
            &cookie,
            serde_json::json!({"title": "Hello", "body": "# Hi [link](http://x.com)"}),
        )
        .await;
        let html = post["bodyHtml"].as_str().unwrap();
        assert!(html.contains("<h1>"));
        assert!(html.contains(r#"href="http://x.com""#));
        assert!(post["excerpt"].as_str().unwrap().ends_with("..."));
        assert_eq!(post["published"], true);
    }

    #[tokio::test]
    async fn test_create_without_title_is_bad_request() {
        let (app, cookie) = signed_in().await;
        let res = app
            .oneshot(request(
                "POST",
                "/admin/posts",
                &cookie,
                Body::from(r#"{"title": ""}"#),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json(res).await;
        assert_eq!(body["fields"][0]["field"], "title");
    }

    #[tokio::test]
    async fn test_replace_body_with_invalid_utf8() {
        let (app, cookie) = signed_in().await;
        let post = create(&app, &cookie, serde_json::json!({"title": "Hello"})).await;
        let uri = format!("/admin/posts/{}/body", post["id"].as_str().unwrap());

        let res = app
            .clone()
            .oneshot(request("PUT", &uri, &cookie, Body::from(vec![0xc3, 0x28])))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(request("PUT", &uri, &cookie, Body::from("*new*")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(json(res).await["bodyHtml"]
            .as_str()
            .unwrap()
            .contains("<em>new</em>"));
    }

    #[tokio::test]
    async fn test_tag_attach_and_detach() {
        let (app, cookie) = signed_in().await;
        let post = create(&app, &cookie, serde_json::json!({"title": "Hello"})).await;

        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/admin/tags",
                &cookie,
                Body::from(r#"{"name": "Rust Lang"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let tag = json(res).await;
        assert_eq!(tag["urlSlug"], "rust-lang");

        let uri = format!(
            "/admin/posts/{}/tags/{}",
            post["id"].as_str().unwrap(),
            tag["id"].as_str().unwrap()
        );
        let res = app
            .clone()
            .oneshot(request("PUT", &uri, &cookie, Body::empty()))
            .await
            .unwrap();
        assert_eq!(json(res).await["tags"].as_array().unwrap().len(), 1);

        let res = app
            .oneshot(request("DELETE", &uri, &cookie, Body::empty()))
            .await
            .unwrap();
        assert!(json(res).await["tags"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_post_is_not_found() {
        let (app, cookie) = signed_in().await;
        let uri = format!("/admin/posts/{}", Uuid::new_v4());
        let res = app
            .oneshot(request("DELETE", &uri, &cookie, Body::empty()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_other_client_with_stolen_cookie_is_redirected() {
        let (app, cookie) = signed_in().await;
        let req = Request::get("/admin/posts")
            .header(header::COOKIE, cookie.split(';').next().unwrap())
            .header(header::USER_AGENT, "curl/8.0")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert!(res.status().is_redirection());

        // the session is gone for the original client as well
        let res = app
            .oneshot(request("GET", "/admin/posts", &cookie, Body::empty()))
            .await
            .unwrap();
        assert!(res.status().is_redirection());
    }
}
