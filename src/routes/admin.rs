/**
 * Admin Routes
 * Login page, session lifecycle and the protected landing page
 */
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;

use crate::auth::{
    safe_next,
    session::{clear_session_cookie, session_cookie},
    AuthState, DEFAULT_LANDING, LOGIN_PATH, LOGOUT_PATH,
};
use crate::content;
use crate::db::models::{PostFilter, SiteSettings};
use crate::error::{AppError, FieldError};
use crate::routes::{ClientSession, CurrentAdmin};
use crate::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

// ============================================================================
// Pages
// ============================================================================

fn escape(text: &str) -> String {
    content::escape_attr(text)
}

fn login_page(email: &str, next: Option<&str>, errors: &[FieldError]) -> Html<String> {
    let messages: String = errors
        .iter()
        .map(|e| format!("<li>{}</li>", escape(&e.message)))
        .collect();
    let next_field = safe_next(next)
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, escape(n)))
        .unwrap_or_default();

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<ul class="errors">{messages}</ul>
<form method="post" action="{action}">
{next_field}
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Sign in</button>
</form>
</body>
</html>"#,
        messages = messages,
        action = LOGIN_PATH,
        next_field = next_field,
        email = escape(email),
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /admin/login
pub async fn login_form(
    State(state): State<AppState>,
    session: ClientSession,
    Query(query): Query<NextQuery>,
) -> Response {
    if session.resolve(&state).await.is_authenticated() {
        let target = safe_next(query.next.as_deref()).unwrap_or(DEFAULT_LANDING);
        return Redirect::to(target).into_response();
    }
    login_page("", query.next.as_deref(), &[]).into_response()
}

/// POST /admin/login
/// On success sets the session cookie and resumes at `next`.
pub async fn login(
    State(state): State<AppState>,
    session: ClientSession,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = form.next.as_deref().or(query.next.as_deref());

    match state
        .auth
        .login(&form.email, &form.password, session.fingerprint, next)
        .await
    {
        Ok(outcome) => (
            AppendHeaders([(
                header::SET_COOKIE,
                session_cookie(&outcome.token, state.config.secure_cookies),
            )]),
            Redirect::to(&outcome.redirect_to),
        )
            .into_response(),
        Err(AppError::Authentication) => (
            StatusCode::UNAUTHORIZED,
            login_page(
                &form.email,
                next,
                &[FieldError::new("form", AppError::Authentication.to_string())],
            ),
        )
            .into_response(),
        Err(AppError::Validation(fields)) => (
            StatusCode::BAD_REQUEST,
            login_page(&form.email, next, &fields),
        )
            .into_response(),
        Err(other) => other.into_response(),
    }
}

/// GET /admin/logout
pub async fn logout(State(state): State<AppState>, session: ClientSession) -> impl IntoResponse {
    state.auth.logout(session.token.as_deref()).await;
    (
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config.secure_cookies),
        )]),
        Redirect::to(LOGIN_PATH),
    )
}

/// GET /admin/
pub async fn index(
    State(state): State<AppState>,
    admin: CurrentAdmin,
) -> Result<Html<String>, AppError> {
    let settings = state.posts.settings().await?;
    let all = state
        .posts
        .list(PostFilter {
            published: None,
            page: 1,
            page_size: 1,
        })
        .await?;
    let published = state
        .posts
        .list(PostFilter {
            published: Some(true),
            page: 1,
            page_size: 1,
        })
        .await?;

    Ok(Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title} admin</title></head>
<body>
<h1>{title}</h1>
<p>Signed in as {email}</p>
<p>{total} posts, {published} published, {drafts} drafts</p>
<p><a href="{logout}">Sign out</a></p>
</body>
</html>"#,
        title = escape(&settings.title),
        email = escape(&admin.user.email),
        total = all.total,
        published = published.total,
        drafts = all.total - published.total,
        logout = LOGOUT_PATH,
    )))
}

/// POST /admin/password
/// Every session of the account ends, including this one.
pub async fn change_password(
    State(state): State<AppState>,
    admin: CurrentAdmin,
    Form(form): Form<PasswordForm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .change_password(&admin.user, &form.current_password, &form.new_password)
        .await?;
    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config.secure_cookies),
        )]),
        Redirect::to(LOGIN_PATH),
    ))
}

/// GET /admin/settings
pub async fn get_settings(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
) -> Result<Json<SiteSettings>, AppError> {
    Ok(Json(state.posts.settings().await?))
}

/// PUT /admin/settings
pub async fn update_settings(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Json(payload): Json<SiteSettings>,
) -> Result<Json<SiteSettings>, AppError> {
    Ok(Json(state.posts.save_settings(payload).await?))
}
