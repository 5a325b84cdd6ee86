/**
 * Routes Module
 * HTTP handlers plus the session extractors they share
 */
pub mod admin;
pub mod health;
pub mod posts;
pub mod site;

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};

use crate::auth::session::{token_from_headers, Fingerprint};
use crate::auth::AuthState;
use crate::db::models::User;
use crate::error::AppError;
use crate::AppState;

/// Success response (for delete and other bodiless mutations)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Session cookie and client fingerprint of the current request.
/// Never rejects; an absent cookie is simply `token: None`.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub token: Option<String>,
    pub fingerprint: Fingerprint,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

impl ClientSession {
    pub fn from_parts(parts: &Parts) -> Self {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Self {
            token: token_from_headers(&parts.headers),
            fingerprint: Fingerprint::from_request(&parts.headers, ip),
        }
    }

    pub async fn resolve(&self, state: &AppState) -> AuthState {
        state
            .auth
            .current(self.token.as_deref(), &self.fingerprint)
            .await
    }
}

/// Extractor for handlers that require a signed-in administrator.
/// Anonymous requests are redirected to the login page with the requested
/// path preserved.
#[derive(Debug, Clone)]
pub struct CurrentAdmin {
    pub user: User,
    pub session: ClientSession,
}

impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = ClientSession::from_parts(parts);
        match session.resolve(state).await {
            AuthState::Authenticated(user) => Ok(Self { user, session }),
            AuthState::Anonymous => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| parts.uri.path().to_string());
                Err(AppError::Authorization { next })
            }
        }
    }
}
