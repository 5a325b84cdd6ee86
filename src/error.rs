//! Error taxonomy shared by the services and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::credentials::CredentialError;
use crate::auth::login_url;
use crate::config::ConfigError;
use crate::content::ContentError;
use crate::db::StoreError;

/// A single field-level validation message surfaced to the author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials. Never says which half was wrong.
    #[error("Invalid username or password.")]
    Authentication,

    /// Protected resource requested while anonymous.
    #[error("login required to access {next}")]
    Authorization { next: String },

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    InvalidContent(#[from] ContentError),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("session error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Store(other),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::TooShort { .. } | CredentialError::TooLong { .. } => {
                AppError::invalid("password", err.to_string())
            }
            CredentialError::NotReadable => AppError::Internal(err.to_string()),
            CredentialError::Hash(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Error body returned by the JSON routes.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            fields: Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Authorization { next } => {
                return Redirect::to(&login_url(Some(&next))).into_response();
            }
            AppError::Authentication => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(AppError::Authentication.to_string()),
            ),
            AppError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields,
                },
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(format!("{} not found", what)),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
            AppError::InvalidContent(e) => (StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string())),
            AppError::Store(e) => {
                tracing::error!(error = %e, "storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Database error"),
                )
            }
            AppError::Session(e) => {
                tracing::error!(error = %e, "session token failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Session error"),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Failures that stop the process before it starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to seed admin account: {0}")]
    Seed(AppError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_redirects_to_login_with_next() {
        let res = AppError::Authorization {
            next: "/admin/".to_string(),
        }
        .into_response();
        assert!(res.status().is_redirection());
        let location = res.headers().get("location").unwrap().to_str().unwrap();
        assert_eq!(location, "/admin/login?next=%2Fadmin%2F");
    }

    #[test]
    fn test_authentication_message_is_generic() {
        assert_eq!(
            AppError::Authentication.to_string(),
            "Invalid username or password."
        );
        let res = AppError::Authentication.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: AppError = StoreError::Conflict("slug taken".to_string()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "slug taken"));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_short_password_is_a_validation_failure() {
        let err: AppError = CredentialError::TooShort { min: 8 }.into();
        match err {
            AppError::Validation(fields) => assert_eq!(fields[0].field, "password"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_overlong_password_is_a_validation_failure() {
        let err: AppError = CredentialError::TooLong { max: 72 }.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
