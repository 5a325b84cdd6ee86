//! Admin authentication: credential checks, session lifecycle and the
//! redirect contract around the login page.

pub mod credentials;
pub mod session;

use std::sync::Arc;

use url::form_urlencoded;
use uuid::Uuid;

use crate::db::{models::User, Store};
use crate::error::{AppError, FieldError};

use self::session::{Fingerprint, SessionLookup, SessionStore};

pub const LOGIN_PATH: &str = "/admin/login";
pub const LOGOUT_PATH: &str = "/admin/logout";
pub const DEFAULT_LANDING: &str = "/admin/";

/// What a session needs to know about whoever it belongs to.
pub trait Identity {
    fn id(&self) -> Uuid;
    fn is_authenticated(&self) -> bool;
}

impl Identity for User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    Anonymous,
    Authenticated(User),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(user) if user.is_authenticated())
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            AuthState::Anonymous => None,
        }
    }
}

/// Successful login: the session token to hand back and where to go next.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
    pub redirect_to: String,
}

/// Only local absolute paths are accepted as post-login targets.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim).filter(|n| {
        n.starts_with('/') && !n.starts_with("//") && !n.starts_with("/\\") && !n.contains(['\r', '\n'])
    })
}

/// Login page URL that resumes at `next` afterwards.
pub fn login_url(next: Option<&str>) -> String {
    match safe_next(next) {
        Some(next) => {
            let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
            format!("{}?next={}", LOGIN_PATH, encoded)
        }
        None => LOGIN_PATH.to_string(),
    }
}

#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn Store>,
    sessions: SessionStore,
    password_cost: u32,
}

impl AuthGate {
    pub fn new(store: Arc<dyn Store>, secret: &str, password_cost: u32) -> Self {
        Self {
            store,
            sessions: SessionStore::new(secret),
            password_cost,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Check credentials and open a session. Unknown email and wrong
    /// password are indistinguishable to the caller.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: Fingerprint,
        next: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let email = email.trim();
        let mut fields = Vec::new();
        if email.is_empty() {
            fields.push(FieldError::new("email", "Email is required"));
        } else if !email.contains('@') {
            fields.push(FieldError::new("email", "Invalid email format"));
        }
        if password.is_empty() {
            fields.push(FieldError::new("password", "Password is required"));
        }
        if !fields.is_empty() {
            return Err(AppError::Validation(fields));
        }

        let user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::warn!("Login attempt for unknown user");
                return Err(AppError::Authentication);
            }
        };

        // bcrypt is CPU-bound; keep the executor free
        let candidate = user.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || candidate.verify_password(&password))
            .await
            .unwrap_or(false);
        if !verified {
            tracing::warn!("Failed login attempt");
            return Err(AppError::Authentication);
        }

        let token = self.sessions.establish(user.id, fingerprint).await?;
        tracing::info!(user_id = %user.id, "Successful login");

        Ok(LoginOutcome {
            user,
            token,
            redirect_to: safe_next(next).unwrap_or(DEFAULT_LANDING).to_string(),
        })
    }

    /// Resolve the session token presented with a request.
    pub async fn current(&self, token: Option<&str>, fingerprint: &Fingerprint) -> AuthState {
        let Some(token) = token else {
            return AuthState::Anonymous;
        };

        match self.sessions.resolve(token, fingerprint).await {
            SessionLookup::Active(user_id) => match self.store.get_user(user_id).await {
                Ok(Some(user)) => AuthState::Authenticated(user),
                Ok(None) => {
                    self.sessions.destroy(token).await;
                    AuthState::Anonymous
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to load session user");
                    AuthState::Anonymous
                }
            },
            SessionLookup::Hijacked(user_id) => {
                tracing::warn!(user_id = %user_id, "session fingerprint mismatch; session destroyed");
                AuthState::Anonymous
            }
            SessionLookup::Unknown => AuthState::Anonymous,
        }
    }

    pub async fn logout(&self, token: Option<&str>) {
        if let Some(token) = token {
            self.sessions.destroy(token).await;
        }
    }

    /// Replace the password after checking the current one, then end every
    /// session of that user.
    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let candidate = user.clone();
        let current = current.to_string();
        let verified = tokio::task::spawn_blocking(move || candidate.verify_password(&current))
            .await
            .unwrap_or(false);
        if !verified {
            return Err(AppError::invalid("current_password", "Current password is incorrect"));
        }

        let mut updated = user.clone();
        let new_password = new_password.to_string();
        let cost = self.password_cost;
        let updated = tokio::task::spawn_blocking(move || {
            updated.set_password_with_cost(&new_password, cost)?;
            Ok::<_, credentials::CredentialError>(updated)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

        if !self.store.update_user_password(&updated).await? {
            return Err(AppError::NotFound("user"));
        }
        self.sessions.destroy_all_for(user.id).await;
        tracing::info!(user_id = %user.id, "Password changed; sessions revoked");
        Ok(())
    }

    /// Create an admin account with a plaintext password.
    pub async fn register_admin(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = email.to_string();
        let password = password.to_string();
        let cost = self.password_cost;
        let user = tokio::task::spawn_blocking(move || User::new(&email, &password, cost))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "Admin account created");
        Ok(user)
    }

    /// Make sure the configured admin exists. Existing accounts are left alone.
    pub async fn seed_admin(&self, email: &str, seed: &AdminSecret) -> Result<(), AppError> {
        if self.store.find_user_by_email(email).await?.is_some() {
            tracing::debug!("Admin account already present");
            return Ok(());
        }
        match seed {
            AdminSecret::Hash(hash) => {
                let user = User::with_hash(email, hash.clone());
                self.store.insert_user(&user).await?;
                tracing::info!(user_id = %user.id, "Admin account seeded from hash");
            }
            AdminSecret::Plain(plain) => {
                self.register_admin(email, plain).await?;
            }
        }
        Ok(())
    }
}

/// Admin password as supplied by configuration.
#[derive(Debug, Clone)]
pub enum AdminSecret {
    Hash(String),
    Plain(String),
}
