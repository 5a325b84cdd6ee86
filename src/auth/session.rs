//! Long-lived admin sessions bound to a client fingerprint.
//!
//! The cookie carries an HS256 token naming a session id; the registry maps
//! the SHA-256 of that id to the owner and the fingerprint recorded at login.
//! A request presenting the token from a different address or user agent
//! destroys the session.

use std::{collections::HashMap, net::IpAddr, sync::Arc};

use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "quillpress_session";

/// Sessions survive browser restarts for this long.
pub const SESSION_LIFETIME_DAYS: i64 = 365;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    sid: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: Uuid,
    fingerprint: Fingerprint,
    expires_at: i64,
}

/// Hash of the client address and user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<&str>) -> Self {
        let ip = ip.map(|ip| ip.to_string()).unwrap_or_default();
        Self(sha256_hex(&format!("{}|{}", ip, user_agent.unwrap_or(""))))
    }

    pub fn from_request(headers: &HeaderMap, ip: Option<IpAddr>) -> Self {
        let agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        Self::new(ip, agent)
    }
}

/// Outcome of presenting a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Uuid),
    /// Missing, forged, expired or already destroyed.
    Unknown,
    /// Valid token presented by a different client; the session is gone now.
    Hijacked(Uuid),
}

#[derive(Clone)]
pub struct SessionStore {
    encoding: EncodingKey,
    decoding: DecodingKey,
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl SessionStore {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session for `user_id` and return the signed cookie token.
    pub async fn establish(
        &self,
        user_id: Uuid,
        fingerprint: Fingerprint,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let expires_at = (now + Duration::days(SESSION_LIFETIME_DAYS)).timestamp();
        let sid = Alphanumeric.sample_string(&mut rand::rng(), 48);

        let token = encode(
            &Header::default(),
            &SessionClaims {
                sub: user_id.to_string(),
                sid: sid.clone(),
                iat: now.timestamp(),
                exp: expires_at,
            },
            &self.encoding,
        )?;

        let mut sessions = self.sessions.write().await;
        let now_ts = now.timestamp();
        sessions.retain(|_, record| record.expires_at > now_ts);
        sessions.insert(
            sha256_hex(&sid),
            SessionRecord {
                user_id,
                fingerprint,
                expires_at,
            },
        );
        Ok(token)
    }

    pub async fn resolve(&self, token: &str, fingerprint: &Fingerprint) -> SessionLookup {
        let Some(key) = self.session_key(token) else {
            return SessionLookup::Unknown;
        };

        let record = match self.sessions.read().await.get(&key) {
            Some(record) => record.clone(),
            None => return SessionLookup::Unknown,
        };

        if record.expires_at <= Utc::now().timestamp() {
            self.sessions.write().await.remove(&key);
            return SessionLookup::Unknown;
        }

        if &record.fingerprint != fingerprint {
            self.sessions.write().await.remove(&key);
            return SessionLookup::Hijacked(record.user_id);
        }

        SessionLookup::Active(record.user_id)
    }

    /// Forget the session named by `token`. Unknown tokens are ignored.
    pub async fn destroy(&self, token: &str) {
        if let Some(key) = self.session_key(token) {
            self.sessions.write().await.remove(&key);
        }
    }

    pub async fn destroy_all_for(&self, user_id: Uuid) {
        self.sessions
            .write()
            .await
            .retain(|_, record| record.user_id != user_id);
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn session_key(&self, token: &str) -> Option<String> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .ok()
            .map(|data| sha256_hex(&data.claims.sid))
    }
}

/// Session token from the request's `Cookie` header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let max_age = Duration::days(SESSION_LIFETIME_DAYS).num_seconds();
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
        SESSION_COOKIE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
