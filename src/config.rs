//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

use crate::auth::AdminSecret;
use crate::db::DbConfig;
use crate::logging::config::{LogConfig, LogFormat};

pub const DEFAULT_SECRET_KEY: &str = "default-secret-key-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SECRET_KEY must be set to a secure, unique value in production")]
    InsecureSecret,

    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("invalid bind address {0}")]
    BindAddress(String),
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub secret: AdminSecret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub secret_key: String,
    pub database: Option<DbConfig>,
    pub secure_cookies: bool,
    pub password_cost: u32,
    pub admin: Option<AdminSeed>,
    pub allowed_origins: Vec<String>,
    pub log: LogConfig,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match var(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let is_production = environment == "production";

        let secret_key = var("SECRET_KEY").unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string());

        let admin = var("ADMIN_EMAIL").and_then(|email| {
            let secret = var("ADMIN_PASSWORD_HASH")
                .map(AdminSecret::Hash)
                .or_else(|| var("ADMIN_PASSWORD").map(AdminSecret::Plain))?;
            Some(AdminSeed { email, secret })
        });

        let allowed_origins = match var("ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => var("FRONTEND_ORIGIN").into_iter().collect(),
        };

        let log_level = var("LOG_LEVEL").unwrap_or_else(|| {
            if is_production { "info" } else { "debug" }.to_string()
        });

        let config = Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed("PORT")?.unwrap_or(3001),
            secret_key,
            database: var("DATABASE_URL").map(DbConfig::from_env),
            secure_cookies: parsed("COOKIE_SECURE")?.unwrap_or(is_production),
            password_cost: parsed("BCRYPT_COST")?.unwrap_or(bcrypt::DEFAULT_COST),
            admin,
            allowed_origins,
            log: LogConfig {
                level: log_level,
                directory: var("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
                format: if is_production {
                    LogFormat::Json
                } else {
                    LogFormat::Pretty
                },
            },
            environment,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production()
            && (self.secret_key.is_empty() || self.secret_key == DEFAULT_SECRET_KEY)
        {
            return Err(ConfigError::InsecureSecret);
        }
        if !(4..=31).contains(&self.password_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: self.password_cost.to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::BindAddress(addr))
    }

    /// Development defaults with a cheap bcrypt cost and no database.
    pub fn for_tests() -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            secret_key: "test-secret-key".to_string(),
            database: None,
            secure_cookies: false,
            password_cost: 4,
            admin: None,
            allowed_origins: Vec::new(),
            log: LogConfig::default(),
        }
    }
}
