//! Quillpress - blog backend library: app state, router and server entry

pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod logging;
pub mod posts;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::auth::AuthGate;
use crate::config::AppConfig;
use crate::db::{MemoryStore, PgStore, Store};
use crate::error::StartupError;
use crate::posts::PostManager;

/// Services shared by every handler. Built once at startup and torn down
/// with [`AppState::shutdown`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub posts: PostManager,
    pub auth: AuthGate,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        Self {
            posts: PostManager::new(store.clone()),
            auth: AuthGate::new(store.clone(), &config.secret_key, config.password_cost),
            config: Arc::new(config),
            store,
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Postgres when `DATABASE_URL` is configured, otherwise the in-memory store.
    pub async fn connect(config: AppConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn Store> = match &config.database {
            Some(db) => {
                let pg = PgStore::connect(db).await?;
                pg.run_migrations().await?;
                Arc::new(pg)
            }
            None => {
                tracing::warn!("DATABASE_URL not set. Content is kept in memory only.");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(config, store))
    }

    /// Create the configured admin account if it does not exist yet.
    pub async fn seed_admin(&self) -> Result<(), StartupError> {
        match &self.config.admin {
            Some(seed) => self
                .auth
                .seed_admin(&seed.email, &seed.secret)
                .await
                .map_err(StartupError::Seed),
            None => {
                tracing::warn!("ADMIN_EMAIL not set; no admin account will be created");
                Ok(())
            }
        }
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
        tracing::info!("Store closed");
    }
}

/// Configure CORS from the configured origins.
/// Falls back to the local frontend dev servers.
pub fn configure_cors(config: &AppConfig) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        origins = vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ];
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config);

    Router::new()
        // Admin area
        .route(
            "/admin/login",
            get(routes::admin::login_form).post(routes::admin::login),
        )
        .route("/admin/logout", get(routes::admin::logout))
        .route("/admin/", get(routes::admin::index))
        .route("/admin/password", post(routes::admin::change_password))
        .route(
            "/admin/settings",
            get(routes::admin::get_settings).put(routes::admin::update_settings),
        )
        .route(
            "/admin/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        .route(
            "/admin/posts/{id}",
            get(routes::posts::get_post)
                .patch(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route("/admin/posts/{id}/body", put(routes::posts::replace_body))
        .route(
            "/admin/posts/{id}/tags/{tag_id}",
            put(routes::posts::add_tag).delete(routes::posts::remove_tag),
        )
        .route("/admin/tags", post(routes::posts::create_tag))
        .route(
            "/admin/tags/{id}",
            patch(routes::posts::update_tag).delete(routes::posts::delete_tag),
        )
        // Public site
        .route("/api/posts", get(routes::site::list_posts))
        .route("/api/posts/{id}", get(routes::site::get_post))
        .route("/api/tags", get(routes::site::list_tags))
        .route("/api/tags/{slug}", get(routes::site::get_tag))
        .route("/api/search", get(routes::site::search))
        .route("/api/settings", get(routes::site::settings))
        .route("/health", get(routes::health::health_ping))
        .route("/health/ready", get(routes::health::health_ready))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // Global 2 MB request body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the server (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Guards must live until the process exits or buffered lines are lost
    let _log_guards = logging::init(&config.log);

    routes::health::init_start_time();
    tracing::info!(environment = %config.environment, "Starting quillpress");

    let addr: SocketAddr = config.bind_addr()?;
    let state = AppState::connect(config).await?;
    state.seed_admin().await?;

    let app = create_app(state.clone());

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    state.shutdown().await;
    served?;
    Ok(())
}
