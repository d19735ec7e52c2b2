//! # rangers: accounts and sessions for the Code Rangers learning platform
//!
//! `rangers` runs the sign-up, login and page-guarding side of Code Rangers. Students create an
//! account, log in with their username or email address, and get a signed session that unlocks
//! the dashboard and course pages. Instructors and admins sign up the same way with a staff
//! passcode.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! keeps user records in PostgreSQL, or in memory for development and tests.
//!
//! ### Request Flow
//!
//! Every request first passes the route guard ([`auth::guard`]). The guard reads the session token
//! from the session cookie or an `Authorization: Bearer` header, verifies it, and stores the claims
//! in the request extensions. Requests for a protected prefix (`/dashboard`, `/course` by default)
//! without a valid session are redirected to the login page before routing happens. Everything
//! else reaches the router: JSON endpoints under `/api`, the server-rendered pages, `/healthz`.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) holds the `/api/auth/*` endpoints and the page handlers.
//!
//! The **authentication layer** ([`auth`]) verifies credentials, issues and reads session tokens,
//! and enforces the route policy.
//!
//! The **database layer** ([`db`]) defines the [`db::store::UserStore`] contract the rest of the
//! crate talks to, with a Postgres implementation built on the repository in
//! [`db::handlers::Users`] and an in-memory one.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use rangers::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = rangers::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     rangers::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod pages;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::{handlers, models::users::Role},
    auth::{
        credentials::CredentialVerifier,
        guard::{RoutePolicy, route_guard},
        password::{self, Argon2Params},
    },
    config::{AdminConfig, CorsOrigin, DatabaseConfig},
    db::{
        errors::DbError,
        models::users::{AUTH_SOURCE_SYSTEM, NewUser},
        store::{Identifier, InMemoryUserStore, PgUserStore, UserStore},
    },
    errors::Error,
    openapi::ApiDoc,
    pages::Pages,
};
use axum::{
    Json, Router, ServiceExt,
    http::{self, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

pub use types::UserId;

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `store`: Where user records live
/// - `config`: Application configuration loaded from environment/files
/// - `policy`: The route guard's validated policy
/// - `pages`: Compiled page templates
/// - `verifier`: Login credential checks, with its Argon2 cost taken from the config
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .store(Arc::new(InMemoryUserStore::new()))
///     .policy(Arc::new(RoutePolicy::from_config(&config.guard)?))
///     .pages(Arc::new(Pages::new(&config.guard.login_path)?))
///     .verifier(Arc::new(CredentialVerifier::new(Argon2Params::from(&config.auth.native.password))?))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Config,
    pub policy: Arc<RoutePolicy>,
    pub pages: Arc<Pages>,
    pub verifier: Arc<CredentialVerifier>,
}

impl AppState {
    /// State for `config` on top of `store`, with the guard policy, templates and credential verifier
    /// built from it.
    pub fn for_store(config: Config, store: Arc<dyn UserStore>) -> Result<Self, Error> {
        let policy = RoutePolicy::from_config(&config.guard)?;
        let pages = Pages::new(policy.login_path())?;
        let verifier = CredentialVerifier::new(Argon2Params::from(&config.auth.native.password))?;
        Ok(AppState::builder()
            .store(store)
            .policy(Arc::new(policy))
            .pages(Arc::new(pages))
            .verifier(Arc::new(verifier))
            .config(config)
            .build())
    }
}

/// Get the rangers database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Does nothing unless `admin.password` is configured. An existing account with the admin
/// username (or email) is left as it is, so this is safe to run on every startup.
///
/// # Returns
///
/// The ID of the created or existing admin user, or `None` when no admin is configured.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(
    store: &dyn UserStore,
    admin: &AdminConfig,
    params: Argon2Params,
) -> Result<Option<UserId>, Error> {
    let Some(admin_password) = &admin.password else {
        debug!("No admin password configured, skipping admin creation");
        return Ok(None);
    };

    let username = Identifier::Username(admin.username.clone());
    let email = admin.email.as_deref().and_then(Identifier::parse);

    if let Some(existing) = store.find_by_identifier(&username).await? {
        return Ok(Some(existing.id));
    }
    if let Some(email) = &email
        && let Some(existing) = store.find_by_identifier(email).await?
    {
        return Ok(Some(existing.id));
    }

    let password_hash = password::hash_password(admin_password.clone(), params).await?;
    let new_user = NewUser {
        username: admin.username.clone(),
        email: match email {
            Some(Identifier::Email(email)) => Some(email),
            _ => None,
        },
        first_name: None,
        last_name: None,
        avatar_url: None,
        password_hash: Some(password_hash),
        role: Role::Admin,
        auth_source: AUTH_SOURCE_SYSTEM.to_string(),
    };

    match store.insert(new_user).await {
        Ok(created) => {
            info!("Created initial admin user {}", created.username);
            Ok(Some(created.id))
        }
        // Another instance seeded it between the lookup and the insert
        Err(DbError::UniqueViolation { .. }) => Ok(store.find_by_identifier(&username).await?.map(|user| user.id)),
        Err(e) => Err(e.into()),
    }
}

/// Connect to the configured database and build the store on top of it.
async fn setup_store(config: &Config) -> anyhow::Result<(Arc<dyn UserStore>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Postgres { url, pool: settings } => {
            info!("Using external database");
            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .min_connections(settings.min_connections)
                .acquire_timeout(settings.acquire_timeout)
                .idle_timeout(settings.idle_timeout)
                .connect(url)
                .await?;
            migrator().run(&pool).await?;
            Ok((Arc::new(PgUserStore::new(pool.clone())), Some(pool)))
        }
        DatabaseConfig::Memory => {
            info!("Using in-memory user store: accounts will be lost on shutdown");
            Ok((Arc::new(InMemoryUserStore::new()), None))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// Routes:
/// - `/api/auth/*` JSON endpoints and `/api/openapi.json`
/// - pages: `/`, the login path, `/signup`, `/dashboard`, `/course` and `/course/{*path}`
/// - `/healthz`
///
/// CORS and request tracing are layered on top. The route guard is not part of the router; it
/// runs before routing, see [`Application::serve`].
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let login_path = state.policy.login_path();
    if matches!(login_path, "/signup" | "/dashboard" | "/course" | "/healthz") || login_path.starts_with("/api") {
        anyhow::bail!("guard login_path '{login_path}' collides with a built-in route");
    }

    let api_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/session", get(handlers::auth::get_session))
        .route("/auth/providers", get(handlers::auth::get_providers))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let page_routes = Router::new()
        .route("/", get(handlers::pages::home))
        .route(login_path, get(handlers::pages::login_page))
        .route("/signup", get(handlers::pages::signup_page))
        .route("/dashboard", get(handlers::pages::dashboard))
        .route("/course", get(handlers::pages::course_index))
        .route("/course/{*path}", get(handlers::pages::course))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(page_routes);

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer);

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, seeds the
///    admin user and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, in-flight requests finish and the pool
///    is closed
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting rangers with host {} and port {}", config.host, config.port);

        let (store, pool) = setup_store(&config).await?;

        let params = Argon2Params::from(&config.auth.native.password);
        create_initial_admin_user(store.as_ref(), &config.admin, params)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

        let mut app = Self::with_store(config, store)?;
        app.pool = pool;
        Ok(app)
    }

    /// Build the application on an existing store, skipping database setup and seeding.
    pub fn with_store(config: Config, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let app_state = AppState::for_store(config.clone(), store)?;
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            app_state,
            config,
            pool: None,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        // Apply the guard before path matching, as in `serve`
        let middleware = from_fn_with_state(self.app_state, route_guard);
        let service = middleware.layer(self.router).into_make_service();
        axum_test::TestServer::new(service).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Rangers listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        // Apply the guard before path matching so unknown protected paths redirect too
        let middleware = from_fn_with_state(self.app_state, route_guard);
        let service = middleware.layer(self.router);

        axum::serve(listener, service.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
