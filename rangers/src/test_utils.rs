//! Shared helpers for unit and HTTP tests.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;

use crate::{
    AppState, Application,
    api::models::users::Role,
    auth::password::{self, Argon2Params},
    config::{Config, DatabaseConfig, PasswordConfig},
    db::{
        models::users::{AUTH_SOURCE_NATIVE, NewUser, UserRecord},
        store::{InMemoryUserStore, UserStore},
    },
};

/// Argon2 parameters cheap enough to hash in every test.
pub fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 128,
        iterations: 1,
        parallelism: 1,
    }
}

/// Defaults plus a secret key, the in-memory store and cheap password hashing.
pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig::Memory,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };

    let params = fast_params();
    config.auth.native.password = PasswordConfig {
        argon2_memory_kib: params.memory_kib,
        argon2_iterations: params.iterations,
        argon2_parallelism: params.parallelism,
        ..Default::default()
    };
    config.auth.native.session.cookie_secure = false;
    config
}

pub fn create_test_state(config: Config) -> (AppState, InMemoryUserStore) {
    let store = InMemoryUserStore::new();
    let state = AppState::for_store(config, Arc::new(store.clone())).expect("Failed to build test state");
    (state, store)
}

/// A server with the route guard applied, as `Application::serve` runs it. The returned store
/// shares its records with the server.
pub async fn create_test_server(config: Config) -> (TestServer, InMemoryUserStore) {
    let store = InMemoryUserStore::new();
    let app = Application::with_store(config, Arc::new(store.clone())).expect("Failed to create application");
    (app.into_test_server(), store)
}

pub async fn create_test_user(store: &dyn UserStore, username: &str, email: Option<&str>, password: &str, role: Role) -> UserRecord {
    let password_hash = password::hash_string_with_params(password, Some(fast_params())).expect("Failed to hash password");

    store
        .insert(NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            first_name: None,
            last_name: None,
            avatar_url: None,
            password_hash: Some(password_hash),
            role,
            auth_source: AUTH_SOURCE_NATIVE.to_string(),
        })
        .await
        .expect("Failed to create test user")
}

/// Create a student and log them in through the API, returning the session token.
pub async fn login_token(server: &TestServer, store: &InMemoryUserStore, username: &str, password: &str) -> String {
    create_test_user(store, username, None, password, Role::Student).await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "identifier": username, "password": password }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    body["token"].as_str().expect("login response has no token").to_string()
}
