//! Database models for users.

use crate::api::models::users::Role;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// `auth_source` value for accounts created through signup
pub const AUTH_SOURCE_NATIVE: &str = "native";
/// `auth_source` value for the configured initial admin
pub const AUTH_SOURCE_SYSTEM: &str = "system";

/// `auth_source` value for accounts created from an identity provider profile
pub fn oauth_auth_source(provider: &str) -> String {
    format!("oauth:{provider}")
}

/// Database request for creating a new user.
///
/// The caller has already validated every field; `email` must be lowercased and
/// `password_hash` is a PHC string or `None` for accounts without a password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub auth_source: String,
}

/// A row of the `users` table
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub auth_source: String,
    pub created_at: DateTime<Utc>,
}
