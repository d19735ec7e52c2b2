//! The user record store used by authentication and signup.
//!
//! [`UserStore`] is the seam between the auth core and persistence. Uniqueness of username and
//! email is the store's job: callers insert and handle [`DbError::UniqueViolation`], they never
//! check first.
//!
//! Two implementations:
//! - [`PgUserStore`]: PostgreSQL through the [`Users`] repository; unique indexes enforce the rule.
//! - [`InMemoryUserStore`]: process-local, for tests and `database.type = memory`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::{DbError, EMAIL_UNIQUE, Result, USERNAME_UNIQUE};
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::{NewUser, UserRecord};
use crate::types::UserId;

/// What a person typed into the login form, resolved to the column it is looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Trimmed and lowercased
    Email(String),
    /// Trimmed, case preserved
    Username(String),
}

impl Identifier {
    /// Anything containing `@` is an email address, everything else a username.
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.contains('@') {
            Some(Identifier::Email(normalize_email(trimmed)))
        } else {
            Some(Identifier::Username(trimmed.to_string()))
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Exactly one record or none
    async fn find_by_identifier(&self, identifier: &Identifier) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>>;

    /// Fails with [`DbError::UniqueViolation`] when the username or email is taken
    async fn insert(&self, user: NewUser) -> Result<UserRecord>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identifier(&self, identifier: &Identifier) -> Result<Option<UserRecord>> {
        let mut conn = self.pool.acquire().await?;
        let mut users = Users::new(&mut conn);
        match identifier {
            Identifier::Email(email) => users.get_user_by_email(email).await,
            Identifier::Username(username) => users.get_user_by_username(username).await,
        }
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).create(&user).await
    }
}

/// In-memory implementation of [`UserStore`].
///
/// Records are lost on restart. The uniqueness check and the insert happen under one write
/// lock, so concurrent signups for the same name see exactly one winner.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

fn unique_violation(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some("users".to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identifier(&self, identifier: &Identifier) -> Result<Option<UserRecord>> {
        let users = self.users.read();
        let found = users.values().find(|user| match identifier {
            Identifier::Email(email) => user.email.as_deref() == Some(email.as_str()),
            Identifier::Username(username) => user.username == *username,
        });
        Ok(found.cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.users.read().get(&id).cloned())
    }

    #[instrument(skip(self, user), fields(username = %user.username), err)]
    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let mut users = self.users.write();

        if users.values().any(|existing| existing.username == user.username) {
            return Err(unique_violation(USERNAME_UNIQUE));
        }
        if let Some(email) = &user.email
            && users.values().any(|existing| existing.email.as_ref() == Some(email))
        {
            return Err(unique_violation(EMAIL_UNIQUE));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            avatar_url: user.avatar_url,
            password_hash: user.password_hash,
            role: user.role,
            auth_source: user.auth_source,
            created_at: Utc::now(),
        };
        users.insert(record.id, record.clone());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;

    fn new_user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            first_name: None,
            last_name: None,
            avatar_url: None,
            password_hash: None,
            role: Role::Student,
            auth_source: "native".to_string(),
        }
    }

    #[test]
    fn test_identifier_parse() {
        assert_eq!(
            Identifier::parse("  Joe@Example.COM "),
            Some(Identifier::Email("joe@example.com".to_string()))
        );
        assert_eq!(Identifier::parse("rangerjoe"), Some(Identifier::Username("rangerjoe".to_string())));
        assert_eq!(Identifier::parse("   "), None);
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryUserStore::new();
        let created = store.insert(new_user("rangerjoe", Some("joe@example.com"))).await.unwrap();

        let by_name = store
            .find_by_identifier(&Identifier::Username("rangerjoe".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = store
            .find_by_identifier(&Identifier::Email("joe@example.com".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(store.find_by_id(created.id).await.unwrap().is_some());
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uniqueness_violations_name_the_field() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("rangerjoe", Some("joe@example.com"))).await.unwrap();

        let err = store.insert(new_user("rangerjoe", None)).await.unwrap_err();
        assert_eq!(err.conflicting_field(), Some("username"));

        let err = store.insert(new_user("rangerjoey", Some("joe@example.com"))).await.unwrap_err();
        assert_eq!(err.conflicting_field(), Some("email"));

        // Missing emails never clash with each other
        store.insert(new_user("rangerjane", None)).await.unwrap();
        store.insert(new_user("rangerjill", None)).await.unwrap();
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_have_one_winner() {
        let store = InMemoryUserStore::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(new_user("rangerrace", None)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.len(), 1);
    }
}
