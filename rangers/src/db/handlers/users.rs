//! Database repository for users.

use crate::types::{UserId, abbrev_uuid};
use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::users::{NewUser, UserRecord},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, avatar_url, password_hash, role, auth_source, created_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = NewUser;
    type Response = UserRecord;
    type Id = UserId;

    /// Uniqueness of username and email is left to the unique indexes; a clash comes back as
    /// `DbError::UniqueViolation` naming the index.
    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();

        let query = format!(
            "INSERT INTO users (id, username, email, first_name, last_name, avatar_url, password_hash, role, auth_source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .bind(&request.username)
            .bind(&request.email)
            .bind(&request.first_name)
            .bind(&request.last_name)
            .bind(&request.avatar_url)
            .bind(&request.password_hash)
            .bind(request.role)
            .bind(&request.auth_source)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Expects an already-normalized (trimmed, lowercased) address.
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_user_by_username(&mut self, username: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::errors::{DbError, EMAIL_UNIQUE, USERNAME_UNIQUE};
    use crate::db::models::users::AUTH_SOURCE_NATIVE;
    use sqlx::PgPool;

    fn new_user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            first_name: Some("Joe".to_string()),
            last_name: None,
            avatar_url: None,
            password_hash: Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string()),
            role: Role::Student,
            auth_source: AUTH_SOURCE_NATIVE.to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "needs a running Postgres (set DATABASE_URL)"]
    async fn test_create_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&new_user("rangerjoe", Some("joe@example.com"))).await.unwrap();
        assert_eq!(user.username, "rangerjoe");
        assert_eq!(user.email.as_deref(), Some("joe@example.com"));
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.auth_source, "native");

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.username, "rangerjoe");
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "needs a running Postgres (set DATABASE_URL)"]
    async fn test_lookup_by_email_and_username(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&new_user("rangerjane", Some("jane@example.com"))).await.unwrap();

        let by_email = repo.get_user_by_email("jane@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_username = repo.get_user_by_username("rangerjane").await.unwrap().unwrap();
        assert_eq!(by_username.id, created.id);

        assert!(repo.get_user_by_username("nobody-here").await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "needs a running Postgres (set DATABASE_URL)"]
    async fn test_duplicate_username_and_email_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&new_user("rangerjoe", Some("joe@example.com"))).await.unwrap();

        let err = repo.create(&new_user("rangerjoe", None)).await.unwrap_err();
        assert!(matches!(&err, DbError::UniqueViolation { constraint: Some(c), .. } if c == USERNAME_UNIQUE));

        let err = repo.create(&new_user("rangerjoe2", Some("joe@example.com"))).await.unwrap_err();
        assert!(matches!(&err, DbError::UniqueViolation { constraint: Some(c), .. } if c == EMAIL_UNIQUE));
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "needs a running Postgres (set DATABASE_URL)"]
    async fn test_users_without_email_do_not_clash(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&new_user("rangerone", None)).await.unwrap();
        repo.create(&new_user("rangertwo", None)).await.unwrap();
    }
}
