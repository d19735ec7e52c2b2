//! Credential verification for the login flow.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::{
    api::models::users::Role,
    auth::password::{self, Argon2Params},
    db::{
        models::users::UserRecord,
        store::{Identifier, UserStore},
    },
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// The one message every credential failure carries, whatever went wrong.
pub const INVALID_CREDENTIALS: &str = "Invalid username, email or password";

/// Who a verified request belongs to. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
}

impl From<&UserRecord> for AuthenticatedUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            role: record.role,
        }
    }
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    }
}

/// Checks identifiers and passwords against a [`UserStore`].
///
/// Holds a throwaway hash made with the configured Argon2 cost, built once at startup. Logins that
/// fail before a real comparison check against it instead, so response timing does not reveal
/// whether the identifier exists.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(params: Argon2Params) -> Result<Self> {
        let dummy_hash = password::hash_string_with_params("rangers-dummy-password", Some(params))?;
        Ok(Self { dummy_hash })
    }

    async fn verify_against_dummy(&self, password: &str) {
        if let Err(e) = password::verify_password(password.to_string(), self.dummy_hash.clone()).await {
            error!("Dummy password comparison failed: {}", e);
        }
    }

    /// Check an identifier (username or email) and password.
    ///
    /// Unknown identifiers, wrong passwords and accounts without a password all fail with the same
    /// [`Error::Unauthenticated`]; the reason only shows up in debug logs.
    #[instrument(skip_all, err)]
    pub async fn verify(&self, store: &dyn UserStore, identifier: &str, password: &str) -> Result<AuthenticatedUser> {
        let Some(identifier) = Identifier::parse(identifier) else {
            debug!("Login attempt with a blank identifier");
            self.verify_against_dummy(password).await;
            return Err(invalid_credentials());
        };

        let Some(user) = store.find_by_identifier(&identifier).await? else {
            debug!("Login attempt for unknown identifier");
            self.verify_against_dummy(password).await;
            return Err(invalid_credentials());
        };

        let Some(hash) = user.password_hash.clone() else {
            debug!("Login attempt for user {} which has no password", abbrev_uuid(&user.id));
            self.verify_against_dummy(password).await;
            return Err(invalid_credentials());
        };

        if !password::verify_password(password.to_string(), hash).await? {
            debug!("Wrong password for user {}", abbrev_uuid(&user.id));
            return Err(invalid_credentials());
        }

        debug!("Credentials verified for user {}", abbrev_uuid(&user.id));
        Ok(AuthenticatedUser::from(&user))
    }
}
