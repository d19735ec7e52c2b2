//! Sign-in with a profile from an upstream identity provider.
//!
//! The OAuth handshake happens elsewhere; by the time a profile reaches this module the provider
//! has already vouched for it. All that is left is mapping it onto a ranger account.
//!
//! An identity-provider integration calls [`session_for_profile`] once the handshake is done and
//! sets the returned token as the session cookie, the same way `/api/auth/login` does.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::users::Role,
    auth::{credentials::AuthenticatedUser, session::create_session_token},
    config::Config,
    db::{
        errors::DbError,
        models::users::{NewUser, oauth_auth_source},
        store::{Identifier, UserStore, normalize_email},
    },
    errors::{Error, Result},
};

/// A verified profile as delivered by an identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthProfile {
    /// Provider name, e.g. "google"
    pub provider: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    /// Role asserted by the provider, if it manages roles at all
    pub role: Option<String>,
}

/// What a profile says about the person, independent of any stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    pub provider: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
}

/// Map a provider profile to an identity.
///
/// The role is `default_role` unless the profile names a known role. Profiles without a verified
/// email are rejected, since the email is how accounts are matched.
pub fn claims_from_profile(profile: &OAuthProfile, default_role: Role) -> Result<OAuthIdentity> {
    let email = profile
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|email| !email.is_empty() && email.contains('@'));

    let email = match email {
        Some(email) if profile.email_verified => email,
        _ => {
            return Err(Error::Unauthenticated {
                message: Some("Identity provider did not supply a verified email address".to_string()),
            });
        }
    };

    let role = profile
        .role
        .as_deref()
        .and_then(|role| role.parse::<Role>().ok())
        .unwrap_or(default_role);

    Ok(OAuthIdentity {
        provider: profile.provider.clone(),
        email,
        first_name: profile.given_name.clone(),
        last_name: profile.family_name.clone(),
        avatar_url: profile.picture.clone(),
        role,
    })
}

/// Username derived from the email local part, keeping only characters signup would accept.
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(48)
        .collect();
    if base.is_empty() { "ranger".to_string() } else { base }
}

fn with_suffix(base: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &suffix[..6])
}

const MAX_USERNAME_ATTEMPTS: usize = 5;

/// Find the account for a verified profile, creating one on first sign-in.
///
/// Existing accounts keep their stored role. New accounts have no password, so they can only
/// ever sign in through a provider.
#[instrument(skip_all, fields(provider = %profile.provider), err)]
pub async fn sign_in_with_profile(store: &dyn UserStore, profile: &OAuthProfile, config: &Config) -> Result<AuthenticatedUser> {
    if !config.auth.oauth.enabled {
        return Err(Error::BadRequest {
            message: "OAuth sign-in is disabled".to_string(),
        });
    }

    let identity = claims_from_profile(profile, config.auth.oauth.default_role)?;
    let lookup = Identifier::Email(identity.email.clone());

    if let Some(existing) = store.find_by_identifier(&lookup).await? {
        debug!("Profile matched existing user {}", existing.id);
        return Ok(AuthenticatedUser::from(&existing));
    }

    let base = username_base(&identity.email);
    let mut username = if base.chars().count() >= config.signup.username_min_length {
        base.clone()
    } else {
        with_suffix(&base)
    };

    for _ in 0..MAX_USERNAME_ATTEMPTS {
        let new_user = NewUser {
            username: username.clone(),
            email: Some(identity.email.clone()),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            password_hash: None,
            role: identity.role,
            auth_source: oauth_auth_source(&identity.provider),
        };

        match store.insert(new_user).await {
            Ok(created) => {
                info!("Created user {} from {} profile", created.id, identity.provider);
                return Ok(AuthenticatedUser::from(&created));
            }
            Err(e @ DbError::UniqueViolation { .. }) => match e.conflicting_field() {
                Some("username") => {
                    debug!("Username {} taken, retrying with a suffix", username);
                    username = with_suffix(&base);
                }
                // Another request created this account first
                Some("email") => {
                    return store
                        .find_by_identifier(&lookup)
                        .await?
                        .map(|user| AuthenticatedUser::from(&user))
                        .ok_or(Error::Database(DbError::NotFound));
                }
                _ => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Internal {
        operation: format!("allocate a unique username for {} profile", identity.provider),
    })
}

/// Sign in with a verified profile and issue a session token for the account.
pub async fn session_for_profile(state: &AppState, profile: &OAuthProfile) -> Result<(AuthenticatedUser, String)> {
    let user = sign_in_with_profile(state.store.as_ref(), profile, &state.config).await?;
    let token = create_session_token(&user, &state.config)?;
    Ok((user, token))
}
