use crate::{
    AppState,
    auth::session::{SessionClaims, read_session},
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use tracing::{instrument, trace};

/// The verified session of the caller.
///
/// Claims placed in the request extensions by the route guard are reused; otherwise the token
/// is read from the session cookie or `Authorization: Bearer` header. Rejects with
/// [`Error::Unauthenticated`] when there is no valid session.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionClaims);

fn session_from_parts(parts: &Parts, state: &AppState) -> Option<SessionClaims> {
    if let Some(claims) = parts.extensions.get::<SessionClaims>() {
        trace!("Using session claims verified by the route guard");
        return Some(claims.clone());
    }
    read_session(&parts.headers, &state.config)
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        session_from_parts(parts, state)
            .map(CurrentSession)
            .ok_or(Error::Unauthenticated { message: None })
    }
}

impl OptionalFromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Option<Self>, Self::Rejection> {
        Ok(session_from_parts(parts, state).map(CurrentSession))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        auth::{credentials::AuthenticatedUser, session::create_session_token},
        test_utils::{create_test_config, create_test_state},
    };
    use uuid::Uuid;

    async fn extract(parts: &mut Parts, state: &AppState) -> Result<CurrentSession> {
        <CurrentSession as FromRequestParts<AppState>>::from_request_parts(parts, state).await
    }

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/api/auth/session")
            .header(name, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            username: "rangerjoe".to_string(),
            email: None,
            role,
        }
    }

    #[tokio::test]
    async fn test_session_from_bearer_token() {
        let (state, _store) = create_test_state(create_test_config());
        let user = user(Role::Admin);
        let token = create_session_token(&user, &state.config).unwrap();

        let mut parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let CurrentSession(claims) = extract(&mut parts, &state).await.unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_claims_from_extensions_are_reused() {
        let (state, _store) = create_test_state(create_test_config());
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            role: Role::Student,
            iat: 0,
            exp: 0,
        };

        let request = axum::http::Request::builder().uri("http://localhost/").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();
        parts.extensions.insert(claims.clone());

        let CurrentSession(found) = extract(&mut parts, &state).await.unwrap();
        assert_eq!(found, claims);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_session_is_unauthorized() {
        let (state, _store) = create_test_state(create_test_config());

        let mut parts = parts_with_header("cookie", "rangers_session=expired.or.forged");
        let error = extract(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let optional = <CurrentSession as OptionalFromRequestParts<AppState>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(optional.is_none());
    }
}
