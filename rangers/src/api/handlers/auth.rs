use axum::{Json, extract::State, http::HeaderValue};
use tracing::info;

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, LoginBody, LoginRequest, LoginResponse, LogoutResponse, ProvidersResponse, SessionInfo,
            SignupRequest, SignupResponse,
        },
        users::UserResponse,
    },
    auth::{
        current_user::CurrentSession,
        password::{self, Argon2Params},
        session,
    },
    config::Config,
    db::models::users::{AUTH_SOURCE_NATIVE, NewUser},
    errors::Error,
    types::abbrev_uuid,
};

fn require_native_auth(config: &Config) -> Result<(), Error> {
    if !config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    Ok(())
}

/// Create a ranger account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input, with field-level errors"),
        (status = 409, description = "Username or email already taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Result<SignupResponse, Error> {
    require_native_auth(&state.config)?;

    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let valid = request.validate(&state.config.signup, &state.config.auth.native.password)?;

    let params = Argon2Params::from(&state.config.auth.native.password);
    let password_hash = password::hash_password(valid.password, params).await?;

    let created = state
        .store
        .insert(NewUser {
            username: valid.username,
            email: valid.email,
            first_name: valid.first_name,
            last_name: valid.last_name,
            avatar_url: valid.avatar_url,
            password_hash: Some(password_hash),
            role: valid.role,
            auth_source: AUTH_SOURCE_NATIVE.to_string(),
        })
        .await?;

    info!("Created {} account {}", created.role, abbrev_uuid(&created.id));

    Ok(SignupResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(created),
            message: "Signup successful".to_string(),
        },
    })
}

/// Login with a username or email address and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = LoginBody),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state.config)?;

    let user = state
        .verifier
        .verify(state.store.as_ref(), &request.identifier, &request.password)
        .await?;

    let token = session::create_session_token(&user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config)?;

    // Reload for the full profile; the verifier only returns the session projection
    let record = state.store.find_by_id(user.id).await?.ok_or(Error::Unauthenticated { message: None })?;

    Ok(LoginResponse {
        body: LoginBody {
            token,
            user: UserResponse::from(record),
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    let cookie = cookie_header(session_cookie_string("", &state.config, 0))?;

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie,
    })
}

/// The caller's current session
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "authentication",
    responses(
        (status = 200, description = "Valid session", body = SessionInfo),
        (status = 401, description = "No valid session"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_session(CurrentSession(claims): CurrentSession) -> Json<SessionInfo> {
    Json(SessionInfo {
        id: claims.sub,
        role: claims.role,
    })
}

/// Enabled sign-in methods
#[utoipa::path(
    get,
    path = "/auth/providers",
    tag = "authentication",
    responses(
        (status = 200, description = "Sign-in methods", body = ProvidersResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let native = &state.config.auth.native;
    let oauth = &state.config.auth.oauth;

    Json(ProvidersResponse {
        credentials: native.enabled,
        registration: native.enabled && native.allow_registration,
        oauth: if oauth.enabled { oauth.providers.clone() } else { Vec::new() },
    })
}

fn session_cookie_string(token: &str, config: &Config, max_age: u64) -> String {
    let session_config = &config.auth.native.session;
    let secure = if session_config.cookie_secure { "; Secure" } else { "" };

    format!(
        "{}={}; Path=/; HttpOnly{}; SameSite={}; Max-Age={}",
        session_config.cookie_name, token, secure, session_config.cookie_same_site, max_age
    )
}

fn cookie_header(cookie: String) -> Result<HeaderValue, Error> {
    HeaderValue::try_from(cookie).map_err(|e| Error::Internal {
        operation: format!("build session cookie: {e}"),
    })
}

fn create_session_cookie(token: &str, config: &Config) -> Result<HeaderValue, Error> {
    let max_age = config.auth.security.jwt_expiry.as_secs();
    cookie_header(session_cookie_string(token, config, max_age))
}
