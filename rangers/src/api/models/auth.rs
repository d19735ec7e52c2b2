use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::{
    api::models::users::{Role, UserResponse},
    config::{PasswordConfig, SignupConfig},
    db::store::normalize_email,
    errors::{Error, FieldError},
    types::UserId,
};

/// Characters that count towards the "special character" password rule
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Request to create a ranger account
///
/// Missing fields read as blank so they are reported by [`SignupRequest::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SignupRequest {
    /// At least 8 characters, no spaces and no `@`
    pub username: String,
    pub password: String,
    /// Checked against `password` when sent
    pub confirm_password: Option<String>,
    /// Optional; stored lowercased and must be unique
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    /// "student" (default), "instructor" or "admin"
    pub role: Option<String>,
    /// Staff passcode, required for instructor and admin signups
    pub passcode: Option<String>,
}

/// A signup that passed validation, with every field normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSignup {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// `local@domain.tld`, no whitespace, exactly one `@`
pub fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty() && !domain.starts_with('.') && !domain.contains(".."),
        None => false,
    }
}

fn password_errors(password: &str, config: &PasswordConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let length = password.chars().count();

    if length < config.min_length {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {} characters", config.min_length),
        ));
    } else if length > config.max_length {
        errors.push(FieldError::new(
            "password",
            format!("Password must be no more than {} characters", config.max_length),
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push(FieldError::new("password", "Password must contain a lowercase letter"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push(FieldError::new("password", "Password must contain an uppercase letter"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        errors.push(FieldError::new(
            "password",
            format!("Password must contain one of {PASSWORD_SPECIAL_CHARS}"),
        ));
    }
    errors
}

impl SignupRequest {
    /// Check every field and report all problems at once.
    ///
    /// Runs before anything touches the store. Uniqueness is not checked here.
    pub fn validate(&self, signup: &SignupConfig, password: &PasswordConfig) -> Result<ValidatedSignup, Error> {
        let mut errors = Vec::new();

        let username = self.username.trim();
        let username_length = username.chars().count();
        if username.is_empty() {
            errors.push(FieldError::new("username", "Username is required"));
        } else if username_length < signup.username_min_length {
            errors.push(FieldError::new(
                "username",
                format!("Username must be at least {} characters", signup.username_min_length),
            ));
        } else if username_length > signup.username_max_length {
            errors.push(FieldError::new(
                "username",
                format!("Username must be no more than {} characters", signup.username_max_length),
            ));
        }
        if username.chars().any(char::is_whitespace) || username.contains('@') {
            errors.push(FieldError::new("username", "Username cannot contain spaces or '@'"));
        }

        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        } else {
            errors.extend(password_errors(&self.password, password));
        }

        if let Some(confirm) = &self.confirm_password
            && *confirm != self.password
        {
            errors.push(FieldError::new("confirm_password", "Passwords do not match"));
        }

        let email = non_blank(&self.email).map(|e| normalize_email(&e));
        if let Some(email) = &email
            && !looks_like_email(email)
        {
            errors.push(FieldError::new("email", "Email address is not valid"));
        }

        let avatar_url = non_blank(&self.avatar_url);
        if let Some(avatar) = &avatar_url
            && !Url::parse(avatar).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
        {
            errors.push(FieldError::new("avatar_url", "Avatar must be an http(s) URL"));
        }

        let role = match non_blank(&self.role) {
            None => Role::Student,
            Some(raw) => match raw.parse::<Role>() {
                Ok(role) => role,
                Err(_) => {
                    errors.push(FieldError::new("role", "Role must be student, instructor or admin"));
                    Role::Student
                }
            },
        };
        if role.is_staff() {
            match (&signup.staff_passcode, non_blank(&self.passcode)) {
                (None, _) => errors.push(FieldError::new("role", "Staff signup is not available")),
                (Some(expected), Some(given)) if *expected == given => {}
                (Some(_), _) => errors.push(FieldError::new("passcode", "Incorrect staff passcode")),
            }
        }

        if !errors.is_empty() {
            return Err(Error::Validation { errors });
        }

        Ok(ValidatedSignup {
            username: username.to_string(),
            password: self.password.clone(),
            email,
            first_name: non_blank(&self.first_name),
            last_name: non_blank(&self.last_name),
            avatar_url,
            role,
        })
    }
}

/// Request to login with a username or email address
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username, or email address when it contains `@`
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// Response after successful signup
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub message: String,
}

/// Response body after a successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginBody {
    /// Session token, also set as the session cookie
    pub token: String,
    pub user: UserResponse,
    pub message: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// The caller's verified session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub role: Role,
}

/// Which sign-in methods are on offer
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    pub credentials: bool,
    pub registration: bool,
    pub oauth: Vec<String>,
}

/// Structured response for successful signup
pub struct SignupResponse {
    pub auth_response: AuthResponse,
}

impl IntoResponse for SignupResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.auth_response)).into_response()
    }
}

/// Structured response for successful login
pub struct LoginResponse {
    pub body: LoginBody,
    pub cookie: HeaderValue,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, self.cookie);
        (StatusCode::OK, headers, Json(self.body)).into_response()
    }
}

/// Structured response for successful logout
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: HeaderValue,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, self.cookie);
        (StatusCode::OK, headers, Json(self.auth_response)).into_response()
    }
}
