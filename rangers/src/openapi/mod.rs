//! OpenAPI documentation for the `/api` surface, served at `/api/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, auth::credentials::AuthenticatedUser, errors::FieldError};

/// Session cookie and bearer token, both carrying the same signed session.
struct SessionSecurityAddon;

impl Modify for SessionSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "SessionCookie".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "rangers_session",
                    "Set by `POST /api/auth/login`. The cookie name is configurable.",
                ))),
            );
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("The `token` returned by `POST /api/auth/login`."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api", description = "Code Rangers API")
    ),
    modifiers(&SessionSecurityAddon),
    paths(
        api::handlers::auth::signup,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::get_session,
        api::handlers::auth::get_providers,
    ),
    components(
        schemas(
            api::models::auth::SignupRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::LoginBody,
            api::models::auth::AuthSuccessResponse,
            api::models::auth::SessionInfo,
            api::models::auth::ProvidersResponse,
            api::models::users::UserResponse,
            api::models::users::Role,
            AuthenticatedUser,
            FieldError,
        )
    ),
    tags(
        (name = "authentication", description = "Signup, login, logout and session inspection."),
    ),
    info(
        title = "Code Rangers API",
        version = "1.0.0",
        description = "Account and session endpoints for the Code Rangers learning platform.

Signup never signs you in; call login afterwards. Login returns the session token in the body and
also sets it as an `HttpOnly` cookie. Pages under the protected prefixes redirect to `/login`
without a valid session.",
    ),
)]
pub struct ApiDoc;
