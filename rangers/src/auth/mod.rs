//! Authentication and session guarding.
//!
//! # Flow
//!
//! ```text
//! login:    identifier + password ─► credentials ─► session (issue) ─► token (JSON + cookie)
//! request:  cookie / bearer token ─► session (read) ─► guard ─► page or redirect to /login
//! ```
//!
//! Sessions are signed JWTs carrying `{sub, role, iat, exp}`; nothing is stored server-side, so
//! logging out clears the cookie and expiry does the rest.
//!
//! # Modules
//!
//! - [`credentials`]: Identifier + password verification against the user store
//! - [`password`]: Argon2id hashing and verification
//! - [`session`]: Token issuing and reading
//! - [`guard`]: Pre-routing middleware protecting page prefixes
//! - [`current_user`]: Extractor for the verified session in handlers
//! - [`oauth`]: Mapping identity provider profiles to accounts
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use rangers::auth::current_user::CurrentSession;
//!
//! async fn whoami(CurrentSession(claims): CurrentSession) -> String {
//!     format!("{} ({})", claims.sub, claims.role)
//! }
//! ```

pub mod credentials;
pub mod current_user;
pub mod guard;
pub mod oauth;
pub mod password;
pub mod session;
