//! Database record models matching table schemas.
//!
//! Database models are kept apart from API models; [`users::UserRecord`] converts into
//! [`crate::api::models::users::UserResponse`], which drops the password hash.

pub mod users;
