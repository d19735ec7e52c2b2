//! HTTP request handlers.
//!
//! - [`auth`]: Signup, login, logout, session and provider endpoints under `/api/auth`
//! - [`pages`]: Server-rendered pages; the protected ones sit behind the route guard
//!
//! Handlers return [`crate::errors::Error`], which converts to the right status code and body.

pub mod auth;
pub mod pages;
