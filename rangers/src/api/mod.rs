//! HTTP surface: JSON endpoints under `/api` and the server-rendered pages.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! The JSON API is documented with `utoipa`; the document is served at `/api/openapi.json`.

pub mod handlers;
pub mod models;
