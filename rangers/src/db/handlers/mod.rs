//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction and returns models from
//! [`crate::db::models`].
//!
//! # Available Repositories
//!
//! - [`Users`]: User accounts and credential lookups
//!
//! ```ignore
//! use rangers::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Users::new(&mut conn);
//!
//!     if let Some(user) = repo.get_user_by_username("rangerjoe").await? {
//!         println!("Found user: {}", user.id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod repository;
pub mod users;

pub use repository::Repository;
pub use users::Users;
