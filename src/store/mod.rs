//! Persistence for snippets and users.
//!
//! Each store wraps a shared [`SqlitePool`]; operations borrow a connection
//! for exactly one query (or one statement) and give it back on every exit
//! path. Uniqueness and atomicity are left to the database: the stores never
//! read-then-write to enforce an invariant.

mod clock;
mod password;
mod snippets;
mod users;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use clock::{Clock, ManualClock, SystemClock};
pub use password::{Argon2Hasher, HashError, PasswordHasher};
pub use snippets::{Snippet, SnippetStore, LATEST_LIMIT};
pub use users::{User, UserStore};

/// Errors surfaced across the store/handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Absent, or (for snippets) past its expiry. The two are not distinguished.
    #[error("no matching record found")]
    NoRecord,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("expiry of {days} days is outside the supported date range")]
    ExpiryOutOfRange { days: i64 },
    #[error("duplicate value for unique field `{field}`")]
    DuplicateEmail { field: &'static str },
    /// Connection loss, unexpected constraint violations, decode failures.
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hashing(#[from] HashError),
}

/// Open a pool for `url`, creating the database file when missing.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    info!(url, max_connections, "database pool ready");
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// A single-connection in-memory database with the schema applied.
///
/// In-memory SQLite lives and dies with its connection, so the pool is
/// pinned to one connection that is never recycled.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}
