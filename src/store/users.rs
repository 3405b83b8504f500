use std::sync::Arc;

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::debug;

use super::{Clock, HashError, PasswordHasher, StoreError};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub activated: bool,
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    hashed_password: Vec<u8>,
    created: i64,
    activated: bool,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            hashed_password: row.hashed_password,
            created: OffsetDateTime::from_unix_timestamp(row.created)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            activated: row.activated,
        })
    }
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { pool, clock, hasher }
    }

    /// Register a user and return the new id.
    ///
    /// Email uniqueness is enforced by the `users_uc_email` constraint, so two
    /// concurrent registrations for one address cannot both succeed.
    pub async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, StoreError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashError(e.to_string()))??;

        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(hashed)
        .bind(self.clock.now().unix_timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                debug!(id, "user inserted");
                Ok(id)
            }
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() && db.message().contains("email") => {
                Err(StoreError::DuplicateEmail { field: "email" })
            }
            Err(e) => Err(StoreError::Persistence(e)),
        }
    }

    /// The id of the user owning `email` if `password` matches.
    ///
    /// An unknown address and a wrong password fail identically.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError> {
        let row: Option<(i64, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, hashed_password
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, hashed)) = row else {
            return Err(StoreError::InvalidCredentials);
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&hashed, &password))
            .await
            .map_err(|e| HashError(e.to_string()))?;

        if matches { Ok(id) } else { Err(StoreError::InvalidCredentials) }
    }

    pub async fn get(&self, id: i64) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, hashed_password, created, activated
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(StoreError::NoRecord)?;
        Ok(User::try_from(row)?)
    }
}
