use std::sync::Arc;

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::{Clock, StoreError};

/// Most snippets [`SnippetStore::latest`] returns.
pub const LATEST_LIMIT: i64 = 10;

/// A text post with a bounded visibility window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Snippet {
    /// Live while `now` is strictly before `expires`.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires
    }
}

/// Row shape; timestamps are Unix seconds.
#[derive(FromRow)]
struct SnippetRow {
    id: i64,
    title: String,
    content: String,
    created: i64,
    expires: i64,
}

impl TryFrom<SnippetRow> for Snippet {
    type Error = sqlx::Error;

    fn try_from(row: SnippetRow) -> Result<Self, Self::Error> {
        let ts = |secs| OffsetDateTime::from_unix_timestamp(secs).map_err(|e| sqlx::Error::Decode(Box::new(e)));
        Ok(Self {
            id: row.id,
            title: row.title,
            content: row.content,
            created: ts(row.created)?,
            expires: ts(row.expires)?,
        })
    }
}

#[derive(Clone)]
pub struct SnippetStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SnippetStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Store a snippet that stays live for `expiry_days` from now and return
    /// its id. Title and content are stored as given.
    ///
    /// An expiry past the representable calendar is refused before anything
    /// is written; such a row could never be read back.
    pub async fn insert(&self, title: &str, content: &str, expiry_days: i64) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let created = now.unix_timestamp();
        let expires = expiry_days
            .checked_mul(Duration::DAY.whole_seconds())
            .and_then(|secs| now.checked_add(Duration::seconds(secs)))
            .ok_or(StoreError::ExpiryOutOfRange { days: expiry_days })?
            .unix_timestamp();

        let id = sqlx::query(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(created)
        .bind(expires)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(id, expiry_days, "snippet inserted");
        Ok(id)
    }

    /// The snippet with `id`, if it exists and is still live.
    pub async fn get(&self, id: i64) -> Result<Snippet, StoreError> {
        let row = sqlx::query_as::<_, SnippetRow>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > ? AND id = ?
            "#,
        )
        .bind(self.clock.now().unix_timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(StoreError::NoRecord)?;
        Ok(Snippet::try_from(row)?)
    }

    /// Up to [`LATEST_LIMIT`] live snippets, newest first.
    pub async fn latest(&self) -> Result<Vec<Snippet>, StoreError> {
        let rows = sqlx::query_as::<_, SnippetRow>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > ?
            ORDER BY created DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(self.clock.now().unix_timestamp())
        .bind(LATEST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Snippet::try_from(row).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::store::{memory_pool, ManualClock};

    const T0: OffsetDateTime = datetime!(2024-06-01 09:30:00 UTC);

    async fn store() -> (SnippetStore, Arc<ManualClock>) {
        let pool = memory_pool().await.expect("in-memory database");
        let clock = Arc::new(ManualClock::new(T0));
        (SnippetStore::new(pool, clock.clone()), clock)
    }

    #[tokio::test]
    async fn insert_then_get_until_expiry() {
        let (store, clock) = store().await;

        let id = store.insert("Test", "Body", 7).await.unwrap();
        assert_eq!(id, 1);

        clock.advance(Duration::seconds(1));
        let snippet = store.get(id).await.unwrap();
        assert_eq!(snippet.title, "Test");
        assert_eq!(snippet.content, "Body");
        assert_eq!(snippet.created, T0);
        assert_eq!(snippet.expires - snippet.created, Duration::days(7));

        clock.set(T0 + Duration::days(7) + Duration::seconds(1));
        assert!(matches!(store.get(id).await, Err(StoreError::NoRecord)));
    }

    #[tokio::test]
    async fn snippet_is_dead_at_the_exact_expiry_instant() {
        let (store, clock) = store().await;
        let id = store.insert("edge", "case", 1).await.unwrap();

        clock.set(T0 + Duration::days(1) - Duration::seconds(1));
        assert!(store.get(id).await.is_ok());
        clock.set(T0 + Duration::days(1));
        assert!(matches!(store.get(id).await, Err(StoreError::NoRecord)));
        assert!(store.latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_no_record() {
        let (store, _clock) = store().await;
        assert!(matches!(store.get(404).await, Err(StoreError::NoRecord)));
    }

    #[tokio::test]
    async fn latest_is_capped_sorted_and_live_only() {
        let (store, clock) = store().await;
        for i in 0..20 {
            // every third snippet only lives one day
            let days = if i % 3 == 0 { 1 } else { 30 };
            store.insert(&format!("s{i}"), "body", days).await.unwrap();
            clock.advance(Duration::minutes(5));
        }
        clock.advance(Duration::days(2));

        let latest = store.latest().await.unwrap();
        let now = clock.now();
        assert_eq!(latest.len(), LATEST_LIMIT as usize);
        assert!(latest.iter().all(|s| s.is_live_at(now)));
        assert!(latest.windows(2).all(|w| w[0].created >= w[1].created));
        assert_eq!(latest[0].title, "s19");
    }

    #[tokio::test]
    async fn latest_on_empty_store_is_empty() {
        let (store, _clock) = store().await;
        assert!(store.latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_positive_expiry_is_refused_by_the_schema() {
        let (store, _clock) = store().await;
        let err = store.insert("never", "live", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(store.latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrepresentable_expiry_is_refused_without_a_row() {
        let (store, _clock) = store().await;
        let ok = store.insert("ok", "body", 7).await.unwrap();

        for days in [4_000_000, i64::MAX] {
            assert!(matches!(
                store.insert("huge", "body", days).await,
                Err(StoreError::ExpiryOutOfRange { days: d }) if d == days
            ));
        }

        assert_eq!(store.get(ok).await.unwrap().title, "ok");
        let latest = store.latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, ok);
    }

    #[tokio::test]
    async fn storage_faults_propagate() {
        let (store, _clock) = store().await;
        store.pool.close().await;

        assert!(matches!(store.insert("a", "b", 1).await, Err(StoreError::Persistence(_))));
        assert!(matches!(store.get(1).await, Err(StoreError::Persistence(_))));
        assert!(matches!(store.latest().await, Err(StoreError::Persistence(_))));
    }
}
