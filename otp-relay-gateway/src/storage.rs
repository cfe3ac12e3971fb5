/// Provides the SQLite-backed implementation of the `AuthStore` trait
/// defined in the `otp-relay-connector` library.
use crate::error::GatewayError;
use async_trait::async_trait;
use otp_relay_connector::{
    error::StoreError,
    storage::{AuthStore, StoreStats},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS auth_data (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_auth_data_updated_at ON auth_data(updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_auth_data_pattern ON auth_data(id)
        WHERE id LIKE 'pre-key-%' OR id LIKE 'session-%' OR id = 'creds'",
];

const UPSERT: &str = "INSERT INTO auth_data (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at";

/// SQLite limits the number of bound parameters per statement.
const LOOKUP_CHUNK: usize = 500;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed => StoreError::Closed,
        other => StoreError::backend(other),
    }
}

/// A `sqlx`-backed implementation of the `AuthStore` trait.
///
/// A single `auth_data` table holds every record. The database runs in WAL mode
/// so that the controller's writes never block concurrent readers.
#[derive(Clone)]
pub struct SqliteAuthStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteAuthStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "1000")
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.migrate().await?;

        tracing::info!(path = %store.path.display(), "Auth store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rebuilds the database file and refreshes the query planner statistics.
    pub async fn optimize(&self) -> Result<(), GatewayError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        tracing::info!("Auth store optimized");
        Ok(())
    }

    /// Closes every pooled connection. Subsequent writes fail with [`StoreError::Closed`].
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Auth store closed");
    }

    async fn try_put(&self, key: &str, blob: &str) -> Result<(), sqlx::Error> {
        let now = now_millis();
        sqlx::query(UPSERT)
            .bind(key)
            .bind(blob)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_apply_batch(&self, upserts: &[(String, String)], deletions: &[String]) -> Result<(), sqlx::Error> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        for (key, blob) in upserts {
            sqlx::query(UPSERT)
                .bind(key)
                .bind(blob)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        for key in deletions {
            sqlx::query("DELETE FROM auth_data WHERE id = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT data FROM auth_data WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn try_get_batch(&self, keys: &[String]) -> Result<HashMap<String, String>, sqlx::Error> {
        let mut found = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT id, data FROM auth_data WHERE id IN (");
            let mut ids = query.separated(", ");
            for key in chunk {
                ids.push_bind(key.as_str());
            }
            ids.push_unseparated(")");

            let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows);
        }
        Ok(found)
    }

    async fn try_remove(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_data WHERE id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn try_remove_batch(&self, keys: &[String]) -> Result<u64, sqlx::Error> {
        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for key in keys {
            removed += sqlx::query("DELETE FROM auth_data WHERE id = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn try_list_keys(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<String>, sqlx::Error> {
        // A negative LIMIT means "no limit" to SQLite, which OFFSET requires.
        sqlx::query_scalar("SELECT id FROM auth_data ORDER BY updated_at, id LIMIT ? OFFSET ?")
            .bind(limit.map_or(-1, i64::from))
            .bind(offset.map_or(0, i64::from))
            .fetch_all(&self.pool)
            .await
    }

    async fn try_list_keys_by_prefix(&self, pattern: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM auth_data WHERE id LIKE ? ORDER BY updated_at, id")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
    }

    /// Deletes every record. Space is reclaimed afterwards on a best-effort basis:
    /// the records are gone once the DELETE commits, so a failed VACUUM is only logged.
    async fn try_clear_all(&self) -> Result<u64, sqlx::Error> {
        let removed = sqlx::query("DELETE FROM auth_data")
            .execute(&self.pool)
            .await?
            .rows_affected();
        if let Err(e) = sqlx::query("VACUUM").execute(&self.pool).await {
            tracing::warn!(removed, "Records cleared but VACUUM failed: {}", e);
        }
        Ok(removed)
    }

    async fn try_stats(&self) -> Result<StoreStats, sqlx::Error> {
        let total_keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_data")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            total_keys: total_keys.max(0) as u64,
            approximate_byte_size: page_size.saturating_mul(page_count).max(0) as u64,
            storage_location: self.path.display().to_string(),
        })
    }
}

#[async_trait]
impl AuthStore for SqliteAuthStore {
    async fn put(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.try_put(key, blob).await.map_err(store_error)
    }

    async fn put_batch(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.try_apply_batch(entries, &[]).await.map_err(store_error)
    }

    async fn apply_batch(&self, upserts: &[(String, String)], deletions: &[String]) -> Result<(), StoreError> {
        if upserts.is_empty() && deletions.is_empty() {
            return Ok(());
        }
        self.try_apply_batch(upserts, deletions).await.map_err(store_error)
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.try_get(key).await.unwrap_or_else(|e| {
            tracing::error!(key = %key, "Failed to read auth record: {}", e);
            None
        })
    }

    async fn get_batch(&self, keys: &[String]) -> HashMap<String, String> {
        if keys.is_empty() {
            return HashMap::new();
        }
        self.try_get_batch(keys).await.unwrap_or_else(|e| {
            tracing::error!(count = keys.len(), "Failed to read auth records: {}", e);
            HashMap::new()
        })
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.try_remove(key).await.map_err(store_error)
    }

    async fn remove_batch(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.try_remove_batch(keys).await.map_err(store_error)
    }

    async fn list_keys(&self, limit: Option<u32>, offset: Option<u32>) -> Vec<String> {
        self.try_list_keys(limit, offset).await.unwrap_or_else(|e| {
            tracing::error!("Failed to list auth records: {}", e);
            Vec::new()
        })
    }

    async fn list_keys_by_prefix(&self, pattern: &str) -> Vec<String> {
        self.try_list_keys_by_prefix(pattern).await.unwrap_or_else(|e| {
            tracing::error!(pattern = %pattern, "Failed to list auth records: {}", e);
            Vec::new()
        })
    }

    async fn clear_all(&self) -> Result<u64, StoreError> {
        let removed = self.try_clear_all().await.map_err(store_error)?;
        tracing::info!(removed, "Cleared all auth records");
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        self.try_stats().await.unwrap_or_else(|e| {
            tracing::error!("Failed to read auth store statistics: {}", e);
            StoreStats {
                storage_location: self.path.display().to_string(),
                ..StoreStats::default()
            }
        })
    }
}
