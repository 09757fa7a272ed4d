//! SQLite chunk store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use stream_core::verify_tiling;
use stream_types::FileKey;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::{cutoff_millis, now_millis, Blob, ChunkStore};

/// SQLite result code for a full database or disk.
const SQLITE_FULL: &str = "13";

/// SQLite-backed chunk store.
///
/// Uses WAL mode so staging writes and reassembly reads do not block each
/// other.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: SqlitePool,
    max_bytes: Option<u64>,
}

impl SqliteChunkStore {
    /// Open (or create) a chunk store at `path`.
    pub async fn new(path: &Path) -> StoreResult<Self> {
        let path_str = path.to_str().ok_or_else(|| StoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(path_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            max_bytes: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory chunk store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // every :memory: connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            max_bytes: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Cap the total staged bytes; writes past the cap fail with
    /// `QuotaExceeded`.
    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                file_key TEXT NOT NULL,
                "offset" INTEGER NOT NULL,
                data BLOB NOT NULL,
                written_at INTEGER NOT NULL,
                PRIMARY KEY (file_key, "offset")
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_written_at ON chunks(written_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Map write failures, turning a full medium into `QuotaExceeded`.
fn map_write_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(SQLITE_FULL) {
            return StoreError::QuotaExceeded { limit: 0 };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn put(&self, key: &FileKey, offset: u64, data: &[u8]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(limit) = self.max_bytes {
            let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(LENGTH(data)), 0) FROM chunks")
                .fetch_one(&mut *tx)
                .await?;
            let replaced: i64 = sqlx::query_scalar(
                r#"SELECT COALESCE(SUM(LENGTH(data)), 0) FROM chunks WHERE file_key = ?1 AND "offset" = ?2"#,
            )
            .bind(key.as_str())
            .bind(offset as i64)
            .fetch_one(&mut *tx)
            .await?;

            let after = (total - replaced) as u64 + data.len() as u64;
            if after > limit {
                warn!(key = %key, offset, limit, "chunk store quota exceeded");
                return Err(StoreError::QuotaExceeded { limit });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO chunks (file_key, "offset", data, written_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_key, "offset") DO UPDATE SET data = ?3, written_at = ?4
            "#,
        )
        .bind(key.as_str())
        .bind(offset as i64)
        .bind(data)
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        tx.commit().await.map_err(map_write_err)?;
        Ok(())
    }

    async fn reassemble(
        &self,
        key: &FileKey,
        mime: &str,
        expected_size: u64,
    ) -> StoreResult<Option<Blob>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT "offset", data
            FROM chunks
            WHERE file_key = ?1
            ORDER BY "offset" ASC
            "#,
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        verify_tiling(
            rows.iter()
                .map(|row| (row.offset as u64, row.data.len() as u64)),
            expected_size,
        )
        .map_err(|source| StoreError::Integrity {
            key: key.to_string(),
            source,
        })?;

        let mut data = Vec::with_capacity(expected_size as usize);
        for row in rows {
            data.extend_from_slice(&row.data);
        }
        debug!(key = %key, bytes = data.len(), "reassembled file");

        Ok(Some(Blob {
            mime: mime.to_string(),
            data,
        }))
    }

    async fn clear(&self, key: &FileKey) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE file_key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn evict_older_than(&self, max_age: Duration) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM chunks WHERE file_key IN (
                SELECT file_key FROM chunks
                GROUP BY file_key
                HAVING MAX(written_at) < ?1
            )
            "#,
        )
        .bind(cutoff_millis(max_age))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn chunk_count(&self, key: &FileKey) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_key = ?1")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn staged_bytes(&self, key: &FileKey) -> StoreResult<u64> {
        let size: Option<i64> =
            sqlx::query_scalar("SELECT SUM(LENGTH(data)) FROM chunks WHERE file_key = ?1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(size.unwrap_or(0) as u64)
    }

    async fn total_bytes(&self) -> StoreResult<u64> {
        let size: Option<i64> = sqlx::query_scalar("SELECT SUM(LENGTH(data)) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(size.unwrap_or(0) as u64)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct ChunkRow {
    offset: i64,
    data: Vec<u8>,
}
