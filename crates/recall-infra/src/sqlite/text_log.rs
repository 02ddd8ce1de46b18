//! SQLite text log implementation.
//!
//! Implements `TextLog` from `recall-core`. One table,
//! `memories(memory_id INTEGER PRIMARY KEY AUTOINCREMENT, origin_text TEXT NOT NULL)`;
//! `AUTOINCREMENT` keeps ids unique even after the compensating delete.

use std::path::{Path, PathBuf};

use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info};

use recall_core::memory::text_log::TextLog;
use recall_types::error::StoreError;

use super::pool::DatabasePool;

const CREATE_MEMORIES_TABLE: &str = r#"CREATE TABLE memories (
    memory_id INTEGER PRIMARY KEY AUTOINCREMENT,
    origin_text TEXT NOT NULL
)"#;

/// SQLite-backed implementation of `TextLog`, bound to one database file.
pub struct SqliteTextLog {
    path: PathBuf,
    pool: RwLock<Option<DatabasePool>>,
}

impl SqliteTextLog {
    /// Create a text log for the file at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn pool(&self) -> Result<DatabasePool, StoreError> {
        self.pool.read().await.clone().ok_or_else(|| {
            StoreError::Connection(format!("text log {} is not open", self.path.display()))
        })
    }

    /// The database file plus its WAL and shared-memory siblings.
    fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        for suffix in ["-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }
        files
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

impl TextLog for SqliteTextLog {
    async fn open(&self) -> Result<(), StoreError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Connection(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let pool = DatabasePool::open(&self.path).await.map_err(|e| {
            StoreError::Connection(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        *guard = Some(pool);

        debug!(path = %self.path.display(), "text log opened");
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }

        for file in self.files() {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => debug!(path = %file.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StoreError::Connection(format!(
                        "Failed to remove {}: {e}",
                        file.display()
                    )));
                }
            }
        }

        info!(path = %self.path.display(), "text log destroyed");
        Ok(())
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        if self.schema_exists().await? {
            return Err(StoreError::Conflict("table memories already exists".to_string()));
        }

        sqlx::query(CREATE_MEMORIES_TABLE)
            .execute(&pool.writer)
            .await
            .map_err(query_err)?;

        info!("memories table created");
        Ok(())
    }

    async fn schema_exists(&self) -> Result<bool, StoreError> {
        let pool = self.pool().await?;
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'memories'",
        )
        .fetch_one(&pool.writer)
        .await
        .map_err(query_err)?;
        Ok(existing > 0)
    }

    async fn insert(&self, text: &str) -> Result<i64, StoreError> {
        let pool = self.pool().await?;
        let result = sqlx::query("INSERT INTO memories (origin_text) VALUES (?)")
            .bind(text)
            .execute(&pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_batch(&self, texts: &[String]) -> Result<Vec<i64>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_err)?;

        let mut ids = Vec::with_capacity(texts.len());
        for text in texts {
            let result = sqlx::query("INSERT INTO memories (origin_text) VALUES (?)")
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await.map_err(query_err)?;
        debug!(count = ids.len(), "texts appended");
        Ok(ids)
    }

    async fn lookup(&self, id: i64) -> Result<String, StoreError> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT origin_text FROM memories WHERE memory_id = ?")
            .bind(id)
            .fetch_optional(&pool.reader)
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound)?;

        row.try_get("origin_text").map_err(query_err)
    }

    async fn discard(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_err)?;
        for id in ids {
            sqlx::query("DELETE FROM memories WHERE memory_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }
        tx.commit().await.map_err(query_err)?;

        debug!(count = ids.len(), "text rows discarded");
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<i64>, StoreError> {
        let pool = self.pool().await?;
        sqlx::query_scalar("SELECT memory_id FROM memories ORDER BY memory_id")
            .fetch_all(&pool.reader)
            .await
            .map_err(query_err)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_log(dir: &tempfile::TempDir) -> SqliteTextLog {
        let log = SqliteTextLog::new(dir.path().join("mydb.sqlite"));
        log.open().await.unwrap();
        log.create_schema().await.unwrap();
        log
    }

    #[tokio::test]
    async fn test_operations_before_open_fail() {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteTextLog::new(dir.path().join("mydb.sqlite"));

        assert!(matches!(log.insert("x").await, Err(StoreError::Connection(_))));
        assert!(matches!(log.lookup(1).await, Err(StoreError::Connection(_))));
        assert!(matches!(log.create_schema().await, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_create_schema_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        assert!(matches!(log.create_schema().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;

        let id = log.insert("I can sing").await.unwrap();
        assert_eq!(log.lookup(id).await.unwrap(), "I can sing");
        assert!(matches!(log.lookup(id + 100).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_insert_batch_returns_ids_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;

        let texts = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let ids = log.insert_batch(&texts).await.unwrap();

        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for (id, text) in ids.iter().zip(&texts) {
            assert_eq!(&log.lookup(*id).await.unwrap(), text);
        }
        assert_eq!(log.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_discard_removes_rows_and_ids_stay_unique() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;

        let ids = log
            .insert_batch(&["keep".to_string(), "drop".to_string()])
            .await
            .unwrap();
        log.discard(&ids[1..]).await.unwrap();
        assert_eq!(log.ids().await.unwrap(), vec![ids[0]]);

        // AUTOINCREMENT never reuses the discarded id
        let next = log.insert("later").await.unwrap();
        assert!(next > ids[1]);
    }

    #[tokio::test]
    async fn test_schema_exists_tracks_create_and_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteTextLog::new(dir.path().join("mydb.sqlite"));
        log.open().await.unwrap();
        assert!(!log.schema_exists().await.unwrap());

        log.create_schema().await.unwrap();
        assert!(log.schema_exists().await.unwrap());

        log.destroy().await.unwrap();
        log.open().await.unwrap();
        assert!(!log.schema_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_without_schema_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteTextLog::new(dir.path().join("mydb.sqlite"));
        log.open().await.unwrap();

        assert!(matches!(log.insert("x").await, Err(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_destroy_removes_file_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        log.insert("gone soon").await.unwrap();

        log.destroy().await.unwrap();
        assert!(!log.path().exists());
        assert!(matches!(log.count().await, Err(StoreError::Connection(_))));

        // Destroying again is fine
        log.destroy().await.unwrap();

        log.open().await.unwrap();
        log.create_schema().await.unwrap();
        assert_eq!(log.count().await.unwrap(), 0);
        assert_eq!(log.insert("fresh").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mydb.sqlite");
        {
            let log = SqliteTextLog::new(&path);
            log.open().await.unwrap();
            log.create_schema().await.unwrap();
            log.insert("durable").await.unwrap();
            log.pool().await.unwrap().close().await;
        }

        let log = SqliteTextLog::new(&path);
        log.open().await.unwrap();
        assert_eq!(log.lookup(1).await.unwrap(), "durable");
    }
}
