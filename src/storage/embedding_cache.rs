//! Persistent Embedding Cache
//!
//! SQLite store of chunk embeddings keyed by (model, chunk sha256), so
//! rebuilding the index over an unchanged corpus does not re-embed:
//! - Connection pooling via r2d2
//! - WAL mode for concurrent readers
//! - Batched writes inside one transaction

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{PaperdocError, Result, ResultExt};

/// Shared cache handle for async contexts.
pub type SharedEmbeddingCache = Arc<EmbeddingCache>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    model TEXT NOT NULL,
    chunk_hash TEXT NOT NULL,
    dims INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (model, chunk_hash)
);
"#;

/// Current schema version
const SCHEMA_VERSION: u32 = 1;

const MAX_POOL_SIZE: u32 = 4;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Embedding cache backed by a pooled SQLite database.
pub struct EmbeddingCache {
    pool: Pool<SqliteConnectionManager>,
}

impl EmbeddingCache {
    /// Open (creating if needed) the cache at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(MAX_POOL_SIZE)
            .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .build(manager)
            .map_err(|e| {
                PaperdocError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        let cache = Self { pool };
        cache.initialize()?;
        Ok(cache)
    }

    /// Open an in-memory cache for testing.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| {
            PaperdocError::Storage(format!("Failed to create in-memory pool: {}", e))
        })?;

        let cache = Self { pool };
        cache.initialize()?;
        Ok(cache)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            PaperdocError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize embedding cache schema")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .with_context("Failed to set schema version")?;
        Ok(())
    }

    /// Look up one cached vector.
    pub fn get(&self, model: &str, chunk_hash: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE model = ?1 AND chunk_hash = ?2",
                params![model, chunk_hash],
                |row| row.get(0),
            )
            .optional()
            .with_context("Failed to read cached embedding")?;
        Ok(blob.map(|b| decode_vector(&b)))
    }

    /// Look up many vectors at once; misses are absent from the map.
    pub fn get_many(&self, model: &str, hashes: &[&str]) -> Result<HashMap<String, Vec<f32>>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached("SELECT vector FROM embeddings WHERE model = ?1 AND chunk_hash = ?2")
            .with_context("Failed to prepare embedding lookup")?;

        let mut found = HashMap::new();
        for hash in hashes {
            let blob: Option<Vec<u8>> = stmt
                .query_row(params![model, hash], |row| row.get(0))
                .optional()
                .with_context("Failed to read cached embedding")?;
            if let Some(blob) = blob {
                found.insert((*hash).to_string(), decode_vector(&blob));
            }
        }
        Ok(found)
    }

    /// Store vectors atomically; existing entries are replaced.
    pub fn put_many(&self, model: &str, entries: &[(&str, &[f32])]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR REPLACE INTO embeddings (model, chunk_hash, dims, vector, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .with_context("Failed to prepare embedding insert")?;
            for (hash, vector) in entries {
                stmt.execute(params![
                    model,
                    hash,
                    vector.len() as i64,
                    encode_vector(vector),
                    now
                ])
                .with_context("Failed to store embedding")?;
            }
        }
        tx.commit().with_context("Failed to commit transaction")?;

        tracing::debug!(model = %model, count = entries.len(), "Cached embeddings");
        Ok(entries.len())
    }

    /// Number of cached vectors for a model.
    pub fn count(&self, model: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM embeddings WHERE model = ?1",
                params![model],
                |row| row.get(0),
            )
            .with_context("Failed to count embeddings")?;
        Ok(count as usize)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get_roundtrip() {
        let cache = EmbeddingCache::open_in_memory().expect("Failed to open cache");
        let v = vec![0.25f32, -1.5, 3.0];
        cache.put_many("nomic", &[("abc", &v)]).unwrap();

        assert_eq!(cache.get("nomic", "abc").unwrap(), Some(v));
        assert_eq!(cache.get("other-model", "abc").unwrap(), None);
        assert_eq!(cache.count("nomic").unwrap(), 1);
    }

    #[test]
    fn test_get_many_reports_only_hits() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache
            .put_many("m", &[("a", &[1.0]), ("b", &[2.0])])
            .unwrap();

        let found = cache.get_many("m", &["a", "c"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], vec![1.0]);
    }

    #[test]
    fn test_replace_does_not_duplicate() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache.put_many("m", &[("a", &[1.0])]).unwrap();
        cache.put_many("m", &[("a", &[2.0])]).unwrap();

        assert_eq!(cache.count("m").unwrap(), 1);
        assert_eq!(cache.get("m", "a").unwrap(), Some(vec![2.0]));
    }

    #[test]
    fn test_file_cache_persists_across_opens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache/embeddings.db");

        {
            let cache = EmbeddingCache::open(&path).unwrap();
            cache.put_many("m", &[("h", &[0.5, 0.5])]).unwrap();
        }

        let cache = EmbeddingCache::open(&path).unwrap();
        assert_eq!(cache.get("m", "h").unwrap(), Some(vec![0.5, 0.5]));
    }
}
