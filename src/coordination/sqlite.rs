//! SQLite-backed coordination store.
//!
//! Nodes live in a single table keyed by path with an explicit `version`
//! column; every conditional write is one `UPDATE ... WHERE version = ?`
//! statement, so SQLite's write lock gives the compare-and-swap its
//! atomicity. Ephemeral nodes record the owning session. Each session runs a
//! background heartbeat at a third of the timeout for as long as the handle
//! is open; sessions whose heartbeat is older than the timeout are reaped
//! together with their ephemeral nodes.
//!
//! The database uses WAL journaling, which needs shared memory between the
//! processes using it. Every worker and initiator must therefore run on the
//! host that holds the database file; it cannot sit on a network filesystem.

use super::traits::*;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS nodes (
        path TEXT PRIMARY KEY NOT NULL,
        parent TEXT,
        data BLOB NOT NULL,
        version INTEGER NOT NULL,
        owner TEXT
    )",
    "CREATE INDEX IF NOT EXISTS nodes_parent ON nodes (parent)",
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY NOT NULL,
        heartbeat INTEGER NOT NULL
    )",
];

/// Coordination store persisted in a SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
    session: String,
    session_timeout: Duration,
    heartbeat: JoinHandle<()>,
}

fn unavailable(err: sqlx::Error) -> CoordError {
    CoordError::Unavailable(err.to_string())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Keep `session` alive until its handle closes or it is reaped.
async fn heartbeat(pool: SqlitePool, session: String, period: Duration) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(100)));
    loop {
        ticker.tick().await;
        let result = sqlx::query("UPDATE sessions SET heartbeat = ? WHERE id = ?")
            .bind(now_secs())
            .bind(&session)
            .execute(&pool)
            .await;
        match result {
            Ok(r) if r.rows_affected() == 0 => {
                warn!(session = %session, "ledger session expired, heartbeat stopped");
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(session = %session, error = %e, "ledger heartbeat failed"),
        }
    }
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite:///var/lib/blockshred/ledger.db`),
    /// creating the database and schema if needed, and open a new session.
    pub async fn connect(url: &str, session_timeout: Duration) -> CoordResult<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CoordError::InvalidEndpoint(format!("{}: {}", url, e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database exists per connection, so pin it to one.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(unavailable)?;
        }

        let session = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (id, heartbeat) VALUES (?, ?)")
            .bind(&session)
            .bind(now_secs())
            .execute(&pool)
            .await
            .map_err(unavailable)?;

        let heartbeat = tokio::spawn(heartbeat(
            pool.clone(),
            session.clone(),
            session_timeout / 3,
        ));
        let store = Self {
            pool,
            session,
            session_timeout,
            heartbeat,
        };
        store.reap_expired().await?;

        debug!(session = %store.session, "opened ledger session");
        Ok(store)
    }

    /// This handle's session identifier.
    pub fn session_id(&self) -> &str {
        &self.session
    }

    /// Refresh this session's heartbeat. Fails if the session was reaped.
    async fn touch(&self) -> CoordResult<()> {
        let result = sqlx::query("UPDATE sessions SET heartbeat = ? WHERE id = ?")
            .bind(now_secs())
            .bind(&self.session)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        if result.rows_affected() == 0 {
            return Err(CoordError::Unavailable(format!(
                "session {} expired",
                self.session
            )));
        }
        Ok(())
    }

    /// Remove sessions whose heartbeat is older than the timeout, and their
    /// ephemeral nodes.
    async fn reap_expired(&self) -> CoordResult<()> {
        let cutoff = now_secs() - self.session_timeout.as_secs() as i64;
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let reaped = sqlx::query(
            "DELETE FROM nodes WHERE owner IN (SELECT id FROM sessions WHERE heartbeat < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?
        .rows_affected();
        sqlx::query("DELETE FROM sessions WHERE heartbeat < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;

        if reaped > 0 {
            debug!(reaped, "dropped ephemeral nodes of expired sessions");
        }
        Ok(())
    }

    async fn current_version(&self, path: &str) -> CoordResult<Option<Version>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM nodes WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.map(|(v,)| v as Version))
    }
}

#[async_trait]
impl CoordinationStore for SqliteStore {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()> {
        validate_path(path)?;
        self.touch().await?;

        let owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(self.session.clone()),
        };

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for ancestor in ancestors(path) {
            sqlx::query(
                "INSERT OR IGNORE INTO nodes (path, parent, data, version, owner) \
                 VALUES (?, ?, x'', 0, NULL)",
            )
            .bind(ancestor)
            .bind(parent_path(ancestor))
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        let inserted = sqlx::query(
            "INSERT INTO nodes (path, parent, data, version, owner) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(path)
        .bind(parent_path(path))
        .bind(data)
        .bind(owner)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(CoordError::NodeExists(path.to_string()));
            }
            Err(e) => return Err(unavailable(e)),
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, path: &str) -> CoordResult<Option<NodeData>> {
        validate_path(path)?;
        self.touch().await?;
        self.reap_expired().await?;

        let row: Option<(Vec<u8>, i64, Option<String>)> =
            sqlx::query_as("SELECT data, version, owner FROM nodes WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(row.map(|(data, version, owner)| NodeData {
            data,
            version: version as Version,
            ephemeral: owner.is_some(),
        }))
    }

    async fn set(&self, path: &str, data: &[u8], expected: Version) -> CoordResult<Version> {
        validate_path(path)?;
        self.touch().await?;

        let result =
            sqlx::query("UPDATE nodes SET data = ?, version = version + 1 WHERE path = ? AND version = ?")
                .bind(data)
                .bind(path)
                .bind(expected as i64)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;

        if result.rows_affected() == 1 {
            return Ok(expected + 1);
        }
        match self.current_version(path).await? {
            None => Err(CoordError::NoNode(path.to_string())),
            Some(actual) => Err(CoordError::BadVersion {
                path: path.to_string(),
                expected,
                actual,
            }),
        }
    }

    async fn delete(&self, path: &str, expected: Option<Version>) -> CoordResult<()> {
        validate_path(path)?;
        self.touch().await?;

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM nodes WHERE path = ?")
            .bind(path)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?;
        let actual = match row {
            None => return Err(CoordError::NoNode(path.to_string())),
            Some((v,)) => v as Version,
        };
        if let Some(expected) = expected {
            if expected != actual {
                return Err(CoordError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual,
                });
            }
        }

        let (children,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes WHERE parent = ?")
            .bind(path)
            .fetch_one(&mut *tx)
            .await
            .map_err(unavailable)?;
        if children > 0 {
            return Err(CoordError::NotEmpty(path.to_string()));
        }

        sqlx::query("DELETE FROM nodes WHERE path = ? AND version = ?")
            .bind(path)
            .bind(actual as i64)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        validate_path(path)?;
        self.touch().await?;
        self.reap_expired().await?;

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM nodes WHERE parent = ? ORDER BY path")
                .bind(path)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;

        let prefix = format!("{}/", path);
        Ok(rows
            .into_iter()
            .filter_map(|(child,)| child.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn close(&self) -> CoordResult<()> {
        self.heartbeat.abort();
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("DELETE FROM nodes WHERE owner = ?")
            .bind(&self.session)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(&self.session)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;
        debug!(session = %self.session, "closed ledger session");
        Ok(())
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn file_store(dir: &TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        SqliteStore::connect(&url, Duration::from_secs(60))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_create_get_set() {
        let store = SqliteStore::connect("sqlite::memory:", Duration::from_secs(60))
            .await
            .unwrap();

        store
            .create("/shred/dn-01/blk_1", b"entry", CreateMode::Persistent)
            .await
            .unwrap();
        let node = store.get("/shred/dn-01/blk_1").await.unwrap().unwrap();
        assert_eq!(node.data, b"entry");
        assert_eq!(node.version, 0);

        assert_eq!(store.set("/shred/dn-01/blk_1", b"v1", 0).await.unwrap(), 1);
        assert!(matches!(
            store.set("/shred/dn-01/blk_1", b"stale", 0).await,
            Err(CoordError::BadVersion { actual: 1, .. })
        ));
        assert!(matches!(
            store.set("/shred/dn-01/missing", b"x", 0).await,
            Err(CoordError::NoNode(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_node_exists() {
        let store = SqliteStore::connect("sqlite::memory:", Duration::from_secs(60))
            .await
            .unwrap();
        store.create("/a", b"", CreateMode::Persistent).await.unwrap();
        assert_eq!(
            store.create("/a", b"", CreateMode::Persistent).await,
            Err(CoordError::NodeExists("/a".into()))
        );
    }

    #[tokio::test]
    async fn test_sqlite_children_and_delete() {
        let store = SqliteStore::connect("sqlite::memory:", Duration::from_secs(60))
            .await
            .unwrap();
        store.create("/r/b", b"", CreateMode::Persistent).await.unwrap();
        store.create("/r/a/x", b"", CreateMode::Persistent).await.unwrap();

        assert_eq!(store.children("/r").await.unwrap(), vec!["a", "b"]);
        assert!(matches!(
            store.delete("/r/a", None).await,
            Err(CoordError::NotEmpty(_))
        ));
        store.delete("/r/a/x", Some(0)).await.unwrap();
        store.delete("/r/a", None).await.unwrap();
        assert_eq!(store.children("/r").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_idle_session_keeps_its_ephemerals() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let busy = SqliteStore::connect(&url, Duration::from_secs(1)).await.unwrap();
        let other = SqliteStore::connect(&url, Duration::from_secs(1)).await.unwrap();

        busy.create("/shred/dn-01/blk_1/lease", b"run", CreateMode::Ephemeral)
            .await
            .unwrap();
        busy.create("/shred/dn-01/blk_2", b"v0", CreateMode::Persistent)
            .await
            .unwrap();

        // Long erase: no ledger calls from this session for a while
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(other.get("/shred/dn-01/blk_1/lease").await.unwrap().is_some());
        assert_eq!(busy.set("/shred/dn-01/blk_2", b"v1", 0).await.unwrap(), 1);

        busy.close().await.unwrap();
        assert!(!other.exists("/shred/dn-01/blk_1/lease").await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_url_is_invalid_endpoint() {
        let result = SqliteStore::connect("sqlite://?mode=bogus", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CoordError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_sqlite_sessions_share_file_and_own_ephemerals() {
        let dir = TempDir::new().unwrap();
        let first = file_store(&dir).await;
        let second = file_store(&dir).await;

        first
            .create("/shred/dn-01/blk_1/lease", b"run", CreateMode::Ephemeral)
            .await
            .unwrap();
        assert!(second.exists("/shred/dn-01/blk_1/lease").await.unwrap());

        first.close().await.unwrap();
        assert!(!second.exists("/shred/dn-01/blk_1/lease").await.unwrap());
        // The persistent parent survives
        assert!(second.exists("/shred/dn-01/blk_1").await.unwrap());
    }
}
