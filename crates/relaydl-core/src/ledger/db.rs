//! Connection, migrations, snapshot publishing and timestamp helpers.
//! Entry CRUD lives in `entries`.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Mutex};

use super::types::LedgerEntry;

/// Handle to the history database. Cheap to clone; clones share the pool,
/// the writer lock and the published snapshot.
///
/// Stored at `~/.local/state/relaydl/history.db`.
#[derive(Clone)]
pub struct Ledger {
    pub(crate) pool: Pool<Sqlite>,
    pub(super) write_lock: Arc<Mutex<()>>,
    snapshot: Arc<watch::Sender<Vec<LedgerEntry>>>,
}

impl Ledger {
    /// Open (or create) the default history database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let path = crate::config::state_dir()?.join("history.db");
        Self::open_at(path).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("open ledger {}", path.display()))?;
        Self::from_pool(pool).await
    }

    /// In-memory database (tests, throwaway embedders). One connection that never expires,
    /// since each SQLite memory connection is its own database.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let (tx, _rx) = watch::channel(Vec::new());
        let ledger = Ledger {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            snapshot: Arc::new(tx),
        };
        ledger.migrate().await?;
        ledger.publish().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                uploader TEXT NOT NULL,
                url TEXT NOT NULL,
                thumbnail TEXT,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                artifact_location TEXT,
                is_audio INTEGER NOT NULL DEFAULT 0,
                job_token TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS history_job_token ON history (job_token)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Republish after a committed write. The write already stands, so a failed
    /// refresh is logged and observers keep the previous snapshot.
    pub(super) async fn publish_committed(&self) {
        if let Err(e) = self.publish().await {
            tracing::warn!("ledger snapshot refresh failed after commit: {:#}", e);
        }
    }

    /// Re-read the ordered set and push it to observers. Called with the writer lock held.
    pub(super) async fn publish(&self) -> Result<()> {
        let entries = self.list().await?;
        self.snapshot.send_replace(entries);
        Ok(())
    }

    /// Live, most-recent-first view of all entries. The receiver holds the current
    /// snapshot immediately and is notified after every mutation.
    pub fn observe_all(&self) -> watch::Receiver<Vec<LedgerEntry>> {
        self.snapshot.subscribe()
    }
}

/// Current time as Unix milliseconds (for `created_at`).
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
