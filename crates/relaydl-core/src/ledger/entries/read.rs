//! Entry read operations: list, get, search.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::Ledger;
use super::super::types::{EntryId, EntryStatus, LedgerEntry};

const COLUMNS: &str =
    "id, title, uploader, url, thumbnail, created_at, status, artifact_location, is_audio, job_token";

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
    let status: String = row.try_get("status")?;
    let is_audio: i64 = row.try_get("is_audio")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        source_url: row.try_get("url")?,
        title: row.try_get("title")?,
        uploader: row.try_get("uploader")?,
        thumbnail: row.try_get("thumbnail")?,
        created_at: row.try_get("created_at")?,
        status: EntryStatus::from_str(&status),
        artifact_location: row.try_get("artifact_location")?,
        is_audio: is_audio != 0,
        job_token: row.try_get("job_token")?,
    })
}

impl Ledger {
    /// All entries, newest first.
    pub async fn list(&self) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM history ORDER BY created_at DESC, id DESC",
            COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn get(&self, id: EntryId) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {} FROM history WHERE id = ?1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    /// Entries whose title or URL contains `query` (case-insensitive), newest first.
    pub async fn search(&self, query: &str) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.list().await?;
        entries.retain(|e| e.matches(query));
        Ok(entries)
    }

    /// Entries still marked `downloading`, oldest first.
    pub async fn list_downloading(&self) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM history WHERE status = ?1 ORDER BY id ASC",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(EntryStatus::Downloading.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }
}
