//! Entry write operations: append, finalize, delete, clear.
//!
//! Every mutation takes the writer lock, commits, then republishes the snapshot.

use anyhow::{bail, Result};

use super::super::db::{unix_millis, Ledger};
use super::super::types::{EntryId, EntryStatus, NewEntry};

impl Ledger {
    /// Insert a new `downloading` row. Returns its id.
    pub async fn append(&self, entry: &NewEntry) -> Result<EntryId> {
        if entry.source_url.trim().is_empty() {
            bail!("ledger entry needs a source URL");
        }
        let _w = self.write_lock.lock().await;
        let id = sqlx::query(
            r#"
            INSERT INTO history (
                title, uploader, url, thumbnail, created_at,
                status, artifact_location, is_audio, job_token
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.uploader)
        .bind(&entry.source_url)
        .bind(&entry.thumbnail)
        .bind(unix_millis())
        .bind(EntryStatus::Downloading.as_str())
        .bind(entry.is_audio as i64)
        .bind(&entry.job_token)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.publish_committed().await;
        tracing::debug!(id, url = %entry.source_url, "ledger entry appended");
        Ok(id)
    }

    /// Move a `downloading` row to its terminal status. `Completed` requires a
    /// non-empty location; other statuses refuse one. Returns false when the row
    /// was already terminal (or missing), so a second finalize is a no-op.
    pub async fn update_terminal(
        &self,
        id: EntryId,
        status: EntryStatus,
        artifact_location: Option<&str>,
    ) -> Result<bool> {
        let location = artifact_location.map(str::trim).filter(|l| !l.is_empty());
        match (status, location) {
            (EntryStatus::Downloading, _) => bail!("downloading is not a terminal status"),
            (EntryStatus::Completed, None) => bail!("completed entry {} needs an artifact location", id),
            (EntryStatus::Failed | EntryStatus::Canceled, Some(_)) => {
                bail!("{} entry {} cannot carry an artifact location", status, id)
            }
            _ => {}
        }
        self.finalize(id, status, location).await
    }

    /// Set a terminal non-success status without touching other fields.
    pub async fn update_status_only(&self, id: EntryId, status: EntryStatus) -> Result<bool> {
        if !matches!(status, EntryStatus::Failed | EntryStatus::Canceled) {
            bail!("status-only update must be failed or canceled, got {}", status);
        }
        self.finalize(id, status, None).await
    }

    async fn finalize(&self, id: EntryId, status: EntryStatus, location: Option<&str>) -> Result<bool> {
        let _w = self.write_lock.lock().await;
        let changed = sqlx::query(
            r#"
            UPDATE history
            SET status = ?1,
                artifact_location = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(location)
        .bind(id)
        .bind(EntryStatus::Downloading.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        if changed {
            self.publish_committed().await;
            tracing::debug!(id, status = status.as_str(), "ledger entry finalized");
        }
        Ok(changed)
    }

    /// Remove one row. Returns whether it existed.
    pub async fn delete(&self, id: EntryId) -> Result<bool> {
        let _w = self.write_lock.lock().await;
        let removed = sqlx::query("DELETE FROM history WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        if removed {
            self.publish_committed().await;
        }
        Ok(removed)
    }

    /// Remove every row. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let _w = self.write_lock.lock().await;
        let n = sqlx::query("DELETE FROM history")
            .execute(&self.pool)
            .await?
            .rows_affected();
        self.publish_committed().await;
        Ok(n)
    }
}
