//! Orphan reconciliation: `downloading` rows whose job is no longer alive.
//!
//! A row is active iff its job token is in the live set. Rows with no token
//! are never active.

use anyhow::Result;
use std::collections::HashSet;

use super::db::Ledger;
use super::types::{EntryStatus, LedgerEntry};

/// Whether `entry` is backed by a live background job.
pub fn is_active(entry: &LedgerEntry, live_tokens: &HashSet<String>) -> bool {
    entry.status == EntryStatus::Downloading
        && entry
            .job_token
            .as_deref()
            .map_or(false, |t| live_tokens.contains(t))
}

impl Ledger {
    /// Mark every orphaned `downloading` row as `failed`. Returns how many rows changed.
    pub async fn reconcile_orphans(&self, live_tokens: &HashSet<String>) -> Result<u64> {
        let _w = self.write_lock.lock().await;
        let orphans: Vec<_> = self
            .list_downloading()
            .await?
            .into_iter()
            .filter(|e| !is_active(e, live_tokens))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;
        for entry in &orphans {
            changed += sqlx::query("UPDATE history SET status = ?1 WHERE id = ?2 AND status = ?3")
                .bind(EntryStatus::Failed.as_str())
                .bind(entry.id)
                .bind(EntryStatus::Downloading.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        self.publish_committed().await;
        tracing::info!(count = changed, "reconciled orphaned downloads to failed");
        Ok(changed)
    }
}
