//! Types stored in the ledger.

/// Ledger entry identifier (SQLite rowid, monotonic).
pub type EntryId = i64;

/// Lifecycle status of a history row. `Downloading` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Downloading,
    Completed,
    Failed,
    Canceled,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Downloading => "downloading",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Canceled => "canceled",
        }
    }

    /// Unknown values read back as `Failed` so they are never mistaken for live work.
    pub fn from_str(s: &str) -> Self {
        match s {
            "downloading" => EntryStatus::Downloading,
            "completed" => EntryStatus::Completed,
            "canceled" | "cancelled" => EntryStatus::Canceled,
            _ => EntryStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryStatus::Downloading)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub source_url: String,
    pub title: String,
    pub uploader: String,
    pub thumbnail: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub status: EntryStatus,
    /// Set only when `status == Completed`.
    pub artifact_location: Option<String>,
    pub is_audio: bool,
    /// Token of the background job owning this row.
    pub job_token: Option<String>,
}

impl LedgerEntry {
    /// Case-insensitive substring match on title or source URL. A blank query matches all.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        q.is_empty()
            || self.title.to_lowercase().contains(&q)
            || self.source_url.to_lowercase().contains(&q)
    }
}

/// Fields supplied when appending a row; status is always `downloading`.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub source_url: String,
    pub title: String,
    pub uploader: String,
    pub thumbnail: Option<String>,
    pub is_audio: bool,
    pub job_token: Option<String>,
}
