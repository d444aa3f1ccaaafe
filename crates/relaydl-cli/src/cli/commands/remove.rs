//! `relaydl remove <id>` – drop a history entry; `--delete-file` also deletes the artifact.

use anyhow::{bail, Result};
use relaydl_core::control::default_control_socket_dir;
use relaydl_core::ledger::{is_active, EntryId, EntryStatus};
use relaydl_core::service::DownloadService;

use crate::cli::control_socket;

pub async fn run_remove(service: &DownloadService, id: EntryId, delete_file: bool) -> Result<()> {
    if let Some(entry) = service.ledger().get(id).await? {
        let others = control_socket::collect_live_tokens(&default_control_socket_dir()?).await;
        if is_active(&entry, &others.tokens) {
            bail!("job {} is still running; cancel it first", id);
        }
        if entry.status == EntryStatus::Downloading && !others.is_complete() {
            bail!(
                "cannot tell whether job {} is still running: {} job process(es) did not answer",
                id,
                others.unreachable.len()
            );
        }
    }
    if service.delete(id, delete_file).await? {
        println!("Removed job {}", id);
    } else {
        println!("No job with id {}", id);
    }
    Ok(())
}
