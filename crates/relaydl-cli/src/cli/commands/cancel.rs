//! `relaydl cancel <id>` – signal whichever relaydl process hosts the job.

use anyhow::{bail, Result};
use relaydl_core::control::default_control_socket_dir;
use relaydl_core::ledger::EntryId;
use relaydl_core::service::DownloadService;

use crate::cli::control_socket;

pub async fn run_cancel(service: &DownloadService, id: EntryId) -> Result<()> {
    let Some(entry) = service.ledger().get(id).await? else {
        bail!("no job with id {}", id);
    };
    if entry.status.is_terminal() {
        println!("Job {} already {}", id, entry.status);
        return Ok(());
    }

    let dir = default_control_socket_dir()?;
    if control_socket::send_cancel(&dir, id).await {
        println!("Cancel requested for job {}", id);
    } else {
        // Nobody hosts it: the row is an orphan and history will reconcile it.
        println!("Job {} is not running in any relaydl process", id);
    }
    Ok(())
}
