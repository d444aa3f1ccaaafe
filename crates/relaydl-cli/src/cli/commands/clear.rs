//! `relaydl clear` – empty the history. Artifacts stay on disk.

use anyhow::{bail, Result};
use relaydl_core::control::default_control_socket_dir;
use relaydl_core::service::DownloadService;

use crate::cli::control_socket;

pub async fn run_clear(service: &DownloadService) -> Result<()> {
    let others = control_socket::collect_live_tokens(&default_control_socket_dir()?).await;
    if !others.tokens.is_empty() {
        bail!("{} job(s) still running; cancel them first", others.tokens.len());
    }
    if !others.is_complete() {
        bail!(
            "{} job process(es) did not answer; not clearing while jobs may be running",
            others.unreachable.len()
        );
    }
    let removed = service.clear().await?;
    println!("Removed {} history entr{}", removed, if removed == 1 { "y" } else { "ies" });
    Ok(())
}
