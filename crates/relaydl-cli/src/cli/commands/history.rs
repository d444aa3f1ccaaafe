//! `relaydl history` – list jobs, reconciling rows whose process is gone.

use anyhow::Result;
use chrono::{Local, TimeZone};
use relaydl_core::control::default_control_socket_dir;
use relaydl_core::ledger::LedgerEntry;
use relaydl_core::service::DownloadService;

use crate::cli::control_socket::{self, LiveTokens};

pub async fn run_history(service: &DownloadService, search: Option<&str>) -> Result<()> {
    let others = match default_control_socket_dir() {
        Ok(dir) => control_socket::collect_live_tokens(&dir).await,
        Err(e) => {
            tracing::debug!("no control dir: {:#}", e);
            LiveTokens::default()
        }
    };
    let entries = if others.is_complete() {
        service.history(&others.tokens).await?
    } else {
        // Jobs behind a silent socket may still be running; leave them as they are.
        eprintln!(
            "Note: {} job process(es) did not answer; downloading entries were not reconciled.",
            others.unreachable.len()
        );
        service.ledger().list().await?
    };
    let entries: Vec<LedgerEntry> = entries
        .into_iter()
        .filter(|e| e.matches(search.unwrap_or("")))
        .collect();

    if entries.is_empty() {
        println!("No downloads in history.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<16} {:<5} {}",
        "ID", "STATUS", "CREATED", "KIND", "TITLE"
    );
    for e in &entries {
        println!("{}", row(e));
        if let Some(location) = &e.artifact_location {
            println!("{:<6} -> {}", "", location);
        }
    }
    Ok(())
}

pub(crate) fn row(e: &LedgerEntry) -> String {
    format!(
        "{:<6} {:<12} {:<16} {:<5} {} ({})",
        e.id,
        e.status.as_str(),
        format_created(e.created_at),
        if e.is_audio { "audio" } else { "video" },
        e.title,
        e.uploader
    )
}

fn format_created(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
