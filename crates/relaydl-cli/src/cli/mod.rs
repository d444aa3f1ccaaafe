//! CLI for relaydl.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use relaydl_core::config::{self, FileSettings};
use relaydl_core::ledger::{EntryId, Ledger};
use relaydl_core::service::DownloadService;
use std::path::PathBuf;
use std::sync::Arc;

use commands::{
    run_cancel, run_clear, run_completions, run_config, run_get, run_history, run_info,
    run_remove, GetOptions,
};

/// Top-level CLI for relaydl.
#[derive(Debug, Parser)]
#[command(name = "relaydl")]
#[command(about = "relaydl: download media through a remote yt-dlp server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show title, duration and available heights for a source URL.
    Info {
        /// Page URL of the media (anything the remote server supports).
        url: String,
    },

    /// Download one item and wait for it to finish. Ctrl-C cancels.
    Get {
        /// Page URL of the media.
        url: String,
        /// Extract audio only.
        #[arg(long)]
        audio: bool,
        /// Audio codec for --audio (e.g. mp3, m4a).
        #[arg(long, value_name = "FMT", requires = "audio")]
        audio_format: Option<String>,
        /// Explicit remote format id (see `relaydl info`).
        #[arg(long, value_name = "ID", conflicts_with = "height")]
        format: Option<String>,
        /// Video height, e.g. 720. Defaults to the highest available.
        #[arg(long, value_name = "N", conflicts_with = "audio")]
        height: Option<u32>,
    },

    /// Cancel a running job by its ID (in whichever relaydl process hosts it).
    Cancel {
        /// Job identifier.
        id: EntryId,
    },

    /// List past and running jobs, newest first.
    History {
        /// Only show entries whose title or URL contains this text.
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Remove a job from history (optionally deleting the downloaded file).
    Remove {
        /// Job identifier.
        id: EntryId,
        /// Also delete the artifact on disk.
        #[arg(long)]
        delete_file: bool,
    },

    /// Remove every history entry. Downloaded files are kept.
    Clear,

    /// Show or edit settings in config.toml.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current settings.
    Show,
    /// Set the remote server base URL.
    SetUrl { url: String },
    /// Save finished downloads into this folder.
    SetLocation { path: PathBuf },
    /// Go back to the platform Videos / Music folders.
    ClearLocation,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            // Neither of these touches the ledger.
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Config { action } => {
                let settings = FileSettings::open_default()?;
                run_config(&settings, action)
            }
            command => {
                let service = open_service().await?;
                command.run_with(&service).await
            }
        }
    }

    async fn run_with(self, service: &DownloadService) -> Result<()> {
        match self {
            CliCommand::Info { url } => run_info(service, &url).await?,
            CliCommand::Get {
                url,
                audio,
                audio_format,
                format,
                height,
            } => {
                let opts = GetOptions {
                    url,
                    audio,
                    audio_format,
                    format,
                    height,
                };
                run_get(service, &opts).await?;
            }
            CliCommand::Cancel { id } => run_cancel(service, id).await?,
            CliCommand::History { search } => run_history(service, search.as_deref()).await?,
            CliCommand::Remove { id, delete_file } => run_remove(service, id, delete_file).await?,
            CliCommand::Clear => run_clear(service).await?,
            CliCommand::Completions { .. } | CliCommand::Config { .. } => {
                anyhow::bail!("command does not use the download service")
            }
        }
        Ok(())
    }
}

async fn open_service() -> Result<DownloadService> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    let settings = FileSettings::open_default()?;
    let ledger = Ledger::open_default().await?;
    Ok(DownloadService::new(ledger, Arc::new(settings), cfg))
}

#[cfg(test)]
mod tests;
