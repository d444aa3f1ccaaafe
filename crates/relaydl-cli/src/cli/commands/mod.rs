//! CLI command handlers, one file per command.

mod cancel;
mod clear;
mod completions;
mod config;
mod get;
mod history;
mod info;
mod remove;

pub use cancel::run_cancel;
pub use clear::run_clear;
pub use completions::run_completions;
pub use config::run_config;
pub use get::{build_request, run_get, GetOptions};
pub use history::run_history;
pub use info::run_info;
pub use remove::run_remove;
