//! Job ledger: durable history of every job attempt (SQLite via sqlx).
//!
//! Mutations are serialized through one writer lock and committed with
//! `synchronous = FULL` before the call returns. After each mutation the full
//! ordered snapshot is republished on a `watch` channel, so observers get
//! push-based updates without polling.

mod db;
mod entries;
mod reconcile;
pub mod types;


pub use db::Ledger;
pub use reconcile::is_active;
pub use types::*;
