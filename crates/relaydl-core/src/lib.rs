pub mod config;
pub mod logging;

pub mod control;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod remote;
pub mod request;
pub mod retry;
pub mod service;
pub mod sink;
