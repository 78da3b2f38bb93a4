//! HTTP node around a shared [`hashledger_core::Blockchain`].

pub mod api;
pub mod config;
mod constants;
pub mod scheduler;

pub use api::{router, AppState};
pub use config::{Args, StrategyArg};
