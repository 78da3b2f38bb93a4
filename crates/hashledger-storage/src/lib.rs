//! Durable [`ChainStore`] backends for the ledger.

pub mod json_store;
pub mod sled_store;

use anyhow::{bail, Result};
use hashledger_core::ChainStore;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub use json_store::JsonFileStore;
pub use sled_store::SledStore;

pub const CHAIN_FILE: &str = "chain.json";
pub const SLED_DIR: &str = "chain.sled";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Json,
    Sled,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Backend::Json),
            "sled" => Ok(Backend::Sled),
            other => bail!("unknown storage backend `{other}` (expected json or sled)"),
        }
    }
}

/// Open the chosen backend under `data_dir`, creating the directory.
pub fn open_store(backend: Backend, data_dir: &Path) -> Result<Arc<dyn ChainStore>> {
    std::fs::create_dir_all(data_dir)?;
    Ok(match backend {
        Backend::Json => Arc::new(JsonFileStore::new(data_dir.join(CHAIN_FILE))),
        Backend::Sled => Arc::new(SledStore::open(data_dir.join(SLED_DIR))?),
    })
}
