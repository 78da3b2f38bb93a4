#![allow(dead_code)]

use hashledger_core::{Blockchain, ChainConfig, ChainStore, Metadata, Transaction};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, std::path::PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (temp_dir, db_path)
}

/// Difficulty 1 with a short retarget window, so restarts exercise the
/// re-derived difficulty without slowing the suite down.
pub fn test_config() -> ChainConfig {
    ChainConfig {
        initial_difficulty: 1,
        adjustment_interval: 3,
        target_timespan_secs: 3_600,
        ..ChainConfig::default()
    }
}

pub fn transfer(from: &str, to: &str, amount: f64) -> Transaction {
    Transaction::create(from, to, amount, Metadata::new()).expect("valid transfer")
}

/// Open a chain on `store` and mine `rounds` blocks of alice -> bob transfers.
pub fn mined_chain(store: Arc<dyn ChainStore>, rounds: usize) -> Blockchain {
    let chain = Blockchain::open(test_config(), store).expect("open chain");
    for i in 0..rounds {
        chain.submit_transaction(transfer("alice", "bob", (i + 1) as f64));
        chain.mine_pending("miner").expect("mine");
    }
    chain
}
