//! Proof-of-work ledger core: transactions, the mempool, sealed blocks and
//! the [`Blockchain`] that ties them together.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod block;
pub mod chain;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod mempool;
pub mod pow;
pub mod transaction;

pub use block::{Block, BlockTemplate};
pub use chain::{validate_blocks, Blockchain, ChainConfig, ChainStats, ChainStore, SnapshotRead};
pub use difficulty::{retarget, RetargetPolicy};
pub use error::{IntegrityViolation, LedgerError, Result};
pub use mempool::Mempool;
pub use pow::{Miner, NonceStrategy, SealError};
pub use transaction::{Metadata, Transaction, TransactionRecord, TxKind};

pub type Hash = [u8; constants::HASH_SIZE];

pub const ZERO_HASH: Hash = [0u8; 32];

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Seconds since the unix epoch; a clock set before 1970 reads as 0.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Pairwise SHA-256 root over the transactions' recomputed content hashes.
/// An odd node is paired with itself; no transactions gives the zero hash.
pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return ZERO_HASH;
    }
    let mut level: Vec<Hash> = txs.iter().map(Transaction::content_hash).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut hasher = Sha256::new();
            hasher.update(a);
            hasher.update(b);
            next.push(hasher.finalize().into());
        }
        level = next;
    }
    level[0]
}

/// Serde adapter writing a [`Hash`] as lowercase hex.
pub mod hex_hash {
    use super::Hash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = Hash::default();
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
