use crate::error::IntegrityViolation;
use crate::pow::{meets_difficulty, Miner, SealError};
use crate::transaction::Transaction;
use crate::{hex_hash, merkle_root, now_secs, Hash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::AtomicBool;

/// Everything a block commits to except the nonce.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: Hash,
    pub timestamp: u64,
    pub difficulty: u32,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Template stamped with the current time; the timestamp stays fixed
    /// for the whole nonce search.
    pub fn new(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        Self {
            index,
            previous_hash,
            timestamp: now_secs(),
            difficulty,
            transactions,
        }
    }

    /// Header bytes up to, not including, the nonce.
    pub fn header_prefix(&self) -> Vec<u8> {
        header_prefix(
            self.index,
            &self.previous_hash,
            &merkle_root(&self.transactions),
            self.timestamp,
            self.difficulty,
        )
    }

    /// Hasher that has already absorbed the header prefix.
    pub fn hasher(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(self.header_prefix());
        hasher
    }

    pub fn into_block(self, nonce: u64) -> Block {
        let hash = nonce_hash(&self.hasher(), nonce);
        Block {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            nonce,
            difficulty: self.difficulty,
            hash,
        }
    }
}

fn header_prefix(
    index: u64,
    previous_hash: &Hash,
    merkle_root: &Hash,
    timestamp: u64,
    difficulty: u32,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + 32 + 32 + 8 + 4 + 8);
    bytes.extend_from_slice(&index.to_le_bytes());
    bytes.extend_from_slice(previous_hash);
    bytes.extend_from_slice(merkle_root);
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&difficulty.to_le_bytes());
    bytes
}

/// Finish a prefix hasher with `nonce`.
pub(crate) fn nonce_hash(base: &Sha256, nonce: u64) -> Hash {
    let mut hasher = base.clone();
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: u64,
    transactions: Vec<Transaction>,
    #[serde(with = "hex_hash")]
    previous_hash: Hash,
    nonce: u64,
    difficulty: u32,
    #[serde(with = "hex_hash")]
    hash: Hash,
}

impl Block {
    /// Linear, unbounded, non-cancellable proof-of-work seal.
    pub fn seal(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Block, SealError> {
        let template = BlockTemplate::new(index, previous_hash, transactions, difficulty);
        Miner::default().seal(template, &AtomicBool::new(false))
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// The stored seal.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = header_prefix(
            self.index,
            &self.previous_hash,
            &merkle_root(&self.transactions),
            self.timestamp,
            self.difficulty,
        );
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Hash recomputed from the block's current contents.
    pub fn calculate_hash(&self) -> Hash {
        crate::sha256(&self.header_bytes())
    }

    pub fn meets_difficulty(&self) -> bool {
        meets_difficulty(&self.hash, self.difficulty)
    }

    /// Self-contained checks: transaction ids, stored hash, proof-of-work.
    /// Linkage to the predecessor is the chain's concern.
    pub fn verify_seal(&self) -> Result<(), IntegrityViolation> {
        if let Some(position) = self.transactions.iter().position(|tx| !tx.verify_id()) {
            return Err(IntegrityViolation::TransactionId { position });
        }
        if self.calculate_hash() != self.hash {
            return Err(IntegrityViolation::HashMismatch);
        }
        if !self.meets_difficulty() {
            return Err(IntegrityViolation::ProofOfWork {
                difficulty: self.difficulty,
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }

    #[cfg(test)]
    pub(crate) fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    #[cfg(test)]
    pub(crate) fn set_previous_hash(&mut self, previous_hash: Hash) {
        self.previous_hash = previous_hash;
    }
}
