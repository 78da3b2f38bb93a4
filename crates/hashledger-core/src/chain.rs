//! The Blockchain: single mutation point for chain state.
//!
//! Locking: `mining` serializes drain + seal + append + persist. The mempool
//! has its own lock, held only while transactions are queued or drained, so
//! submissions never wait on a nonce search. `blocks` is write-locked only
//! for the push and retarget; readers share it.

use crate::block::{Block, BlockTemplate};
use crate::constants::{
    DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, DIFFICULTY_ADJUSTMENT_INTERVAL, MAX_DIFFICULTY,
    NETWORK_SENDER, TARGET_TIMESPAN_SECS,
};
use crate::difficulty::{restored_difficulty, retarget, RetargetPolicy};
use crate::error::{IntegrityViolation, LedgerError, Result};
use crate::mempool::Mempool;
use crate::pow::{Miner, NonceStrategy};
use crate::transaction::{Transaction, TransactionRecord};
use crate::{now_secs, ZERO_HASH};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Durable home for chain snapshots. Lives in the core so storage backends
/// can depend on it without a cycle.
pub trait ChainStore: Send + Sync {
    /// Replace the stored chain with `blocks`, atomically.
    fn save_snapshot(&self, blocks: &[Block]) -> anyhow::Result<()>;
    /// Read the stored chain. I/O failures are errors; unreadable content
    /// is [`SnapshotRead::Corrupt`].
    fn load_snapshot(&self) -> anyhow::Result<SnapshotRead>;
    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug)]
pub enum SnapshotRead {
    Missing,
    Corrupt(String),
    Blocks(Vec<Block>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainConfig {
    pub initial_difficulty: u32,
    pub mining_reward: f64,
    pub adjustment_interval: u64,
    pub target_timespan_secs: u64,
    pub miner: Miner,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_timespan_secs: TARGET_TIMESPAN_SECS,
            miner: Miner::default(),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DIFFICULTY).contains(&self.initial_difficulty) {
            return Err(LedgerError::Config(format!(
                "difficulty must be within 1..={MAX_DIFFICULTY}, got {}",
                self.initial_difficulty
            )));
        }
        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(LedgerError::Config(format!(
                "mining reward must be a non-negative number, got {}",
                self.mining_reward
            )));
        }
        if self.adjustment_interval < 2 {
            return Err(LedgerError::Config(
                "adjustment interval must be at least 2 blocks".into(),
            ));
        }
        if self.target_timespan_secs == 0 {
            return Err(LedgerError::Config("target timespan must be positive".into()));
        }
        if self.miner.check_interval == 0 {
            return Err(LedgerError::Config("check interval must be positive".into()));
        }
        if let NonceStrategy::RandomStep { max_step: 0 } = self.miner.strategy {
            return Err(LedgerError::Config("random step must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retarget_policy(&self) -> RetargetPolicy {
        RetargetPolicy {
            interval: self.adjustment_interval,
            target_timespan_secs: self.target_timespan_secs,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub height: u64,
    pub blocks: usize,
    pub difficulty: u32,
    pub mining_reward: f64,
    pub pending: usize,
    pub tip_hash: String,
    pub durable: bool,
}

pub struct Blockchain {
    config: ChainConfig,
    blocks: RwLock<Vec<Block>>,
    difficulty: AtomicU32,
    mempool: Mempool,
    mining: Mutex<()>,
    store: Option<Arc<dyn ChainStore>>,
    cancel: AtomicBool,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Blockchain {
    /// Restore from `store`, or start a fresh chain when the snapshot is
    /// missing or unreadable. A readable snapshot that fails validation is
    /// an integrity error; it is never repaired.
    pub fn open(config: ChainConfig, store: Arc<dyn ChainStore>) -> Result<Self> {
        config.validate()?;
        let location = store.describe();
        let restored = match store.load_snapshot().map_err(LedgerError::Persistence)? {
            SnapshotRead::Blocks(blocks) if !blocks.is_empty() => {
                validate_blocks(&blocks)?;
                Some(blocks)
            }
            SnapshotRead::Blocks(_) | SnapshotRead::Missing => {
                info!(store = %location, "no chain snapshot found");
                None
            }
            SnapshotRead::Corrupt(reason) => {
                warn!(store = %location, %reason, "chain snapshot unreadable, starting a fresh chain");
                None
            }
        };

        match restored {
            Some(blocks) => {
                let policy = config.retarget_policy();
                let difficulty =
                    restored_difficulty(&blocks, &policy).unwrap_or(config.initial_difficulty);
                info!(
                    store = %location,
                    blocks = blocks.len(),
                    difficulty,
                    "restored chain snapshot"
                );
                Ok(Self::assemble(config, blocks, difficulty, Some(store)))
            }
            None => {
                let genesis = genesis_block(&config)?;
                let difficulty = config.initial_difficulty;
                let chain = Self::assemble(config, vec![genesis], difficulty, Some(store));
                chain.persist().map_err(LedgerError::Persistence)?;
                Ok(chain)
            }
        }
    }

    /// A chain that lives only as long as the process.
    pub fn in_memory(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        warn!("running without a chain store; state will not survive a restart");
        let genesis = genesis_block(&config)?;
        let difficulty = config.initial_difficulty;
        Ok(Self::assemble(config, vec![genesis], difficulty, None))
    }

    fn assemble(
        config: ChainConfig,
        blocks: Vec<Block>,
        difficulty: u32,
        store: Option<Arc<dyn ChainStore>>,
    ) -> Self {
        Self {
            config,
            blocks: RwLock::new(blocks),
            difficulty: AtomicU32::new(difficulty),
            mempool: Mempool::new(),
            mining: Mutex::new(()),
            store,
            cancel: AtomicBool::new(false),
        }
    }

    pub fn submit_transaction(&self, tx: Transaction) {
        self.mempool.submit(tx);
    }

    /// Validate a raw record and queue it; returns the accepted transaction.
    pub fn submit_record(&self, record: TransactionRecord) -> Result<Transaction> {
        let tx = Transaction::from_record(record)?;
        self.mempool.submit(tx.clone());
        Ok(tx)
    }

    /// Drain the mempool into a new sealed block paying `miner_id` the
    /// current reward. At most one call runs at a time per chain.
    pub fn mine_pending(&self, miner_id: &str) -> Result<Block> {
        if miner_id.trim().is_empty() {
            return Err(LedgerError::validation("miner id must not be empty"));
        }
        let _mining = self.mining.lock();

        let mut transactions = self.mempool.drain();
        if transactions.is_empty() {
            debug!("mine requested with an empty mempool");
            return Err(LedgerError::EmptyMempool);
        }
        let drained = transactions.len();
        transactions.push(Transaction::reward(
            miner_id,
            self.config.mining_reward,
            now_secs(),
        ));

        let (index, previous_hash) = {
            let blocks = self.blocks.read();
            let tip = blocks.last().ok_or(LedgerError::Integrity {
                index: 0,
                violation: IntegrityViolation::MissingGenesis,
            })?;
            (blocks.len() as u64, *tip.hash())
        };
        let difficulty = self.difficulty.load(Ordering::Acquire);
        let template = BlockTemplate::new(index, previous_hash, transactions, difficulty);

        let nonce = match self.config.miner.search(&template, &self.cancel) {
            Ok(nonce) => nonce,
            Err(e) => {
                let mut restored = template.transactions;
                restored.truncate(drained);
                self.mempool.requeue(restored);
                warn!(index, error = %e, "mining interrupted, pending transactions restored");
                return Err(e.into());
            }
        };
        let block = template.into_block(nonce);
        info!(
            index,
            nonce,
            difficulty,
            txs = block.transactions().len(),
            hash = %block.hash_hex(),
            "sealed block"
        );

        {
            let mut blocks = self.blocks.write();
            blocks.push(block.clone());
            let policy = self.config.retarget_policy();
            if policy.is_checkpoint(blocks.len()) {
                let next = retarget(&blocks, difficulty, &policy);
                if next != difficulty {
                    info!(from = difficulty, to = next, height = index, "difficulty adjusted");
                    self.difficulty.store(next, Ordering::Release);
                }
            }
        }

        if let Err(source) = self.persist() {
            error!(index, error = %format!("{source:#}"), "chain snapshot failed; block kept in memory only");
            return Err(LedgerError::NotPersisted { index, source });
        }
        Ok(block)
    }

    fn persist(&self) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let blocks = self.blocks.read();
        store.save_snapshot(&blocks)
    }

    /// Received minus sent across the whole chain. Full scan; the network
    /// sender is never debited.
    pub fn get_balance(&self, address: &str) -> f64 {
        let blocks = self.blocks.read();
        let mut balance = 0.0;
        for tx in blocks.iter().flat_map(|b| b.transactions()) {
            if tx.recipient() == address {
                balance += tx.amount();
            }
            if tx.sender() == address && tx.sender() != NETWORK_SENDER {
                balance -= tx.amount();
            }
        }
        balance
    }

    /// Every transaction sent or received by `address`, in chain order.
    pub fn get_history(&self, address: &str) -> Vec<Transaction> {
        let blocks = self.blocks.read();
        blocks
            .iter()
            .flat_map(|b| b.transactions())
            .filter(|tx| tx.touches(address))
            .cloned()
            .collect()
    }

    pub fn get_chain_tail(&self, n: usize) -> Vec<Block> {
        let blocks = self.blocks.read();
        let start = blocks.len().saturating_sub(n);
        blocks[start..].to_vec()
    }

    pub fn validate(&self) -> Result<()> {
        validate_blocks(&self.blocks.read())
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "chain validation failed");
                false
            }
        }
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.read().clone()
    }

    pub fn get_block(&self, index: u64) -> Option<Block> {
        let blocks = self.blocks.read();
        usize::try_from(index).ok().and_then(|i| blocks.get(i).cloned())
    }

    pub fn last_block(&self) -> Option<Block> {
        self.blocks.read().last().cloned()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn height(&self) -> u64 {
        self.block_count().saturating_sub(1) as u64
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::Acquire)
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.mempool.snapshot()
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    pub fn stats(&self) -> ChainStats {
        let blocks = self.blocks.read();
        ChainStats {
            height: blocks.len().saturating_sub(1) as u64,
            blocks: blocks.len(),
            difficulty: self.difficulty(),
            mining_reward: self.config.mining_reward,
            pending: self.mempool.len(),
            tip_hash: blocks.last().map(Block::hash_hex).unwrap_or_default(),
            durable: self.is_durable(),
        }
    }

    /// Ask an in-flight nonce search to stop at its next check. Later mining
    /// calls fail fast with `MiningInterrupted`.
    pub fn request_shutdown(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, f: impl FnOnce(&mut Vec<Block>)) {
        f(&mut self.blocks.write());
    }
}

/// Linkage, index, difficulty range, seal and proof-of-work checks over a
/// whole chain.
pub fn validate_blocks(blocks: &[Block]) -> Result<()> {
    let fail = |index: u64, violation| Err(LedgerError::Integrity { index, violation });
    let Some(genesis) = blocks.first() else {
        return fail(0, IntegrityViolation::MissingGenesis);
    };
    if *genesis.previous_hash() != ZERO_HASH {
        return fail(0, IntegrityViolation::GenesisLinkage);
    }
    for (position, block) in blocks.iter().enumerate() {
        let index = position as u64;
        if block.index() != index {
            return fail(
                index,
                IntegrityViolation::IndexMismatch {
                    found: block.index(),
                },
            );
        }
        if position > 0 && block.previous_hash() != blocks[position - 1].hash() {
            return fail(index, IntegrityViolation::BrokenLinkage { prev: index - 1 });
        }
        if !(1..=MAX_DIFFICULTY).contains(&block.difficulty()) {
            return fail(
                index,
                IntegrityViolation::DifficultyOutOfRange {
                    difficulty: block.difficulty(),
                },
            );
        }
        if let Err(violation) = block.verify_seal() {
            return fail(index, violation);
        }
    }
    Ok(())
}

fn genesis_block(config: &ChainConfig) -> Result<Block> {
    let timestamp = now_secs();
    let template = BlockTemplate {
        index: 0,
        previous_hash: ZERO_HASH,
        timestamp,
        difficulty: config.initial_difficulty,
        transactions: vec![Transaction::genesis(timestamp)],
    };
    let genesis = config.miner.seal(template, &AtomicBool::new(false))?;
    info!(hash = %genesis.hash_hex(), difficulty = genesis.difficulty(), "created genesis block");
    Ok(genesis)
}
