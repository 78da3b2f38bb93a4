use crate::pow::SealError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    Validation(String),

    #[error("no pending transactions to mine")]
    EmptyMempool,

    #[error("chain integrity violated at block {index}: {violation}")]
    Integrity {
        index: u64,
        violation: IntegrityViolation,
    },

    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),

    /// The block was appended in memory but the snapshot write failed.
    #[error("block {index} appended but not persisted: {source:#}")]
    NotPersisted {
        index: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("mining interrupted: {0}")]
    MiningInterrupted(#[from] SealError),

    #[error("invalid chain configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// True for outcomes a caller should treat as "nothing to do".
    pub fn is_noop(&self) -> bool {
        matches!(self, LedgerError::EmptyMempool)
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("chain has no genesis block")]
    MissingGenesis,
    #[error("stored index {found} does not match position")]
    IndexMismatch { found: u64 },
    #[error("genesis previous hash is not zero")]
    GenesisLinkage,
    #[error("previous hash does not match block {prev}")]
    BrokenLinkage { prev: u64 },
    #[error("stored hash does not match recomputed hash")]
    HashMismatch,
    #[error("difficulty {difficulty} is outside 1..={}", crate::constants::MAX_DIFFICULTY)]
    DifficultyOutOfRange { difficulty: u32 },
    #[error("hash does not satisfy difficulty {difficulty}")]
    ProofOfWork { difficulty: u32 },
    #[error("transaction {position} id does not match its contents")]
    TransactionId { position: usize },
}
