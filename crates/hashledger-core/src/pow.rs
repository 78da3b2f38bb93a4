use crate::block::{nonce_hash, Block, BlockTemplate};
use crate::constants::{CANCEL_CHECK_INTERVAL, DEFAULT_RANDOM_MAX_STEP};
use crate::Hash;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// Leading `'0'` characters in the lowercase hex encoding of `hash`.
pub fn leading_zero_nibbles(hash: &Hash) -> u32 {
    count_leading_zero_bits(hash) / 4
}

pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

/// How the nonce space is walked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NonceStrategy {
    /// 0, 1, 2, ... The first valid nonce is deterministic for a template.
    #[default]
    Linear,
    /// Jump ahead by a random step in `1..=max_step` after every miss.
    RandomStep { max_step: u64 },
    /// Rayon sweep over consecutive chunks. `find_first` keeps the answer
    /// identical to `Linear`.
    Parallel,
}

impl NonceStrategy {
    pub fn random() -> Self {
        NonceStrategy::RandomStep {
            max_step: DEFAULT_RANDOM_MAX_STEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("nonce search cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error("nonce search gave up after {attempts} attempts")]
    Exhausted { attempts: u64 },
}

/// Proof-of-work search engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Miner {
    pub strategy: NonceStrategy,
    /// Attempts between two looks at the cancellation flag.
    pub check_interval: u64,
    /// Upper bound on attempts for a single search, `None` for unbounded.
    pub max_attempts: Option<u64>,
}

impl Default for Miner {
    fn default() -> Self {
        Self {
            strategy: NonceStrategy::Linear,
            check_interval: CANCEL_CHECK_INTERVAL,
            max_attempts: None,
        }
    }
}

impl Miner {
    pub fn new(strategy: NonceStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Find a nonce whose header hash carries `template.difficulty` zero
    /// nibbles. The template timestamp stays fixed; only the nonce varies.
    pub fn search(&self, template: &BlockTemplate, cancel: &AtomicBool) -> Result<u64, SealError> {
        let base = template.hasher();
        let difficulty = template.difficulty;
        let check = self.check_interval.max(1);
        let budget = self.max_attempts.unwrap_or(u64::MAX);

        let found = match self.strategy {
            NonceStrategy::Linear => search_stepped(&base, difficulty, check, budget, cancel, || 1),
            NonceStrategy::RandomStep { max_step } => {
                let mut rng = rand::thread_rng();
                let max_step = max_step.max(1);
                search_stepped(&base, difficulty, check, budget, cancel, || {
                    rng.gen_range(1..=max_step)
                })
            }
            NonceStrategy::Parallel => search_parallel(&base, difficulty, check, budget, cancel),
        };
        match &found {
            Ok(nonce) => debug!(index = template.index, nonce, difficulty, "nonce found"),
            Err(e) => debug!(index = template.index, error = %e, "nonce search stopped"),
        }
        found
    }

    /// Search and build the sealed block in one step.
    pub fn seal(&self, template: BlockTemplate, cancel: &AtomicBool) -> Result<Block, SealError> {
        let nonce = self.search(&template, cancel)?;
        Ok(template.into_block(nonce))
    }
}

fn search_stepped(
    base: &Sha256,
    difficulty: u32,
    check: u64,
    budget: u64,
    cancel: &AtomicBool,
    mut next_step: impl FnMut() -> u64,
) -> Result<u64, SealError> {
    let mut attempts = 0u64;
    let mut nonce = 0u64;
    loop {
        if attempts % check == 0 && cancel.load(Ordering::Relaxed) {
            return Err(SealError::Cancelled { attempts });
        }
        if attempts >= budget {
            return Err(SealError::Exhausted { attempts });
        }
        if meets_difficulty(&nonce_hash(base, nonce), difficulty) {
            return Ok(nonce);
        }
        attempts += 1;
        nonce = nonce
            .checked_add(next_step())
            .ok_or(SealError::Exhausted { attempts })?;
    }
}

fn search_parallel(
    base: &Sha256,
    difficulty: u32,
    check: u64,
    budget: u64,
    cancel: &AtomicBool,
) -> Result<u64, SealError> {
    let chunk = check.saturating_mul(rayon::current_num_threads() as u64);
    let mut attempts = 0u64;
    let mut start = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(SealError::Cancelled { attempts });
        }
        if attempts >= budget {
            return Err(SealError::Exhausted { attempts });
        }
        let len = chunk.min(budget - attempts);
        let end = start
            .checked_add(len)
            .ok_or(SealError::Exhausted { attempts })?;
        let hit = (start..end)
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&nonce_hash(base, *nonce), difficulty));
        if let Some(nonce) = hit {
            return Ok(nonce);
        }
        attempts += len;
        start = end;
    }
}
