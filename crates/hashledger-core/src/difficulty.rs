//! Coarse difficulty retargeting: one step up or down per checkpoint.

use crate::block::Block;
use crate::constants::{DIFFICULTY_ADJUSTMENT_INTERVAL, MAX_DIFFICULTY, TARGET_TIMESPAN_SECS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetargetPolicy {
    /// Blocks per adjustment window; a checkpoint falls whenever the chain
    /// length is a multiple of this.
    pub interval: u64,
    pub target_timespan_secs: u64,
}

impl Default for RetargetPolicy {
    fn default() -> Self {
        Self {
            interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_timespan_secs: TARGET_TIMESPAN_SECS,
        }
    }
}

impl RetargetPolicy {
    pub fn is_checkpoint(&self, chain_len: usize) -> bool {
        self.interval >= 2 && chain_len > 1 && (chain_len as u64) % self.interval == 0
    }
}

/// Difficulty for the next block given the window ending at the chain tip.
///
/// The window is the last `interval` blocks, `blocks[len - interval]`
/// through the tip, so the timespan covers `interval - 1` block gaps. The
/// target is compared against that span as is, without rescaling. Under
/// half the target timespan raises difficulty by one, over twice the target
/// lowers it by one (never below 1), anything in between leaves it alone.
pub fn retarget(blocks: &[Block], current: u32, policy: &RetargetPolicy) -> u32 {
    let interval = policy.interval as usize;
    if interval < 2 || blocks.len() < interval {
        return current;
    }
    let last = blocks[blocks.len() - 1].timestamp();
    let first = blocks[blocks.len() - interval].timestamp();
    let timespan = last.saturating_sub(first);
    let target = policy.target_timespan_secs;

    if timespan.saturating_mul(2) < target {
        current.saturating_add(1).min(MAX_DIFFICULTY)
    } else if timespan > target.saturating_mul(2) {
        current.saturating_sub(1).max(1)
    } else {
        current
    }
}

/// Difficulty in force after `blocks`, re-derived from the tip's difficulty
/// and the checkpoint rule. Matches what live mining would have produced.
pub fn restored_difficulty(blocks: &[Block], policy: &RetargetPolicy) -> Option<u32> {
    let tip = blocks.last()?;
    let current = tip.difficulty().clamp(1, MAX_DIFFICULTY);
    if policy.is_checkpoint(blocks.len()) {
        Some(retarget(blocks, current, policy))
    } else {
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockTemplate;
    use crate::ZERO_HASH;

    fn policy() -> RetargetPolicy {
        RetargetPolicy {
            interval: 5,
            target_timespan_secs: 100,
        }
    }

    /// Unsealed blocks with the given timestamps; retargeting only reads
    /// timestamps and difficulty.
    fn synthetic_chain(timestamps: &[u64], difficulty: u32) -> Vec<Block> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| {
                BlockTemplate {
                    index: i as u64,
                    previous_hash: ZERO_HASH,
                    timestamp: *ts,
                    difficulty,
                    transactions: vec![],
                }
                .into_block(0)
            })
            .collect()
    }

    #[test]
    fn fast_window_increases_by_one() {
        let blocks = synthetic_chain(&[1_000, 1_010, 1_020, 1_030, 1_040], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 4);
    }

    #[test]
    fn slow_window_decreases_by_one() {
        let blocks = synthetic_chain(&[1_000, 1_100, 1_200, 1_300, 1_400], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 2);
    }

    #[test]
    fn on_target_window_is_unchanged() {
        let blocks = synthetic_chain(&[1_000, 1_025, 1_050, 1_075, 1_100], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 3);
    }

    #[test]
    fn boundaries_are_exclusive() {
        // Exactly half the target: no increase.
        let blocks = synthetic_chain(&[1_000, 1_010, 1_020, 1_030, 1_050], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 3);
        // Exactly twice the target: no decrease.
        let blocks = synthetic_chain(&[1_000, 1_050, 1_100, 1_150, 1_200], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 3);
    }

    #[test]
    fn never_drops_below_one() {
        let blocks = synthetic_chain(&[0, 1_000, 2_000, 3_000, 4_000], 1);
        assert_eq!(retarget(&blocks, 1, &policy()), 1);
    }

    #[test]
    fn capped_at_max_difficulty() {
        let blocks = synthetic_chain(&[1_000; 5], MAX_DIFFICULTY);
        assert_eq!(retarget(&blocks, MAX_DIFFICULTY, &policy()), MAX_DIFFICULTY);
    }

    #[test]
    fn only_the_last_window_counts() {
        // Slow history followed by a fast final window.
        let blocks = synthetic_chain(
            &[0, 5_000, 10_000, 15_000, 20_000, 20_001, 20_002, 20_003, 20_004, 20_005],
            2,
        );
        assert_eq!(retarget(&blocks, 2, &policy()), 3);
    }

    #[test]
    fn window_starts_at_first_of_last_interval_blocks() {
        // Six blocks, interval 5: blocks[0] sits outside the window. Its
        // timestamp would make the span 4_000 s and lower the difficulty.
        let blocks = synthetic_chain(&[0, 3_990, 3_991, 3_992, 3_993, 4_000], 3);
        assert_eq!(retarget(&blocks, 3, &policy()), 4);
    }

    #[test]
    fn restored_difficulty_never_goes_below_one() {
        let blocks = synthetic_chain(&[1_000, 1_001, 1_002], 0);
        assert_eq!(restored_difficulty(&blocks, &policy()), Some(1));
    }

    #[test]
    fn clock_going_backwards_counts_as_fast() {
        let blocks = synthetic_chain(&[2_000, 1_900, 1_800, 1_700, 1_600], 2);
        assert_eq!(retarget(&blocks, 2, &policy()), 3);
    }

    #[test]
    fn short_chain_is_left_alone() {
        let blocks = synthetic_chain(&[1_000, 1_001], 2);
        assert_eq!(retarget(&blocks, 2, &policy()), 2);
    }

    #[test]
    fn checkpoints() {
        let p = policy();
        assert!(!p.is_checkpoint(1));
        assert!(!p.is_checkpoint(4));
        assert!(p.is_checkpoint(5));
        assert!(p.is_checkpoint(10));
        assert!(!p.is_checkpoint(11));
    }

    #[test]
    fn restored_difficulty_replays_checkpoint() {
        let p = policy();
        let fast = synthetic_chain(&[1_000, 1_001, 1_002, 1_003, 1_004], 2);
        assert_eq!(restored_difficulty(&fast, &p), Some(3));
        let off_checkpoint = synthetic_chain(&[1_000, 1_001, 1_002], 2);
        assert_eq!(restored_difficulty(&off_checkpoint, &p), Some(2));
        assert_eq!(restored_difficulty(&[], &p), None);
    }
}
