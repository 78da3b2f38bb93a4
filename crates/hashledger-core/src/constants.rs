pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Highest meaningful difficulty: every hex character of the hash is zero.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_MINING_REWARD: f64 = 10.0;
/// Blocks between difficulty checkpoints.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
/// Wall-clock seconds one adjustment window is expected to span.
pub const TARGET_TIMESPAN_SECS: u64 = 600;
/// Nonce attempts between two looks at the cancellation flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;
pub const DEFAULT_RANDOM_MAX_STEP: u64 = 1024;
/// Reserved sender of reward and genesis transactions; never debited.
pub const NETWORK_SENDER: &str = "network";
pub const GENESIS_RECIPIENT: &str = "genesis";
pub const GENESIS_MESSAGE: &str = "Genesis Block";
