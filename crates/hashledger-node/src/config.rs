use clap::{Parser, ValueEnum};
use hashledger_core::constants::{
    CANCEL_CHECK_INTERVAL, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, DEFAULT_RANDOM_MAX_STEP,
    DIFFICULTY_ADJUSTMENT_INTERVAL, TARGET_TIMESPAN_SECS,
};
use hashledger_core::{ChainConfig, Miner, NonceStrategy};
use hashledger_storage::Backend;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "hashledger-node")]
#[command(about = "Proof-of-work ledger node with an HTTP API")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "HASHLEDGER_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Directory holding the chain snapshot
    #[arg(long, env = "HASHLEDGER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "HASHLEDGER_BACKEND", value_enum, default_value_t = BackendArg::Json)]
    pub backend: BackendArg,

    /// Keep the chain in memory only; nothing is written to disk
    #[arg(long, env = "HASHLEDGER_EPHEMERAL", default_value_t = false)]
    pub ephemeral: bool,

    /// Leading zero hex digits required of a new chain's blocks
    #[arg(long, env = "HASHLEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    #[arg(long, env = "HASHLEDGER_REWARD", default_value_t = DEFAULT_MINING_REWARD)]
    pub reward: f64,

    /// Blocks per difficulty adjustment window
    #[arg(long, env = "HASHLEDGER_ADJUST_INTERVAL", default_value_t = DIFFICULTY_ADJUSTMENT_INTERVAL)]
    pub adjust_interval: u64,

    /// Desired seconds per adjustment window
    #[arg(long, env = "HASHLEDGER_TARGET_TIMESPAN", default_value_t = TARGET_TIMESPAN_SECS)]
    pub target_timespan: u64,

    #[arg(long, env = "HASHLEDGER_STRATEGY", value_enum, default_value_t = StrategyArg::Linear)]
    pub strategy: StrategyArg,

    /// Largest jump for the random-step strategy
    #[arg(long, env = "HASHLEDGER_MAX_STEP", default_value_t = DEFAULT_RANDOM_MAX_STEP)]
    pub max_step: u64,

    /// Nonce attempts between cancellation checks
    #[arg(long, env = "HASHLEDGER_CHECK_INTERVAL", default_value_t = CANCEL_CHECK_INTERVAL)]
    pub check_interval: u64,

    /// Reward address used by scheduled mining and by `/mine` without a body
    #[arg(long, env = "HASHLEDGER_MINER_ID", default_value = "node-miner")]
    pub miner_id: String,

    /// Seconds between scheduled mining runs, 0 disables
    #[arg(long, env = "HASHLEDGER_MINE_INTERVAL", default_value_t = 60)]
    pub mine_interval_secs: u64,

    /// Mine as soon as this many transactions are pending, 0 disables
    #[arg(long, env = "HASHLEDGER_AUTO_MINE_THRESHOLD", default_value_t = 0)]
    pub auto_mine_threshold: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Json,
    Sled,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Json => Backend::Json,
            BackendArg::Sled => Backend::Sled,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Linear,
    Random,
    Parallel,
}

impl Args {
    pub fn chain_config(&self) -> ChainConfig {
        let strategy = match self.strategy {
            StrategyArg::Linear => NonceStrategy::Linear,
            StrategyArg::Random => NonceStrategy::RandomStep {
                max_step: self.max_step,
            },
            StrategyArg::Parallel => NonceStrategy::Parallel,
        };
        ChainConfig {
            initial_difficulty: self.difficulty,
            mining_reward: self.reward,
            adjustment_interval: self.adjust_interval,
            target_timespan_secs: self.target_timespan,
            miner: Miner {
                check_interval: self.check_interval,
                ..Miner::new(strategy)
            },
        }
    }
}
