//! Periodic mining. Each tick is an ordinary `mine_pending` call.

use crate::api::{mine_blocking, ApiError};
use hashledger_core::Blockchain;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Mine every `every` until `shutdown` flips to true. The first run happens
/// one full period after start.
pub fn spawn(
    chain: Arc<Blockchain>,
    miner_id: String,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(every_secs = every.as_secs(), miner = %miner_id, "mining scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match mine_blocking(Arc::clone(&chain), miner_id.clone()).await {
                        Ok(block) => info!(index = block.index(), "scheduled mine sealed block"),
                        Err(ApiError::Ledger(e)) if e.is_noop() => {
                            debug!("scheduled mine skipped, mempool empty");
                        }
                        Err(e) => warn!(error = %e, "scheduled mine failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("mining scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashledger_core::{ChainConfig, Metadata, Transaction};

    #[tokio::test]
    async fn scheduler_mines_pending_transactions() {
        let chain = Arc::new(
            Blockchain::in_memory(ChainConfig {
                initial_difficulty: 1,
                ..ChainConfig::default()
            })
            .unwrap(),
        );
        chain.submit_transaction(
            Transaction::create("alice", "bob", 1.0, Metadata::new()).unwrap(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = spawn(
            Arc::clone(&chain),
            "sched".into(),
            Duration::from_millis(50),
            rx,
        );

        for _ in 0..100 {
            if chain.block_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(chain.block_count(), 2);
        assert_eq!(chain.get_balance("sched"), chain.mining_reward());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
