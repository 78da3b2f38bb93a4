//! Pending transaction pool
//!
//! Insertion-ordered staging buffer for transactions awaiting a block.
//! Duplicates and conflicting spends are accepted as-is: the ledger has no
//! double-spend protection.

use crate::transaction::Transaction;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Mempool {
    pending: Mutex<Vec<Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, tx: Transaction) {
        let mut pending = self.pending.lock();
        debug!(id = %tx.id(), queued = pending.len() + 1, "transaction queued");
        pending.push(tx);
    }

    /// Copy of the pending transactions; the pool is left untouched.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.lock().clone()
    }

    /// Take every pending transaction, leaving the pool empty.
    pub fn drain(&self) -> Vec<Transaction> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Put previously drained transactions back ahead of anything queued
    /// since the drain, keeping their original order.
    pub fn requeue(&self, mut txs: Vec<Transaction>) {
        if txs.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        debug!(restored = txs.len(), "requeueing drained transactions");
        txs.append(&mut pending);
        *pending = txs;
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Metadata;
    use std::sync::Arc;

    fn tx(n: u64) -> Transaction {
        Transaction::with_timestamp("alice", "bob", n as f64, Metadata::new(), 1_600_000_000 + n)
            .unwrap()
    }

    #[test]
    fn submit_preserves_order_and_duplicates() {
        let pool = Mempool::new();
        pool.submit(tx(1));
        pool.submit(tx(2));
        pool.submit(tx(1));
        let snap = pool.snapshot();
        assert_eq!(snap, vec![tx(1), tx(2), tx(1)]);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn drain_empties_the_pool() {
        let pool = Mempool::new();
        pool.submit(tx(1));
        pool.submit(tx(2));
        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
        assert!(pool.drain().is_empty());
    }

    #[test]
    fn snapshot_does_not_clear() {
        let pool = Mempool::new();
        pool.submit(tx(7));
        assert_eq!(pool.snapshot().len(), 1);
        assert_eq!(pool.snapshot().len(), 1);
    }

    #[test]
    fn requeue_goes_to_the_front() {
        let pool = Mempool::new();
        pool.submit(tx(1));
        pool.submit(tx(2));
        let drained = pool.drain();
        pool.submit(tx(3));
        pool.requeue(drained);
        assert_eq!(pool.snapshot(), vec![tx(1), tx(2), tx(3)]);
    }

    #[test]
    fn concurrent_submissions_are_not_lost() {
        let pool = Arc::new(Mempool::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        pool.submit(tx(t * 1_000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let drained = pool.drain();
        assert_eq!(drained.len(), 800);
        let unique: std::collections::HashSet<_> = drained.iter().map(|t| t.id().to_string()).collect();
        assert_eq!(unique.len(), 800);
    }
}
