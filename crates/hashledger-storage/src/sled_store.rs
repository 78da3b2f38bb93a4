use anyhow::{Context, Result};
use hashledger_core::{Block, ChainStore, SnapshotRead};
use sled::{Batch, Db, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// Blocks stored one per key in a sled tree, keyed by big-endian index so
/// iteration order is chain order.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    blocks: Tree,
    path: PathBuf,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).with_context(|| format!("open sled at {}", path.display()))?;
        let blocks = db.open_tree(TREE_BLOCKS).context("open blocks tree")?;
        info!(path = %path.display(), "sled store opened");
        Ok(Self { db, blocks, path })
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("flush sled")?;
        Ok(())
    }

    /// Raw tree handle, for inspection and fault injection in tests.
    pub fn tree(&self) -> &Tree {
        &self.blocks
    }
}

impl ChainStore for SledStore {
    fn save_snapshot(&self, blocks: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for block in blocks {
            let bytes = serde_json::to_vec(block).context("encode block")?;
            batch.insert(block.index().to_be_bytes().to_vec(), bytes);
        }
        // Drop anything past the new tip.
        let stale_from = (blocks.len() as u64).to_be_bytes();
        for key in self.blocks.range(stale_from..).keys() {
            batch.remove(key.context("scan stale keys")?);
        }
        self.blocks.apply_batch(batch).context("apply block batch")?;
        self.flush()?;
        debug!(blocks = blocks.len(), "sled snapshot written");
        Ok(())
    }

    fn load_snapshot(&self) -> Result<SnapshotRead> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for entry in self.blocks.iter() {
            let (key, value) = entry.context("read blocks tree")?;
            let Ok(key) = <[u8; 8]>::try_from(key.as_ref()) else {
                return Ok(SnapshotRead::Corrupt(format!(
                    "malformed key of {} bytes",
                    key.len()
                )));
            };
            let index = u64::from_be_bytes(key);
            if index != blocks.len() as u64 {
                return Ok(SnapshotRead::Corrupt(format!(
                    "expected block {} but found {index}",
                    blocks.len()
                )));
            }
            match serde_json::from_slice::<Block>(&value) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    return Ok(SnapshotRead::Corrupt(format!("block {index}: {e}")));
                }
            }
        }
        if blocks.is_empty() {
            return Ok(SnapshotRead::Missing);
        }
        Ok(SnapshotRead::Blocks(blocks))
    }

    fn describe(&self) -> String {
        format!("sled:{}", self.path.display())
    }
}
