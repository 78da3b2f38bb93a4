use anyhow::{Context, Result};
use hashledger_core::{Block, ChainStore, SnapshotRead};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Whole-chain JSON snapshot in a single file.
///
/// Writes go to `<path>.tmp`, are fsynced and then renamed over `<path>`,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    pub fn corrupt_path(&self) -> PathBuf {
        self.sibling(".corrupt")
    }
}

impl ChainStore for JsonFileStore {
    fn save_snapshot(&self, blocks: &[Block]) -> Result<()> {
        let tmp = self.temp_path();
        let bytes = serde_json::to_vec_pretty(blocks).context("encode chain snapshot")?;
        {
            let mut file =
                File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            file.write_all(&bytes)
                .with_context(|| format!("write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("fsync {}", tmp.display()))?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        debug!(path = %self.path.display(), blocks = blocks.len(), "chain snapshot written");
        Ok(())
    }

    fn load_snapshot(&self) -> Result<SnapshotRead> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SnapshotRead::Missing),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };
        match serde_json::from_slice::<Vec<Block>>(&bytes) {
            Ok(blocks) => Ok(SnapshotRead::Blocks(blocks)),
            Err(e) => {
                let backup = self.corrupt_path();
                fs::copy(&self.path, &backup)
                    .with_context(|| format!("back up {}", self.path.display()))?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "unparseable chain snapshot set aside"
                );
                Ok(SnapshotRead::Corrupt(e.to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
