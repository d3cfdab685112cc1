//! Block storage on a storage daemon (minion)
//!
//! Blocks are plain files named by block id under the data directory.
//! A put stores the bytes locally and, when given a peer list, relays the
//! same put to the first peer with the rest of the list, so each daemon in
//! the chain both persists and forwards. The initiating put completes only
//! after every downstream peer has acknowledged.

use crate::core::namespace::entry::BlockId;
use crate::error::{DeedsError, Result};
use async_trait::async_trait;
use rand::Rng;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// How a storage daemon (or the control node) reaches other storage daemons
#[async_trait]
pub trait MinionTransport: Send + Sync {
    async fn put(&self, addr: &str, block_id: BlockId, data: Vec<u8>, peers: Vec<String>)
        -> Result<()>;

    async fn get(&self, addr: &str, block_id: BlockId) -> Result<Vec<u8>>;

    async fn delete_block(&self, addr: &str, block_id: BlockId) -> Result<bool>;
}

pub struct BlockStore {
    data_dir: PathBuf,
    wipe_passes: usize,
    transport: Arc<dyn MinionTransport>,
}

impl BlockStore {
    /// Open (and create if needed) a block directory
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        wipe_passes: usize,
        transport: Arc<dyn MinionTransport>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        if !tokio::fs::try_exists(&data_dir).await? {
            tokio::fs::create_dir_all(&data_dir).await?;
            info!(dir = %data_dir.display(), "created data directory");
        }

        Ok(BlockStore {
            data_dir,
            wipe_passes,
            transport,
        })
    }

    fn block_path(&self, block_id: BlockId) -> PathBuf {
        self.data_dir.join(block_id.to_string())
    }

    /// Store a block, overwriting any previous bytes, then relay it along
    /// the peer chain
    pub async fn put(&self, block_id: BlockId, data: Vec<u8>, peers: Vec<String>) -> Result<()> {
        let path = self.block_path(block_id);
        tokio::fs::write(&path, &data).await?;
        info!(block = %block_id, bytes = data.len(), "stored block");

        if let Some((next, rest)) = peers.split_first() {
            debug!(block = %block_id, next = %next, remaining = rest.len(), "forwarding block");
            self.transport
                .put(next, block_id, data, rest.to_vec())
                .await?;
            info!(block = %block_id, peer = %next, "forwarded block");
        }

        Ok(())
    }

    pub async fn get(&self, block_id: BlockId) -> Result<Vec<u8>> {
        match tokio::fs::read(self.block_path(block_id)).await {
            Ok(data) => {
                debug!(block = %block_id, bytes = data.len(), "retrieved block");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(block = %block_id, "block not found");
                Err(DeedsError::NotFound(format!("block {}", block_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, block_id: BlockId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.block_path(block_id)).await?)
    }

    /// Wipe and remove a block; `false` if it was not stored here
    pub async fn delete_block(&self, block_id: BlockId) -> Result<bool> {
        let path = self.block_path(block_id);
        if !tokio::fs::try_exists(&path).await? {
            warn!(block = %block_id, "attempted to delete non-existent block");
            return Ok(false);
        }

        overwrite_with_noise(&path, self.wipe_passes).await?;
        tokio::fs::remove_file(&path).await?;
        info!(block = %block_id, passes = self.wipe_passes, "deleted block");
        Ok(true)
    }
}

/// Overwrite a file in place with random non-zero bytes, syncing each pass
async fn overwrite_with_noise(path: &Path, passes: usize) -> Result<()> {
    let len = tokio::fs::metadata(path).await?.len() as usize;
    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;

    for _ in 0..passes {
        let noise = random_noise(len);
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(&noise).await?;
        file.sync_data().await?;
    }

    Ok(())
}

fn random_noise(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(1..=u8::MAX)).collect()
}
