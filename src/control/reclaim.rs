//! Background reclamation of orphaned blocks
//!
//! Blocks dropped by a delete, a shrinking write or an expiry are queued
//! here and released on every storage daemon holding a copy. Failures are
//! logged and not retried.

use crate::core::block_store::MinionTransport;
use crate::core::namespace::entry::BlockDescriptor;
use crate::core::registry::MinionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Reclaimer {
    tx: mpsc::UnboundedSender<BlockDescriptor>,
}

impl Reclaimer {
    /// Queue handle plus the receiving end, without a worker attached
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BlockDescriptor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Reclaimer { tx }, rx)
    }

    /// Start the worker that issues `deleteBlock` for queued blocks
    pub fn spawn(
        registry: Arc<MinionRegistry>,
        transport: Arc<dyn MinionTransport>,
    ) -> (Self, JoinHandle<()>) {
        let (reclaimer, mut rx) = Self::channel();

        let handle = tokio::spawn(async move {
            while let Some(block) = rx.recv().await {
                release(&registry, transport.as_ref(), &block).await;
            }
            debug!("reclaim queue closed");
        });

        (reclaimer, handle)
    }

    pub fn queue(&self, blocks: impl IntoIterator<Item = BlockDescriptor>) {
        for block in blocks {
            if self.tx.send(block).is_err() {
                warn!("reclaim worker stopped, block left on storage daemons");
                return;
            }
        }
    }
}

async fn release(registry: &MinionRegistry, transport: &dyn MinionTransport, block: &BlockDescriptor) {
    for node in block.nodes() {
        let Some(addr) = registry.address(node) else {
            warn!(block = %block.block_id, node = %node, "unknown storage daemon, skipping");
            continue;
        };

        match transport.delete_block(addr, block.block_id).await {
            Ok(true) => info!(block = %block.block_id, node = %node, "block reclaimed"),
            Ok(false) => debug!(block = %block.block_id, node = %node, "block already absent"),
            Err(e) => warn!(
                block = %block.block_id,
                node = %node,
                error = %e,
                "failed to reclaim block"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::namespace::entry::BlockId;
    use crate::error::{DeedsError, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        deleted: Mutex<Vec<(String, BlockId)>>,
    }

    #[async_trait]
    impl MinionTransport for RecordingTransport {
        async fn put(&self, addr: &str, _: BlockId, _: Vec<u8>, _: Vec<String>) -> Result<()> {
            Err(DeedsError::Unreachable {
                addr: addr.to_string(),
                reason: "not used".to_string(),
            })
        }

        async fn get(&self, _: &str, block_id: BlockId) -> Result<Vec<u8>> {
            Err(DeedsError::NotFound(block_id.to_string()))
        }

        async fn delete_block(&self, addr: &str, block_id: BlockId) -> Result<bool> {
            if addr == "down:1" {
                return Err(DeedsError::Timeout(addr.to_string()));
            }
            self.deleted.lock().push((addr.to_string(), block_id));
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_releases_every_copy() {
        let registry = Arc::new(MinionRegistry::parse(&["A:a:1", "B:b:2", "C:down:1"]).unwrap());
        let transport = Arc::new(RecordingTransport::default());
        let (reclaimer, handle) = Reclaimer::spawn(registry, transport.clone());

        let mut block = BlockDescriptor::new(BlockId::generate(), "A".to_string(), 0);
        block.replicas = vec!["C".to_string(), "B".to_string(), "ghost".to_string()];
        reclaimer.queue(vec![block.clone()]);
        drop(reclaimer);
        handle.await.unwrap();

        let deleted = transport.deleted.lock().clone();
        assert_eq!(
            deleted,
            vec![
                ("a:1".to_string(), block.block_id),
                ("b:2".to_string(), block.block_id)
            ]
        );
    }
}
