//! Locked namespace store shared by all control-node request handlers
//!
//! One mutex guards the namespace and the allocator together, so every
//! mutation (entry tables, link counts, block lists) is applied as a single
//! critical section. TTL bookkeeping happens inside the same section;
//! block reclamation is queued after the lock is released.

use crate::config::MasterConfig;
use crate::control::reclaim::Reclaimer;
use crate::core::allocator::BlockAllocator;
use crate::core::expiry::{Countdown, ExpiryTimer};
use crate::core::namespace::entry::{Attributes, BlockDescriptor, EntryAttributes};
use crate::core::namespace::path::{self, ROOT};
use crate::core::namespace::{Namespace, Removal};
use crate::core::registry::{MinionRegistry, NodeId};
use crate::core::snapshot::Snapshot;
use crate::error::{DeedsError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// File system capacity report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFs {
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub block_size: u64,
    pub total_files: u64,
    pub free_files: u64,
}

struct State {
    namespace: Namespace,
    allocator: BlockAllocator,
}

pub struct NamespaceStore {
    state: Mutex<State>,
    registry: Arc<MinionRegistry>,
    expiry: Arc<ExpiryTimer>,
    reclaimer: Reclaimer,
    config: MasterConfig,
}

impl NamespaceStore {
    /// Wrap a namespace; every existing path is armed with the default TTL
    /// and root is made immortal
    pub fn new(
        namespace: Namespace,
        config: MasterConfig,
        registry: Arc<MinionRegistry>,
        expiry: Arc<ExpiryTimer>,
        reclaimer: Reclaimer,
    ) -> Self {
        for p in namespace.paths() {
            if p == ROOT {
                expiry.arm(p, -1);
            } else {
                expiry.arm(p, config.default_ttl);
            }
        }

        // One file may use at most the whole cluster's reported capacity
        let copies = config.replication_factor.clamp(1, registry.len().max(1)) as u64;
        let capacity = config
            .blocks_per_minion
            .saturating_mul(registry.len() as u64);
        let allocator = BlockAllocator::random(
            Arc::clone(&registry),
            config.block_size,
            config.replication_factor,
        )
        .with_max_blocks(capacity / copies);

        NamespaceStore {
            state: Mutex::new(State {
                namespace,
                allocator,
            }),
            registry,
            expiry,
            reclaimer,
            config,
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn expiry(&self) -> &Arc<ExpiryTimer> {
        &self.expiry
    }

    pub fn create(&self, path: &str, mode: u32) -> Result<String> {
        let mut state = self.state.lock();
        let created = state.namespace.create(path, mode)?;
        self.touch(&created);
        Ok(created)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<String> {
        let mut state = self.state.lock();
        let created = state.namespace.mkdir(path, mode)?;
        self.touch(&created);
        Ok(created)
    }

    /// Remove a path (recursively for directories); returns the blocks
    /// queued for reclamation
    pub fn delete(&self, path: &str) -> Result<Vec<BlockDescriptor>> {
        let removal = {
            let mut state = self.state.lock();
            let removal = state.namespace.delete(path)?;
            self.forget(&removal);
            removal
        };
        let reclaimed = removal.reclaimed.clone();
        self.reclaimer.queue(removal.reclaimed);
        Ok(reclaimed)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<String> {
        let new_path = path::normalize(new)?;
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.namespace.rename(old, &new_path)?;
            for (from, to) in &outcome.moved {
                // A countdown collected by the timer but not yet acted on is gone
                if !self.expiry.transplant(from, to) {
                    self.expiry.arm(to, self.config.default_ttl);
                }
            }
            self.forget(&outcome.cascade);
            self.touch(&new_path);
            outcome
        };
        self.reclaimer.queue(outcome.cascade.reclaimed);
        Ok(new_path)
    }

    pub fn read(&self, path: &str) -> Result<Vec<BlockDescriptor>> {
        self.state.lock().namespace.read(path)
    }

    /// Resize a file to `size` bytes, creating it if needed
    pub fn write(&self, path: &str, size: u64) -> Result<Vec<BlockDescriptor>> {
        let target = path::normalize(path)?;
        let outcome = {
            let mut guard = self.state.lock();
            let State {
                namespace,
                allocator,
            } = &mut *guard;
            let outcome = namespace.write(&target, size, allocator)?;
            self.touch(&target);
            outcome
        };

        if !outcome.reclaimed.is_empty() {
            debug!(path = %target, blocks = outcome.reclaimed.len(), "file shrunk");
        }
        self.reclaimer.queue(outcome.reclaimed);
        Ok(outcome.blocks)
    }

    pub fn entry(&self, path: &str) -> Result<(Vec<BlockDescriptor>, EntryAttributes)> {
        self.state.lock().namespace.entry(path)
    }

    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        self.state.lock().namespace.list(path)
    }

    pub fn stat(&self, path: &str) -> Result<Attributes> {
        self.state.lock().namespace.stat(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().namespace.contains(path)
    }

    pub fn block_size(&self) -> u64 {
        self.config.block_size
    }

    pub fn minions(&self) -> BTreeMap<NodeId, String> {
        self.registry.to_map()
    }

    pub fn statfs(&self) -> StatFs {
        let state = self.state.lock();
        let total_blocks = self
            .config
            .blocks_per_minion
            .saturating_mul(self.registry.len() as u64);
        StatFs {
            total_blocks,
            free_blocks: total_blocks.saturating_sub(state.namespace.allocated_blocks()),
            block_size: self.config.block_size,
            total_files: self.config.max_files,
            free_files: self
                .config
                .max_files
                .saturating_sub(state.namespace.len() as u64),
        }
    }

    /// Reset the countdown of an existing path
    ///
    /// Ancestors are kept alive at least as long as the path itself.
    pub fn set_expire_time(&self, path: &str, ttl: i64) -> Result<()> {
        let target = path::normalize(path)?;
        let state = self.state.lock();
        if !state.namespace.contains(&target) {
            return Err(DeedsError::NotFound(target));
        }
        if target == ROOT {
            return Err(DeedsError::InvalidPath("root never expires".to_string()));
        }
        let countdown = Countdown::from_ttl(ttl);
        self.expiry.set(&target, countdown);
        for ancestor in path::ancestors(&target) {
            if ancestor != ROOT {
                self.expiry.refresh(ancestor, self.config.default_ttl);
                self.expiry.extend(ancestor, countdown);
            }
        }
        info!(path = %target, ttl, "expiry reset");
        Ok(())
    }

    /// Delete a path whose countdown lapsed
    ///
    /// Returns `false` if the path is gone already or was re-armed after the
    /// timer collected it.
    pub fn expire(&self, path: &str) -> Result<bool> {
        let removal = {
            let mut state = self.state.lock();
            if path == ROOT || self.expiry.is_armed(path) || !state.namespace.contains(path) {
                return Ok(false);
            }
            let removal = state.namespace.delete(path)?;
            self.forget(&removal);
            removal
        };
        info!(path = %path, removed = removal.removed.len(), "expired entry deleted");
        self.reclaimer.queue(removal.reclaimed);
        Ok(true)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().namespace.snapshot()
    }

    /// Arm `target` and keep its ancestors alive
    fn touch(&self, target: &str) {
        let ttl = self.config.default_ttl;
        self.expiry.refresh(target, ttl);
        for ancestor in path::ancestors(target) {
            if ancestor != ROOT {
                self.expiry.refresh(ancestor, ttl);
            }
        }
    }

    fn forget(&self, removal: &Removal) {
        for removed in &removal.removed {
            self.expiry.disarm(removed);
        }
    }
}
