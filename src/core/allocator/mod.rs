//! Block allocation for files
//!
//! A file of `size` bytes owns exactly `ceil(size / block_size)` blocks.
//! Growing a file appends freshly identified blocks placed by a
//! [`PlacementPolicy`]; shrinking pops blocks from the tail and hands them
//! back for reclamation on their storage daemons.
//!
//! A file never holds more than [`max_blocks`](BlockAllocator::max_blocks)
//! blocks; larger sizes are rejected before anything is allocated.

pub mod placement;

pub use placement::{PlacementPolicy, RandomPlacement};

use crate::core::namespace::entry::{BlockDescriptor, BlockId};
use crate::core::registry::MinionRegistry;
use crate::error::{DeedsError, Result};
use std::sync::Arc;

/// Per-file block limit unless configured otherwise
pub const DEFAULT_MAX_FILE_BLOCKS: u64 = 1 << 20;

pub struct BlockAllocator<P: PlacementPolicy = RandomPlacement> {
    registry: Arc<MinionRegistry>,
    block_size: u64,
    replication_factor: usize,
    max_blocks: u64,
    policy: P,
}

impl BlockAllocator<RandomPlacement> {
    /// Allocator with uniformly random placement
    pub fn random(registry: Arc<MinionRegistry>, block_size: u64, replication_factor: usize) -> Self {
        Self::new(registry, block_size, replication_factor, RandomPlacement::new())
    }
}

impl<P: PlacementPolicy> BlockAllocator<P> {
    pub fn new(
        registry: Arc<MinionRegistry>,
        block_size: u64,
        replication_factor: usize,
        policy: P,
    ) -> Self {
        BlockAllocator {
            registry,
            block_size: block_size.max(1),
            replication_factor: replication_factor.max(1),
            max_blocks: DEFAULT_MAX_FILE_BLOCKS,
            policy,
        }
    }

    /// Cap the number of blocks a single file may hold
    pub fn with_max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn registry(&self) -> &MinionRegistry {
        &self.registry
    }

    /// Number of blocks needed to hold `size` bytes
    pub fn block_count(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size)
    }

    /// Grow or shrink `blocks` to exactly `target` descriptors
    ///
    /// Returns the descriptors removed from the tail. On error `blocks` is
    /// left untouched.
    pub fn resize(
        &mut self,
        blocks: &mut Vec<BlockDescriptor>,
        target: u64,
    ) -> Result<Vec<BlockDescriptor>> {
        let current = blocks.len() as u64;

        if target > current {
            if target > self.max_blocks {
                return Err(DeedsError::FileTooLarge(format!(
                    "{} blocks requested, at most {} per file",
                    target, self.max_blocks
                )));
            }

            let additional = usize::try_from(target - current)
                .map_err(|_| DeedsError::FileTooLarge(format!("{} blocks requested", target)))?;
            let mut fresh = Vec::new();
            fresh.try_reserve_exact(additional).map_err(|_| {
                DeedsError::FileTooLarge(format!("cannot reserve {} block descriptors", additional))
            })?;
            for index in current..target {
                let mut nodes = self
                    .policy
                    .choose(&self.registry, self.replication_factor)?
                    .into_iter();
                let primary = nodes.next().ok_or(DeedsError::NoMinions)?;

                let mut descriptor = BlockDescriptor::new(BlockId::generate(), primary, index);
                descriptor.replicas = nodes.collect();
                fresh.push(descriptor);
            }
            blocks.extend(fresh);
            Ok(Vec::new())
        } else {
            Ok(blocks.split_off(target as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn allocator(block_size: u64, replication: usize) -> BlockAllocator {
        let registry = Arc::new(MinionRegistry::parse(&["A:h:1", "B:h:2", "C:h:3"]).unwrap());
        BlockAllocator::new(registry, block_size, replication, RandomPlacement::seeded(3))
    }

    #[test]
    fn test_block_count_rounds_up() {
        let alloc = allocator(64, 1);
        assert_eq!(alloc.block_count(0), 0);
        assert_eq!(alloc.block_count(1), 1);
        assert_eq!(alloc.block_count(64), 1);
        assert_eq!(alloc.block_count(65), 2);
    }

    #[test]
    fn test_grow_assigns_contiguous_indices() {
        let mut alloc = allocator(64, 1);
        let mut blocks = Vec::new();

        let reclaimed = alloc.resize(&mut blocks, 4).unwrap();
        assert!(reclaimed.is_empty());
        assert_eq!(blocks.len(), 4);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index, i as u64);
            assert!(block.replicas.is_empty());
        }

        let ids: HashSet<_> = blocks.iter().map(|b| b.block_id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_shrink_returns_tail() {
        let mut alloc = allocator(64, 1);
        let mut blocks = Vec::new();
        alloc.resize(&mut blocks, 5).unwrap();
        let tail: Vec<_> = blocks[2..].to_vec();

        let reclaimed = alloc.resize(&mut blocks, 2).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(reclaimed, tail);
    }

    #[test]
    fn test_grow_keeps_existing_blocks() {
        let mut alloc = allocator(64, 1);
        let mut blocks = Vec::new();
        alloc.resize(&mut blocks, 2).unwrap();
        let head = blocks.clone();

        alloc.resize(&mut blocks, 3).unwrap();
        assert_eq!(&blocks[..2], &head[..]);
        assert_eq!(blocks[2].index, 2);
    }

    #[test]
    fn test_replicas_are_distinct_from_primary() {
        let mut alloc = allocator(64, 3);
        let mut blocks = Vec::new();
        alloc.resize(&mut blocks, 10).unwrap();

        for block in &blocks {
            assert_eq!(block.replicas.len(), 2);
            let nodes: HashSet<_> = block.nodes().collect();
            assert_eq!(nodes.len(), 3);
        }
    }

    #[test]
    fn test_oversized_grow_is_rejected() {
        let mut alloc = allocator(64, 1).with_max_blocks(8);
        let mut blocks = Vec::new();
        alloc.resize(&mut blocks, 8).unwrap();

        let err = alloc.resize(&mut blocks, 9).unwrap_err();
        assert!(matches!(err, DeedsError::FileTooLarge(_)));
        assert_eq!(blocks.len(), 8);

        let target = alloc.block_count(u64::MAX);
        assert!(matches!(alloc.resize(&mut blocks, target), Err(DeedsError::FileTooLarge(_))));

        // Shrinking is always allowed
        assert_eq!(alloc.resize(&mut blocks, 1).unwrap().len(), 7);
    }

    #[test]
    fn test_no_minions_leaves_blocks_untouched() {
        let mut alloc = BlockAllocator::random(Arc::new(MinionRegistry::default()), 64, 1);
        let mut blocks = Vec::new();
        assert!(alloc.resize(&mut blocks, 3).is_err());
        assert!(blocks.is_empty());
    }
}
