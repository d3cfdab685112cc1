//! Block placement policies

use crate::core::registry::{MinionRegistry, NodeId};
use crate::error::{DeedsError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Chooses which storage daemons hold a block
pub trait PlacementPolicy: Send {
    /// Pick up to `copies` distinct node ids; the first one is the primary
    fn choose(&mut self, registry: &MinionRegistry, copies: usize) -> Result<Vec<NodeId>>;
}

/// Uniformly random placement without replacement
#[derive(Debug)]
pub struct RandomPlacement {
    rng: StdRng,
}

impl RandomPlacement {
    pub fn new() -> Self {
        RandomPlacement {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic placement for tests
    pub fn seeded(seed: u64) -> Self {
        RandomPlacement {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPlacement {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementPolicy for RandomPlacement {
    fn choose(&mut self, registry: &MinionRegistry, copies: usize) -> Result<Vec<NodeId>> {
        if registry.is_empty() {
            return Err(DeedsError::NoMinions);
        }

        let mut ids = registry.ids();
        ids.shuffle(&mut self.rng);
        ids.truncate(copies.clamp(1, registry.len()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn registry() -> MinionRegistry {
        MinionRegistry::parse(&["A:h:1", "B:h:2", "C:h:3"]).unwrap()
    }

    #[test]
    fn test_choices_are_distinct() {
        let mut policy = RandomPlacement::seeded(7);
        for _ in 0..100 {
            let chosen = policy.choose(&registry(), 3).unwrap();
            let unique: HashSet<_> = chosen.iter().collect();
            assert_eq!(chosen.len(), 3);
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn test_copies_clamped_to_registry() {
        let mut policy = RandomPlacement::seeded(1);
        assert_eq!(policy.choose(&registry(), 10).unwrap().len(), 3);
        assert_eq!(policy.choose(&registry(), 0).unwrap().len(), 1);
    }

    #[test]
    fn test_every_node_gets_picked() {
        let mut policy = RandomPlacement::seeded(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(policy.choose(&registry(), 1).unwrap().remove(0));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_registry() {
        let mut policy = RandomPlacement::new();
        let err = policy.choose(&MinionRegistry::default(), 1).unwrap_err();
        assert!(matches!(err, DeedsError::NoMinions));
    }
}
