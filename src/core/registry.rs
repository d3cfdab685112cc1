//! Storage daemon registry
//!
//! Populated once from configuration; read-only afterwards.

use crate::error::{DeedsError, Result};
use std::collections::BTreeMap;

/// Identifier of a storage daemon (e.g. `"A"`)
pub type NodeId = String;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinionRegistry {
    minions: BTreeMap<NodeId, String>,
}

impl MinionRegistry {
    /// Build a registry from `id:host:port` registrations
    pub fn parse<S: AsRef<str>>(registrations: &[S]) -> Result<Self> {
        let mut minions = BTreeMap::new();

        for registration in registrations {
            let registration = registration.as_ref().trim();
            // Host may itself contain ':' (bracketed IPv6), so split from both ends
            let parts = registration
                .split_once(':')
                .and_then(|(id, rest)| rest.rsplit_once(':').map(|(host, port)| (id, host, port)));
            let (id, host, port) = match parts {
                Some((id, host, port)) if !id.is_empty() && !host.is_empty() => (id, host, port),
                _ => {
                    return Err(DeedsError::Config(format!(
                        "invalid minion registration '{}' (expected id:host:port)",
                        registration
                    )))
                }
            };

            port.parse::<u16>().map_err(|_| {
                DeedsError::Config(format!("invalid port in minion registration '{}'", registration))
            })?;

            if minions
                .insert(id.to_string(), format!("{}:{}", host, port))
                .is_some()
            {
                return Err(DeedsError::Config(format!("duplicate minion id '{}'", id)));
            }
        }

        Ok(MinionRegistry { minions })
    }

    pub fn address(&self, id: &str) -> Option<&str> {
        self.minions.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.minions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.minions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<NodeId, String> {
        self.minions.clone()
    }
}
