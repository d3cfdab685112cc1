//! Namespace snapshots used for backup and recovery
//!
//! A snapshot is the full `(file_table, file_attributes)` pair. It is
//! immutable once taken and replaced wholesale by the next one.

use crate::core::namespace::entry::{BlockDescriptor, EntryAttributes};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Creation timestamp (Unix epoch seconds)
    pub taken_at: u64,

    /// Path to ordered block list (directories map to an empty list)
    pub file_table: BTreeMap<String, Vec<BlockDescriptor>>,

    /// Path to attributes and, for directories, child names
    pub file_attributes: BTreeMap<String, EntryAttributes>,
}

impl Snapshot {
    /// Number of paths captured
    pub fn len(&self) -> usize {
        self.file_attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_attributes.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
