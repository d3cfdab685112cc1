//! Namespace entry structures

use crate::core::registry::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// File type bits of `st_mode` for a directory
pub const S_IFDIR: u32 = 0o040000;

/// File type bits of `st_mode` for a regular file
pub const S_IFREG: u32 = 0o100000;

const S_IFMT: u32 = 0o170000;
const PERMISSION_BITS: u32 = 0o7777;

/// Globally unique block identifier
///
/// Generated from random UUIDs and never reused, so bytes of a deleted
/// block can never be mistaken for a new block's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Uuid);

impl BlockId {
    pub fn generate() -> Self {
        BlockId(Uuid::new_v4())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for BlockId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(BlockId)
    }
}

/// Placement of one block of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub block_id: BlockId,

    /// Storage daemon that receives the client's put
    pub node_id: NodeId,

    /// Position within the file (0-based, contiguous)
    pub index: u64,

    /// Further chain members, in forwarding order
    pub replicas: Vec<NodeId>,
}

impl BlockDescriptor {
    pub fn new(block_id: BlockId, node_id: NodeId, index: u64) -> Self {
        BlockDescriptor {
            block_id,
            node_id,
            index,
            replicas: Vec::new(),
        }
    }

    /// Primary first, then the replica chain
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        std::iter::once(&self.node_id).chain(self.replicas.iter())
    }
}

/// POSIX-style attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub st_mode: u32,
    pub st_nlink: u64,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_size: u64,
    pub st_atime: u64,
    pub st_mtime: u64,
    pub st_ctime: u64,
    pub st_blocks: u64,
    pub st_blksize: u64,
    pub st_ino: u64,
    pub st_dev: u64,
}

impl Attributes {
    fn new(file_type: u32, mode: u32, blksize: u64) -> Self {
        let now = now_secs();
        Attributes {
            st_mode: file_type | (mode & PERMISSION_BITS),
            st_nlink: 1,
            st_uid: 0,
            st_gid: 0,
            st_size: 0,
            st_atime: now,
            st_mtime: now,
            st_ctime: now,
            st_blocks: 0,
            st_blksize: blksize,
            st_ino: 0,
            st_dev: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.st_mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.st_mode & S_IFMT == S_IFREG
    }

    pub fn permissions(&self) -> u32 {
        self.st_mode & PERMISSION_BITS
    }
}

/// Names listed by a directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirChildren {
    pub files: BTreeSet<String>,
    pub folders: BTreeSet<String>,
}

impl DirChildren {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains(name) || self.folders.contains(name)
    }

    /// Union of file and directory names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.union(&self.folders).cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.files.remove(name);
        self.folders.remove(name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { blocks: Vec<BlockDescriptor> },
    Directory { children: DirChildren },
}

/// One path in the namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub attrs: Attributes,
    pub kind: EntryKind,
}

impl NamespaceEntry {
    pub fn file(mode: u32, block_size: u64) -> Self {
        NamespaceEntry {
            attrs: Attributes::new(S_IFREG, mode, block_size),
            kind: EntryKind::File { blocks: Vec::new() },
        }
    }

    pub fn directory(mode: u32) -> Self {
        NamespaceEntry {
            attrs: Attributes::new(S_IFDIR, mode, 0),
            kind: EntryKind::Directory {
                children: DirChildren::default(),
            },
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// Block list of a file; empty for directories
    pub fn blocks(&self) -> &[BlockDescriptor] {
        match &self.kind {
            EntryKind::File { blocks } => blocks,
            EntryKind::Directory { .. } => &[],
        }
    }

    pub fn children(&self) -> Option<&DirChildren> {
        match &self.kind {
            EntryKind::Directory { children } => Some(children),
            EntryKind::File { .. } => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut DirChildren> {
        match &mut self.kind {
            EntryKind::Directory { children } => Some(children),
            EntryKind::File { .. } => None,
        }
    }

    /// Attribute view including child names, as served to clients
    pub fn view(&self) -> EntryAttributes {
        EntryAttributes {
            stat: self.attrs.clone(),
            children: self.children().cloned(),
        }
    }
}

/// Attributes of an entry plus, for directories, its child names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttributes {
    pub stat: Attributes,
    pub children: Option<DirChildren>,
}

/// Current Unix time in seconds
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
