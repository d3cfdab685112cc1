//! Hierarchical namespace of files and directories
//!
//! The namespace maps absolute paths to [`NamespaceEntry`] values. Every
//! entry except root is listed by exactly one parent directory.
//!
//! Link counts follow path depth: each entry starts at 1 and every
//! creation adds 1 to all of its ancestors (root included), every removal
//! subtracts 1 from the same chain. A directory therefore counts itself
//! plus all of its descendants. A non-root directory whose count drops to
//! zero is removed as well.
//!
//! The namespace performs no locking of its own; callers wrap it in a
//! single lock so each operation is one critical section.

pub mod entry;
pub mod path;


use crate::core::allocator::{BlockAllocator, PlacementPolicy};
use crate::core::snapshot::Snapshot;
use crate::error::{DeedsError, Result};
use entry::{
    now_secs, Attributes, BlockDescriptor, EntryAttributes, EntryKind, NamespaceEntry,
};
use path::ROOT;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default permissions for files created implicitly by `write`
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permissions for root
pub const ROOT_MODE: u32 = 0o755;

/// Paths and blocks released by a removal
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Every removed path, children before their parents
    pub removed: Vec<String>,

    /// Block descriptors whose bytes should be reclaimed
    pub reclaimed: Vec<BlockDescriptor>,
}

impl Removal {
    fn absorb(&mut self, other: Removal) {
        self.removed.extend(other.removed);
        self.reclaimed.extend(other.reclaimed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The file's block list after the write
    pub blocks: Vec<BlockDescriptor>,

    /// Blocks popped by a shrink
    pub reclaimed: Vec<BlockDescriptor>,

    /// True if the write created the file
    pub created: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    /// `(old, new)` for every path in the moved subtree
    pub moved: Vec<(String, String)>,

    /// Directories removed by the link-count cascade
    pub cascade: Removal,
}

#[derive(Debug, Clone)]
pub struct Namespace {
    entries: BTreeMap<String, NamespaceEntry>,
    block_size: u64,
}

impl Namespace {
    /// Empty namespace holding only root
    pub fn new(block_size: u64) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT.to_string(), NamespaceEntry::directory(ROOT_MODE));
        Namespace {
            entries,
            block_size,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Number of entries, root included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn contains(&self, path: &str) -> bool {
        path::normalize(path)
            .map(|p| self.entries.contains_key(&p))
            .unwrap_or(false)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Physical block copies referenced by all files
    pub fn allocated_blocks(&self) -> u64 {
        self.entries
            .values()
            .flat_map(|e| e.blocks())
            .map(|b| b.nodes().count() as u64)
            .sum()
    }

    pub fn create(&mut self, path: &str, mode: u32) -> Result<String> {
        let entry = NamespaceEntry::file(mode, self.block_size);
        self.insert(path, entry)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<String> {
        self.insert(path, NamespaceEntry::directory(mode))
    }

    fn insert(&mut self, path: &str, entry: NamespaceEntry) -> Result<String> {
        let path = path::normalize(path)?;
        if self.entries.contains_key(&path) {
            return Err(DeedsError::AlreadyExists(path));
        }

        let parent = path::parent(&path)
            .ok_or_else(|| DeedsError::AlreadyExists(path.clone()))?
            .to_string();
        let name = path::file_name(&path).to_string();
        let is_dir = entry.is_directory();

        let children = self
            .entries
            .get_mut(&parent)
            .ok_or_else(|| DeedsError::NotFound(parent.clone()))?
            .children_mut()
            .ok_or_else(|| DeedsError::NotADirectory(parent.clone()))?;
        if is_dir {
            children.folders.insert(name);
        } else {
            children.files.insert(name);
        }

        self.entries.insert(path.clone(), entry);
        self.adjust_links(&path, 1);
        debug!(path = %path, is_dir, "namespace entry created");
        Ok(path)
    }

    /// Remove a path and everything beneath it
    pub fn delete(&mut self, path: &str) -> Result<Removal> {
        let path = path::normalize(path)?;
        if path == ROOT {
            return Err(DeedsError::InvalidPath("root cannot be deleted".to_string()));
        }
        if !self.entries.contains_key(&path) {
            return Err(DeedsError::NotFound(path));
        }

        let mut removal = Removal::default();
        self.remove_subtree(&path, &mut removal);
        self.cascade(&path, &mut removal);
        debug!(
            path = %path,
            removed = removal.removed.len(),
            reclaimed = removal.reclaimed.len(),
            "namespace entry deleted"
        );
        Ok(removal)
    }

    /// Depth-first removal; each removed entry unlinks itself from its
    /// parent and decrements its ancestor chain
    fn remove_subtree(&mut self, path: &str, removal: &mut Removal) {
        let child_names = match self.entries.get(path) {
            Some(entry) => entry.children().map(|c| c.names()).unwrap_or_default(),
            None => return,
        };
        for name in child_names {
            self.remove_subtree(&path::join(path, &name), removal);
        }

        let entry = match self.entries.remove(path) {
            Some(entry) => entry,
            None => return,
        };
        if let EntryKind::File { blocks } = entry.kind {
            removal.reclaimed.extend(blocks);
        }

        if let Some(parent) = path::parent(path) {
            if let Some(children) = self.entries.get_mut(parent).and_then(|e| e.children_mut()) {
                children.remove(path::file_name(path));
            }
        }
        self.adjust_links(path, -1);
        removal.removed.push(path.to_string());
    }

    /// Remove non-root ancestors of `path` whose link count reached zero
    fn cascade(&mut self, path: &str, removal: &mut Removal) {
        let ancestors: Vec<String> = path::ancestors(path).map(String::from).collect();
        for ancestor in ancestors {
            if ancestor == ROOT {
                break;
            }
            let exhausted = self
                .entries
                .get(&ancestor)
                .map(|e| e.attrs.st_nlink == 0)
                .unwrap_or(false);
            if exhausted {
                warn!(path = %ancestor, "link count reached zero, removing directory");
                let mut nested = Removal::default();
                self.remove_subtree(&ancestor, &mut nested);
                removal.absorb(nested);
            }
        }
    }

    fn adjust_links(&mut self, path: &str, delta: i64) {
        let ancestors: Vec<String> = path::ancestors(path).map(String::from).collect();
        for ancestor in ancestors {
            if let Some(entry) = self.entries.get_mut(&ancestor) {
                let nlink = &mut entry.attrs.st_nlink;
                *nlink = if delta >= 0 {
                    nlink.saturating_add(delta as u64)
                } else {
                    nlink.saturating_sub(delta.unsigned_abs())
                };
            }
        }
    }

    /// Move an entry, and its whole subtree for a directory, to `new`
    pub fn rename(&mut self, old: &str, new: &str) -> Result<RenameOutcome> {
        let old = path::normalize(old)?;
        let new = path::normalize(new)?;

        if old == ROOT {
            return Err(DeedsError::InvalidPath("root cannot be renamed".to_string()));
        }
        if !self.entries.contains_key(&old) {
            return Err(DeedsError::NotFound(old));
        }
        if old == new {
            return Ok(RenameOutcome::default());
        }
        if self.entries.contains_key(&new) {
            return Err(DeedsError::AlreadyExists(new));
        }
        if path::is_within(&new, &old) {
            return Err(DeedsError::InvalidPath(format!(
                "cannot move {} into its own subtree {}",
                old, new
            )));
        }

        let new_parent = path::parent(&new)
            .ok_or_else(|| DeedsError::AlreadyExists(new.clone()))?
            .to_string();
        match self.entries.get(&new_parent) {
            None => return Err(DeedsError::NotFound(new_parent)),
            Some(entry) if !entry.is_directory() => {
                return Err(DeedsError::NotADirectory(new_parent))
            }
            Some(_) => {}
        }

        let subtree: Vec<String> = self
            .entries
            .range(old.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(old.as_str()))
            .filter(|k| path::is_within(k, &old))
            .cloned()
            .collect();
        let count = subtree.len() as i64;

        // Detach from the old location
        let is_dir = self.entries.get(&old).map(|e| e.is_directory()).unwrap_or(false);
        if let Some(parent) = path::parent(&old) {
            if let Some(children) = self.entries.get_mut(parent).and_then(|e| e.children_mut()) {
                children.remove(path::file_name(&old));
            }
        }
        self.adjust_links(&old, -count);

        let mut moved = Vec::with_capacity(subtree.len());
        for from in subtree {
            if let Some(entry) = self.entries.remove(&from) {
                let to = format!("{}{}", new, &from[old.len()..]);
                self.entries.insert(to.clone(), entry);
                moved.push((from, to));
            }
        }

        // Attach at the new location
        if let Some(children) = self.entries.get_mut(&new_parent).and_then(|e| e.children_mut()) {
            let name = path::file_name(&new).to_string();
            if is_dir {
                children.folders.insert(name);
            } else {
                children.files.insert(name);
            }
        }
        self.adjust_links(&new, count);
        if let Some(entry) = self.entries.get_mut(&new) {
            entry.attrs.st_ctime = now_secs();
        }

        let mut cascade = Removal::default();
        self.cascade(&old, &mut cascade);
        debug!(from = %old, to = %new, moved = moved.len(), "namespace entry renamed");
        Ok(RenameOutcome { moved, cascade })
    }

    /// Resize a file to hold `size` bytes, creating it if absent
    pub fn write<P: PlacementPolicy>(
        &mut self,
        path: &str,
        size: u64,
        allocator: &mut BlockAllocator<P>,
    ) -> Result<WriteOutcome> {
        let path = path::normalize(path)?;
        let created = if self.entries.contains_key(&path) {
            false
        } else {
            self.create(&path, DEFAULT_FILE_MODE)?;
            true
        };

        let target = allocator.block_count(size);
        let block_size = allocator.block_size();
        let resized = match self.entries.get_mut(&path).map(|e| &mut e.kind) {
            Some(EntryKind::File { blocks }) => allocator
                .resize(blocks, target)
                .map(|reclaimed| (blocks.clone(), reclaimed)),
            Some(EntryKind::Directory { .. }) => Err(DeedsError::IsADirectory(path.clone())),
            None => Err(DeedsError::NotFound(path.clone())),
        };

        let (blocks, reclaimed) = match resized {
            Ok(resized) => resized,
            Err(e) => {
                if created {
                    self.delete(&path)?;
                }
                return Err(e);
            }
        };

        if let Some(entry) = self.entries.get_mut(&path) {
            let now = now_secs();
            entry.attrs.st_size = size;
            entry.attrs.st_mtime = now;
            entry.attrs.st_ctime = now;
            entry.attrs.st_blocks = target;
            entry.attrs.st_blksize = block_size;
        }

        Ok(WriteOutcome {
            blocks,
            reclaimed,
            created,
        })
    }

    /// Block list of a file
    pub fn read(&mut self, path: &str) -> Result<Vec<BlockDescriptor>> {
        let path = path::normalize(path)?;
        let entry = self
            .entries
            .get_mut(&path)
            .ok_or_else(|| DeedsError::NotFound(path.clone()))?;
        if entry.is_directory() {
            return Err(DeedsError::IsADirectory(path));
        }
        entry.attrs.st_atime = now_secs();
        Ok(entry.blocks().to_vec())
    }

    /// Sorted child names of a directory
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let path = path::normalize(path)?;
        let entry = self
            .entries
            .get(&path)
            .ok_or_else(|| DeedsError::NotFound(path.clone()))?;
        entry
            .children()
            .map(|c| c.names())
            .ok_or(DeedsError::NotADirectory(path))
    }

    pub fn stat(&self, path: &str) -> Result<Attributes> {
        self.get(path).map(|e| e.attrs.clone())
    }

    /// Block list and attribute view of any entry
    pub fn entry(&self, path: &str) -> Result<(Vec<BlockDescriptor>, EntryAttributes)> {
        self.get(path).map(|e| (e.blocks().to_vec(), e.view()))
    }

    fn get(&self, path: &str) -> Result<&NamespaceEntry> {
        let path = path::normalize(path)?;
        self.entries.get(&path).ok_or(DeedsError::NotFound(path))
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut file_table = BTreeMap::new();
        let mut file_attributes = BTreeMap::new();
        for (path, entry) in &self.entries {
            file_table.insert(path.clone(), entry.blocks().to_vec());
            file_attributes.insert(path.clone(), entry.view());
        }
        Snapshot {
            taken_at: now_secs(),
            file_table,
            file_attributes,
        }
    }

    /// Rebuild a namespace from a snapshot, re-creating root if absent
    pub fn from_snapshot(snapshot: Snapshot, block_size: u64) -> Result<Self> {
        let Snapshot {
            mut file_table,
            file_attributes,
            ..
        } = snapshot;

        let mut entries = BTreeMap::new();
        for (raw_path, view) in file_attributes {
            let path = path::normalize(&raw_path)?;
            let kind = if view.stat.is_directory() {
                EntryKind::Directory {
                    children: view.children.unwrap_or_default(),
                }
            } else {
                EntryKind::File {
                    blocks: file_table.remove(&raw_path).unwrap_or_default(),
                }
            };
            entries.insert(
                path,
                NamespaceEntry {
                    attrs: view.stat,
                    kind,
                },
            );
        }

        if !entries.contains_key(ROOT) {
            warn!("snapshot has no root directory, re-creating it");
            entries.insert(ROOT.to_string(), NamespaceEntry::directory(ROOT_MODE));
        }

        for path in entries.keys() {
            if let Some(parent) = path::parent(path) {
                let listed = entries
                    .get(parent)
                    .and_then(|p| p.children())
                    .map(|c| c.contains(path::file_name(path)))
                    .unwrap_or(false);
                if !listed {
                    return Err(DeedsError::Protocol(format!(
                        "snapshot entry {} is not listed by its parent",
                        path
                    )));
                }
            }
        }

        Ok(Namespace {
            entries,
            block_size,
        })
    }
}
