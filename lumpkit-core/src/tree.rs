//! Directory tree arena.
//!
//! Directories live in a flat arena and are addressed by [`DirId`]. Ids are
//! never reused within one tree, so a stale id fails to resolve instead of
//! pointing at an unrelated directory. Each directory owns its entries in
//! order, lists its child directories in order and carries one synthetic
//! folder entry standing for itself.
//!
//! The tree keeps an index from [`EntryId`] to the directory holding the
//! entry. Every mutation goes through the tree, so the index and each entry's
//! parent reference always agree with list membership.

use crate::entry::{Entry, EntryId, EntryState};
use crate::entry_type::EntryType;
use crate::error::{ArchiveError, Result};
use std::collections::{BTreeMap, HashMap};

/// Identifier of a directory inside a [`DirTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(usize);

impl DirId {
    /// The root directory of every tree.
    pub const ROOT: DirId = DirId(0);

    /// Arena slot of this directory.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for DirId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

/// Where an entry lives in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLoc {
    /// A regular entry in the entry list of a directory.
    InDir(DirId),
    /// The synthetic entry standing for a directory.
    DirEntry(DirId),
}

impl EntryLoc {
    /// The directory referenced by this location.
    pub fn dir(&self) -> DirId {
        match self {
            Self::InDir(dir) | Self::DirEntry(dir) => *dir,
        }
    }
}

/// A directory node.
#[derive(Debug, Clone)]
pub struct DirNode {
    name: String,
    parent: Option<DirId>,
    entries: Vec<Entry>,
    children: Vec<DirId>,
    dir_entry: Entry,
}

impl DirNode {
    /// Directory name (empty for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    /// Entries in order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Child directories in order.
    pub fn children(&self) -> &[DirId] {
        &self.children
    }

    /// The synthetic entry standing for this directory.
    pub fn dir_entry(&self) -> &Entry {
        &self.dir_entry
    }
}

/// Reject directory names that can't be a single path segment.
pub fn check_dir_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ArchiveError::invalid_name(name, "not a valid directory name"));
    }
    if name.contains(['/', '\0']) {
        return Err(ArchiveError::invalid_name(
            name,
            "directory names can't contain '/' or NUL",
        ));
    }
    Ok(())
}

/// Arena-backed directory tree.
///
/// Cloning a tree yields an independent snapshot with the same entry ids.
///
/// Slots of removed directories stay empty so a [`DirId`] is never handed
/// out twice; [`DirTree::clear`] is the only way to reclaim them.
#[derive(Debug, Clone)]
pub struct DirTree {
    nodes: Vec<Option<DirNode>>,
    index: HashMap<EntryId, EntryLoc>,
    properties: BTreeMap<String, String>,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    /// Create a tree with an empty root.
    pub fn new() -> Self {
        Self::rooted("", Entry::folder(""))
    }

    fn rooted(name: &str, mut dir_entry: Entry) -> Self {
        dir_entry.set_name(name);
        dir_entry.set_entry_type(EntryType::Folder);
        dir_entry.set_parent(None);
        let mut index = HashMap::new();
        index.insert(dir_entry.id(), EntryLoc::DirEntry(DirId::ROOT));
        Self {
            nodes: vec![Some(DirNode {
                name: name.to_string(),
                parent: None,
                entries: Vec::new(),
                children: Vec::new(),
                dir_entry,
            })],
            index,
            properties: BTreeMap::new(),
        }
    }

    /// The root directory.
    pub fn root(&self) -> DirId {
        DirId::ROOT
    }

    /// Look up a directory node.
    pub fn node(&self, dir: DirId) -> Option<&DirNode> {
        self.nodes.get(dir.0).and_then(Option::as_ref)
    }

    fn node_ref(&self, dir: DirId) -> Result<&DirNode> {
        self.node(dir)
            .ok_or_else(|| ArchiveError::dir_not_found(dir.to_string()))
    }

    fn node_mut(&mut self, dir: DirId) -> Result<&mut DirNode> {
        self.nodes
            .get_mut(dir.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| ArchiveError::dir_not_found(dir.to_string()))
    }

    /// Check if `dir` is a live directory of this tree.
    pub fn contains_dir(&self, dir: DirId) -> bool {
        self.node(dir).is_some()
    }

    /// Check if the entry `id` belongs to this tree.
    pub fn contains(&self, id: EntryId) -> bool {
        self.index.contains_key(&id)
    }

    /// Directory name.
    pub fn name(&self, dir: DirId) -> Option<&str> {
        self.node(dir).map(DirNode::name)
    }

    /// Parent of a directory.
    pub fn parent(&self, dir: DirId) -> Option<DirId> {
        self.node(dir).and_then(DirNode::parent)
    }

    /// Child directories of `dir` (empty if `dir` is not live).
    pub fn children(&self, dir: DirId) -> &[DirId] {
        self.node(dir).map(DirNode::children).unwrap_or(&[])
    }

    /// Entries of `dir` (empty if `dir` is not live).
    pub fn entries(&self, dir: DirId) -> &[Entry] {
        self.node(dir).map(DirNode::entries).unwrap_or(&[])
    }

    /// Mutable entries of `dir`.
    ///
    /// The slice cannot change length, so membership stays consistent.
    pub fn entries_mut(&mut self, dir: DirId) -> &mut [Entry] {
        match self.nodes.get_mut(dir.0).and_then(Option::as_mut) {
            Some(node) => &mut node.entries,
            None => &mut [],
        }
    }

    /// Absolute path of a directory: `/` for the root, `/a/b/` otherwise.
    pub fn path(&self, dir: DirId) -> String {
        let mut names = Vec::new();
        let mut current = Some(dir);
        while let Some(id) = current {
            match self.node(id) {
                Some(node) if node.parent.is_some() => {
                    names.push(node.name.as_str());
                    current = node.parent;
                }
                _ => break,
            }
        }

        let mut path = String::from("/");
        for name in names.iter().rev() {
            path.push_str(name);
            path.push('/');
        }
        path
    }

    /// Resolve a slash-separated path relative to `base`.
    ///
    /// Matching is case-sensitive. An empty path resolves to `base`.
    pub fn child(&self, base: DirId, path: &str) -> Option<DirId> {
        self.node(base)?;
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(base, |dir, segment| self.child_by_name(dir, segment))
    }

    /// Find a direct child directory by name.
    pub fn child_by_name(&self, dir: DirId, name: &str) -> Option<DirId> {
        self.children(dir)
            .iter()
            .copied()
            .find(|child| self.name(*child) == Some(name))
    }

    /// Number of child directories.
    pub fn num_children(&self, dir: DirId) -> usize {
        self.children(dir).len()
    }

    fn alloc(&mut self, parent: DirId, name: &str, dir_entry: Option<Entry>) -> Result<DirId> {
        check_dir_name(name)?;
        self.node_ref(parent)?;
        let id = DirId(self.nodes.len());

        let mut dir_entry = dir_entry.unwrap_or_else(|| Entry::folder(name));
        dir_entry.set_name(name);
        dir_entry.set_entry_type(EntryType::Folder);
        if self.index.contains_key(&dir_entry.id()) {
            dir_entry.refresh_id();
        }
        dir_entry.set_parent(Some(parent));
        self.index.insert(dir_entry.id(), EntryLoc::DirEntry(id));

        self.nodes.push(Some(DirNode {
            name: name.to_string(),
            parent: Some(parent),
            entries: Vec::new(),
            children: Vec::new(),
            dir_entry,
        }));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Resolve `path` from `base`, creating any missing segments.
    ///
    /// Returns the final directory and the directories that were created, in
    /// creation order. Nothing is created unless every segment is valid.
    pub fn add_child(&mut self, base: DirId, path: &str) -> Result<(DirId, Vec<DirId>)> {
        self.node_ref(base)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in &segments {
            check_dir_name(segment)?;
        }
        let mut created = Vec::new();
        let mut dir = base;
        for segment in segments {
            dir = match self.child_by_name(dir, segment) {
                Some(existing) => existing,
                None => {
                    let id = self.alloc(dir, segment, None)?;
                    created.push(id);
                    id
                }
            };
        }
        Ok((dir, created))
    }

    /// Detach `dir` and its whole subtree.
    ///
    /// The returned snapshot keeps the original entry ids, so grafting it back
    /// restores the same entries.
    pub fn remove_child(&mut self, dir: DirId) -> Result<DirTree> {
        if dir == DirId::ROOT {
            return Err(ArchiveError::RootDirRemoval);
        }
        let snapshot = self.extract(dir, false)?;
        let parent = self.parent(dir);

        let mut doomed = self.descendants(dir);
        doomed.push(dir);
        for id in doomed {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) {
                self.index.remove(&node.dir_entry.id());
                for entry in &node.entries {
                    self.index.remove(&entry.id());
                }
            }
        }

        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != dir);
        }
        Ok(snapshot)
    }

    /// Snapshot of a subtree with the same entry ids.
    pub fn snapshot(&self, dir: DirId) -> Result<DirTree> {
        self.extract(dir, false)
    }

    /// Copy of a subtree with fresh entry ids.
    pub fn copy_subtree(&self, dir: DirId) -> Result<DirTree> {
        self.extract(dir, true)
    }

    fn extract(&self, dir: DirId, fresh: bool) -> Result<DirTree> {
        let node = self.node_ref(dir)?;
        let mut dir_entry = node.dir_entry.clone();
        if fresh {
            dir_entry.refresh_id();
        }
        let mut out = DirTree::rooted(&node.name, dir_entry);
        self.copy_into(dir, &mut out, DirId::ROOT, fresh)?;
        Ok(out)
    }

    fn copy_into(&self, src: DirId, out: &mut DirTree, dst: DirId, fresh: bool) -> Result<()> {
        let node = self.node_ref(src)?;
        for entry in &node.entries {
            let copy = if fresh {
                entry.deep_copy()
            } else {
                entry.clone()
            };
            out.add_entry(dst, copy, None)?;
        }
        for &child in &node.children {
            let child_node = self.node_ref(child)?;
            let mut dir_entry = child_node.dir_entry.clone();
            if fresh {
                dir_entry.refresh_id();
            }
            let target = out.alloc(dst, &child_node.name, Some(dir_entry))?;
            self.copy_into(child, out, target, fresh)?;
        }
        Ok(())
    }

    /// Rename a directory.
    pub fn rename_dir(&mut self, dir: DirId, name: &str) -> Result<()> {
        if dir == DirId::ROOT {
            return Err(ArchiveError::invalid_name(
                name,
                "the root directory can't be renamed",
            ));
        }
        check_dir_name(name)?;
        let node = self.node_mut(dir)?;
        node.name = name.to_string();
        node.dir_entry.set_name(name);
        Ok(())
    }

    /// Insert an entry into `dir`.
    ///
    /// `position` is clamped to the end of the list; `None` appends. An entry
    /// whose id is already present in the tree gets a fresh id. Returns the
    /// index the entry landed at.
    pub fn add_entry(
        &mut self,
        dir: DirId,
        mut entry: Entry,
        position: Option<usize>,
    ) -> Result<usize> {
        if self.index.contains_key(&entry.id()) {
            entry.refresh_id();
        }
        entry.set_parent(Some(dir));
        let id = entry.id();

        let node = self.node_mut(dir)?;
        let index = position.unwrap_or(usize::MAX).min(node.entries.len());
        node.entries.insert(index, entry);
        self.index.insert(id, EntryLoc::InDir(dir));
        Ok(index)
    }

    /// Detach the entry at `index` from `dir`.
    pub fn remove_entry(&mut self, dir: DirId, index: usize) -> Result<Entry> {
        let node = self.node_mut(dir)?;
        let len = node.entries.len();
        if index >= len {
            return Err(ArchiveError::out_of_bounds(index, len));
        }
        let mut entry = node.entries.remove(index);
        self.index.remove(&entry.id());
        entry.set_parent(None);
        Ok(entry)
    }

    /// Exchange the positions of two entries in `dir`.
    pub fn swap_entries(&mut self, dir: DirId, index1: usize, index2: usize) -> Result<()> {
        let node = self.node_mut(dir)?;
        let len = node.entries.len();
        for index in [index1, index2] {
            if index >= len {
                return Err(ArchiveError::out_of_bounds(index, len));
            }
        }
        node.entries.swap(index1, index2);
        Ok(())
    }

    /// Entry at `index` in `dir`.
    pub fn entry_at(&self, dir: DirId, index: usize) -> Option<&Entry> {
        self.entries(dir).get(index)
    }

    /// Mutable entry at `index` in `dir`.
    pub fn entry_at_mut(&mut self, dir: DirId, index: usize) -> Option<&mut Entry> {
        self.entries_mut(dir).get_mut(index)
    }

    /// Index of entry `id` within `dir`.
    pub fn entry_index(&self, dir: DirId, id: EntryId) -> Option<usize> {
        self.entries(dir).iter().position(|entry| entry.id() == id)
    }

    /// First entry in `dir` whose name matches, ignoring case.
    ///
    /// With `cut_ext`, the name is compared against entry names without their
    /// extension.
    pub fn entry_by_name(&self, dir: DirId, name: &str, cut_ext: bool) -> Option<&Entry> {
        self.entries(dir).iter().find(|entry| {
            let candidate = if cut_ext {
                entry.name_no_ext()
            } else {
                entry.name()
            };
            candidate.eq_ignore_ascii_case(name)
        })
    }

    /// Location of entry `id`.
    pub fn location(&self, id: EntryId) -> Option<EntryLoc> {
        self.index.get(&id).copied()
    }

    /// Directory and index of a regular entry.
    pub fn position(&self, id: EntryId) -> Option<(DirId, usize)> {
        match self.location(id)? {
            EntryLoc::InDir(dir) => Some((dir, self.entry_index(dir, id)?)),
            EntryLoc::DirEntry(_) => None,
        }
    }

    /// Look up an entry (regular or directory entry) by id.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        match self.location(id)? {
            EntryLoc::InDir(dir) => self.entries(dir).iter().find(|e| e.id() == id),
            EntryLoc::DirEntry(dir) => self.dir_entry(dir),
        }
    }

    /// Mutable lookup of an entry by id.
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        match self.location(id)? {
            EntryLoc::InDir(dir) => self.entries_mut(dir).iter_mut().find(|e| e.id() == id),
            EntryLoc::DirEntry(dir) => self.dir_entry_mut(dir),
        }
    }

    /// The synthetic entry of `dir`.
    pub fn dir_entry(&self, dir: DirId) -> Option<&Entry> {
        self.node(dir).map(DirNode::dir_entry)
    }

    /// Mutable synthetic entry of `dir`.
    pub fn dir_entry_mut(&mut self, dir: DirId) -> Option<&mut Entry> {
        self.nodes
            .get_mut(dir.0)
            .and_then(Option::as_mut)
            .map(|node| &mut node.dir_entry)
    }

    /// Number of entries in `dir`, optionally including all descendants.
    pub fn num_entries(&self, dir: DirId, recursive: bool) -> usize {
        let own = self.entries(dir).len();
        if !recursive {
            return own;
        }
        own + self
            .descendants(dir)
            .into_iter()
            .map(|child| self.entries(child).len())
            .sum::<usize>()
    }

    /// All directories below `dir`, pre-order.
    pub fn descendants(&self, dir: DirId) -> Vec<DirId> {
        let mut out = Vec::new();
        let mut stack: Vec<DirId> = self.children(dir).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Every entry below `dir` as a flat list.
    ///
    /// Subdirectories come first, each as its directory entry followed by its
    /// own contents, then the entries of `dir` itself.
    pub fn all_entries(&self, dir: DirId) -> Vec<&Entry> {
        let mut out = Vec::new();
        self.collect_entries(dir, &mut out);
        out
    }

    fn collect_entries<'a>(&'a self, dir: DirId, out: &mut Vec<&'a Entry>) {
        let Some(node) = self.node(dir) else {
            return;
        };
        for &child in &node.children {
            if let Some(child_node) = self.node(child) {
                out.push(&child_node.dir_entry);
                self.collect_entries(child, out);
            }
        }
        out.extend(node.entries.iter());
    }

    /// Force the state of every entry and directory entry below `dir`.
    pub fn mark_all(&mut self, dir: DirId, state: EntryState) {
        let mut dirs = self.descendants(dir);
        dirs.push(dir);
        for id in dirs {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) {
                node.dir_entry.force_state(state);
                for entry in &mut node.entries {
                    entry.force_state(state);
                }
            }
        }
    }

    /// Merge `other` into `dir`.
    ///
    /// Root entries of `other` are inserted starting at `position` (appended
    /// when `None`); subdirectories are matched by name or created, and their
    /// entries appended. Every merged entry takes `state`. Returns the
    /// directories that had to be created.
    pub fn merge(
        &mut self,
        dir: DirId,
        mut other: DirTree,
        position: Option<usize>,
        state: EntryState,
    ) -> Result<Vec<DirId>> {
        self.node_ref(dir)?;
        let mut created = Vec::new();
        self.merge_from(dir, &mut other, DirId::ROOT, position, state, &mut created)?;
        Ok(created)
    }

    fn merge_from(
        &mut self,
        dir: DirId,
        other: &mut DirTree,
        src: DirId,
        position: Option<usize>,
        state: EntryState,
        created: &mut Vec<DirId>,
    ) -> Result<()> {
        let Some(node) = other.nodes.get_mut(src.0).and_then(Option::take) else {
            return Ok(());
        };

        let mut position = position;
        for mut entry in node.entries {
            entry.force_state(state);
            let index = self.add_entry(dir, entry, position)?;
            position = position.map(|_| index + 1);
        }

        for child in node.children {
            let Some(child_node) = other.node(child) else {
                continue;
            };
            let name = child_node.name.clone();
            let target = match self.child_by_name(dir, &name) {
                Some(existing) => existing,
                None => {
                    let mut dir_entry = child_node.dir_entry.clone();
                    dir_entry.force_state(state);
                    let id = self.alloc(dir, &name, Some(dir_entry))?;
                    created.push(id);
                    id
                }
            };
            self.merge_from(target, other, child, None, state, created)?;
        }
        Ok(())
    }

    /// Attach `other` as a child directory of `parent`, named after the root
    /// of `other`.
    ///
    /// The snapshot's directory entry (and so its id) is reused when the
    /// directory does not exist yet; otherwise the contents are merged into
    /// the existing directory.
    pub fn graft(&mut self, parent: DirId, other: DirTree, state: EntryState) -> Result<DirId> {
        let root = other.node_ref(DirId::ROOT)?;
        let name = root.name.clone();
        let target = match self.child_by_name(parent, &name) {
            Some(existing) => existing,
            None => {
                let mut dir_entry = root.dir_entry.clone();
                dir_entry.force_state(state);
                self.alloc(parent, &name, Some(dir_entry))?
            }
        };
        self.merge(target, other, None, state)?;
        Ok(target)
    }

    /// Remove every entry and directory, keeping a fresh empty root.
    ///
    /// Directory ids from before the call are invalidated.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Check if the tree has no entries and no subdirectories.
    pub fn is_empty(&self) -> bool {
        self.entries(DirId::ROOT).is_empty() && self.children(DirId::ROOT).is_empty()
    }

    /// Format-specific properties carried through decode and encode.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Look up a format property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Set a format property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tree: &DirTree, dir: DirId) -> Vec<String> {
        tree.entries(dir)
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    #[test]
    fn test_add_child_creates_segments() {
        let mut tree = DirTree::new();
        let (dir, created) = tree.add_child(tree.root(), "sprites/monsters").unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(tree.path(dir), "/sprites/monsters/");
        assert_eq!(tree.path(tree.root()), "/");
        assert_eq!(tree.child(tree.root(), "/sprites/monsters/"), Some(dir));
        assert_eq!(tree.child(tree.root(), "Sprites"), None);

        // Existing path creates nothing
        let (again, created) = tree.add_child(tree.root(), "sprites/monsters").unwrap();
        assert_eq!(again, dir);
        assert!(created.is_empty());
    }

    #[test]
    fn test_add_child_rejects_dot_segments() {
        let mut tree = DirTree::new();
        let root = tree.root();
        for path in ["..", "sprites/../..", "./sprites", "a/b\0c"] {
            assert!(matches!(
                tree.add_child(root, path),
                Err(ArchiveError::InvalidName { .. })
            ));
        }
        // A bad trailing segment leaves the leading ones uncreated
        assert!(tree.child(root, "sprites").is_none());
        assert!(tree.child(root, "a").is_none());
        assert!(tree.is_empty());

        let (dir, _) = tree.add_child(root, "maps").unwrap();
        assert!(tree.rename_dir(dir, "..").is_err());
        assert!(tree.rename_dir(dir, "a/b").is_err());
        assert_eq!(tree.path(dir), "/maps/");
    }

    #[test]
    fn test_removed_slots_are_not_reused() {
        let mut tree = DirTree::new();
        let root = tree.root();
        let (first, _) = tree.add_child(root, "first").unwrap();
        tree.remove_child(first).unwrap();
        assert!(!tree.contains_dir(first));

        let (second, _) = tree.add_child(root, "second").unwrap();
        assert_ne!(second, first);
        assert!(!tree.contains_dir(first));

        tree.clear();
        let (after_clear, _) = tree.add_child(tree.root(), "third").unwrap();
        assert_eq!(after_clear, first);
        assert_eq!(tree.num_children(tree.root()), 1);
    }

    #[test]
    fn test_entry_membership() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::new("A"), None).unwrap();
        tree.add_entry(root, Entry::new("C"), None).unwrap();
        let index = tree.add_entry(root, Entry::new("B"), Some(1)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(names(&tree, root), ["A", "B", "C"]);

        // Out of range positions clamp to the end
        let index = tree.add_entry(root, Entry::new("D"), Some(99)).unwrap();
        assert_eq!(index, 3);

        let id = tree.entry_at(root, 1).unwrap().id();
        assert_eq!(tree.position(id), Some((root, 1)));
        assert_eq!(tree.entry(id).unwrap().parent(), Some(root));

        let removed = tree.remove_entry(root, 1).unwrap();
        assert_eq!(removed.name(), "B");
        assert!(removed.parent().is_none());
        assert!(!tree.contains(id));
        assert!(matches!(
            tree.remove_entry(root, 10),
            Err(ArchiveError::IndexOutOfBounds { index: 10, len: 3 })
        ));
    }

    #[test]
    fn test_swap_bounds() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::new("A"), None).unwrap();
        tree.add_entry(root, Entry::new("B"), None).unwrap();
        tree.swap_entries(root, 0, 1).unwrap();
        assert_eq!(names(&tree, root), ["B", "A"]);
        assert!(tree.swap_entries(root, 0, 2).is_err());
        assert_eq!(names(&tree, root), ["B", "A"]);
    }

    #[test]
    fn test_entry_by_name() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::new("decorate.txt"), None).unwrap();
        assert!(tree.entry_by_name(root, "DECORATE.TXT", false).is_some());
        assert!(tree.entry_by_name(root, "decorate", false).is_none());
        assert!(tree.entry_by_name(root, "Decorate", true).is_some());
    }

    #[test]
    fn test_remove_and_graft_preserves_ids() {
        let mut tree = DirTree::new();
        let (sprites, _) = tree.add_child(tree.root(), "sprites").unwrap();
        let (nested, _) = tree.add_child(sprites, "extra").unwrap();
        tree.add_entry(sprites, Entry::new("TROOA1"), None).unwrap();
        tree.add_entry(nested, Entry::new("TROOB1"), None).unwrap();
        let kept = tree.entry_at(sprites, 0).unwrap().id();
        let dir_entry = tree.dir_entry(sprites).unwrap().id();

        let snapshot = tree.remove_child(sprites).unwrap();
        assert!(!tree.contains_dir(sprites));
        assert!(!tree.contains(kept));
        assert!(tree.is_empty());

        let restored = tree.graft(tree.root(), snapshot, EntryState::Unmodified).unwrap();
        assert_eq!(tree.path(restored), "/sprites/");
        assert_eq!(tree.num_entries(tree.root(), true), 2);
        assert_eq!(tree.position(kept), Some((restored, 0)));
        assert_eq!(tree.dir_entry(restored).unwrap().id(), dir_entry);
        assert_eq!(tree.entry(kept).unwrap().state(), EntryState::Unmodified);
    }

    #[test]
    fn test_root_is_permanent() {
        let mut tree = DirTree::new();
        assert!(matches!(
            tree.remove_child(tree.root()),
            Err(ArchiveError::RootDirRemoval)
        ));
    }

    #[test]
    fn test_merge_at_position() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::new("FIRST"), None).unwrap();
        tree.add_entry(root, Entry::new("LAST"), None).unwrap();

        let mut other = DirTree::new();
        other.add_entry(other.root(), Entry::new("X"), None).unwrap();
        other.add_entry(other.root(), Entry::new("Y"), None).unwrap();
        let (sub, _) = other.add_child(other.root(), "sub").unwrap();
        other.add_entry(sub, Entry::new("Z"), None).unwrap();

        let created = tree.merge(root, other, Some(1), EntryState::New).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(names(&tree, root), ["FIRST", "X", "Y", "LAST"]);
        assert_eq!(tree.num_entries(root, false), 4);
        assert_eq!(tree.num_entries(root, true), 5);
    }

    #[test]
    fn test_copy_subtree_fresh_ids() {
        let mut tree = DirTree::new();
        let (dir, _) = tree.add_child(tree.root(), "maps").unwrap();
        tree.add_entry(dir, Entry::new("MAP01"), None).unwrap();
        let original = tree.entry_at(dir, 0).unwrap().id();

        let copy = tree.copy_subtree(dir).unwrap();
        let copied = copy.entry_at(copy.root(), 0).unwrap();
        assert_eq!(copied.name(), "MAP01");
        assert_ne!(copied.id(), original);

        let snapshot = tree.snapshot(dir).unwrap();
        assert_eq!(snapshot.entry_at(snapshot.root(), 0).unwrap().id(), original);
    }

    #[test]
    fn test_all_entries_order() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::new("ROOTLUMP"), None).unwrap();
        let (a, _) = tree.add_child(root, "a").unwrap();
        tree.add_entry(a, Entry::new("INNER"), None).unwrap();

        let listed: Vec<&str> = tree.all_entries(root).iter().map(|e| e.name()).collect();
        assert_eq!(listed, ["a", "INNER", "ROOTLUMP"]);
    }
}
