//! Undo journal for structural archive changes.
//!
//! Steps never hold references into the tree. They record directory paths
//! and entry indices and resolve them again at replay time, because undoing
//! a directory removal recreates nodes under new [`DirId`]s.
//!
//! [`DirId`]: lumpkit_core::DirId

use crate::archive::Archive;
use lumpkit_core::{DirTree, Entry, Result};

/// One invertible structural change.
#[derive(Debug, Clone)]
pub enum UndoStep {
    /// An entry was renamed.
    EntryRename {
        /// Path of the directory holding the entry.
        dir_path: String,
        /// Index of the entry.
        index: usize,
        /// Name before the change.
        old_name: String,
        /// Name after the change.
        new_name: String,
    },
    /// A directory was renamed.
    ///
    /// The step toggles: each replay renames the directory found at `path`
    /// to `old_name`, then swaps the stored names and updates `path`.
    DirRename {
        /// Current path of the directory.
        path: String,
        /// Name to rename to on the next replay.
        old_name: String,
        /// Name the directory has now.
        new_name: String,
    },
    /// Two entries of one directory swapped places (self-inverse).
    EntrySwap {
        /// Path of the directory.
        dir_path: String,
        /// First index.
        index1: usize,
        /// Second index.
        index2: usize,
    },
    /// An entry was created (`created`) or deleted.
    EntryCreateDelete {
        /// Whether the recorded change created the entry.
        created: bool,
        /// Path of the directory holding the entry.
        dir_path: String,
        /// Index of the entry.
        index: usize,
        /// Copy of the entry, restored when recreating.
        entry: Entry,
    },
    /// A directory was created (`created`) or deleted.
    DirCreateDelete {
        /// Whether the recorded change created the directory.
        created: bool,
        /// Path of the directory.
        path: String,
        /// The removed subtree, present while the directory is gone.
        snapshot: Option<DirTree>,
    },
}

impl UndoStep {
    /// Revert the change.
    pub fn undo(&mut self, archive: &mut Archive) -> Result<()> {
        match self {
            Self::EntryRename {
                dir_path,
                index,
                old_name,
                ..
            } => {
                let dir = archive.resolve_dir(dir_path)?;
                archive.replay_rename_entry(dir, *index, old_name)
            }
            Self::DirRename { .. } => self.swap_names(archive),
            Self::EntrySwap { .. } => self.swap(archive),
            Self::EntryCreateDelete { created, .. } => {
                if *created {
                    self.delete_entry(archive)
                } else {
                    self.create_entry(archive)
                }
            }
            Self::DirCreateDelete { created, .. } => {
                if *created {
                    self.delete_dir(archive)
                } else {
                    self.create_dir(archive)
                }
            }
        }
    }

    /// Reapply the change.
    pub fn redo(&mut self, archive: &mut Archive) -> Result<()> {
        match self {
            Self::EntryRename {
                dir_path,
                index,
                new_name,
                ..
            } => {
                let dir = archive.resolve_dir(dir_path)?;
                archive.replay_rename_entry(dir, *index, new_name)
            }
            Self::DirRename { .. } => self.swap_names(archive),
            Self::EntrySwap { .. } => self.swap(archive),
            Self::EntryCreateDelete { created, .. } => {
                if *created {
                    self.create_entry(archive)
                } else {
                    self.delete_entry(archive)
                }
            }
            Self::DirCreateDelete { created, .. } => {
                if *created {
                    self.create_dir(archive)
                } else {
                    self.delete_dir(archive)
                }
            }
        }
    }

    /// Short description of the step.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::EntryRename { .. } => "Rename Entry",
            Self::DirRename { .. } => "Rename Directory",
            Self::EntrySwap { .. } => "Swap Entries",
            Self::EntryCreateDelete { created: true, .. } => "Create Entry",
            Self::EntryCreateDelete { created: false, .. } => "Delete Entry",
            Self::DirCreateDelete { created: true, .. } => "Create Directory",
            Self::DirCreateDelete { created: false, .. } => "Delete Directory",
        }
    }

    fn swap_names(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::DirRename {
            path,
            old_name,
            new_name,
        } = self
        else {
            return Ok(());
        };
        let dir = archive.resolve_dir(path)?;
        archive.replay_rename_dir(dir, old_name)?;
        *path = archive.tree().path(dir);
        std::mem::swap(old_name, new_name);
        Ok(())
    }

    fn swap(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::EntrySwap {
            dir_path,
            index1,
            index2,
        } = self
        else {
            return Ok(());
        };
        let dir = archive.resolve_dir(dir_path)?;
        archive.replay_swap(dir, *index1, *index2)
    }

    fn create_entry(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::EntryCreateDelete {
            dir_path,
            index,
            entry,
            ..
        } = self
        else {
            return Ok(());
        };
        let dir = archive.resolve_dir(dir_path)?;
        archive.replay_insert(dir, *index, entry.clone())
    }

    fn delete_entry(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::EntryCreateDelete {
            dir_path,
            index,
            entry,
            ..
        } = self
        else {
            return Ok(());
        };
        let dir = archive.resolve_dir(dir_path)?;
        *entry = archive.replay_remove(dir, *index)?;
        Ok(())
    }

    fn create_dir(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::DirCreateDelete { path, snapshot, .. } = self else {
            return Ok(());
        };
        match snapshot.take() {
            Some(tree) => archive.replay_restore_dir(path, tree),
            None => archive.replay_create_dir(path),
        }
    }

    fn delete_dir(&mut self, archive: &mut Archive) -> Result<()> {
        let Self::DirCreateDelete { path, snapshot, .. } = self else {
            return Ok(());
        };
        let dir = archive.resolve_dir(path)?;
        *snapshot = Some(archive.replay_remove_dir(dir)?);
        Ok(())
    }
}

/// A named group of steps undone and redone together.
#[derive(Debug, Clone)]
pub struct UndoLevel {
    name: String,
    steps: Vec<UndoStep>,
}

impl UndoLevel {
    /// Create an empty level.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recorded steps, oldest first.
    pub fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Revert all steps, newest first.
    pub fn undo(&mut self, archive: &mut Archive) -> Result<()> {
        for step in self.steps.iter_mut().rev() {
            step.undo(archive)?;
        }
        Ok(())
    }

    /// Reapply all steps, oldest first.
    pub fn redo(&mut self, archive: &mut Archive) -> Result<()> {
        for step in &mut self.steps {
            step.redo(archive)?;
        }
        Ok(())
    }
}

/// Undo and redo stacks plus the level being recorded.
#[derive(Debug, Default)]
pub struct UndoManager {
    undo_stack: Vec<UndoLevel>,
    redo_stack: Vec<UndoLevel>,
    current: Option<UndoLevel>,
    auto_levels: bool,
    replaying: bool,
}

impl UndoManager {
    /// Create a manager. With `auto_levels`, each operation outside an
    /// explicit level is recorded as its own level.
    pub fn new(auto_levels: bool) -> Self {
        Self {
            auto_levels,
            ..Self::default()
        }
    }

    /// Turn automatic levels on or off.
    pub fn set_auto_levels(&mut self, auto_levels: bool) {
        self.auto_levels = auto_levels;
    }

    /// Check if automatic levels are on.
    pub fn auto_levels(&self) -> bool {
        self.auto_levels
    }

    /// Open a level. Returns false if one is already open (nested levels
    /// record into the outer one).
    pub fn begin_level(&mut self, name: &str) -> bool {
        if self.current.is_some() || self.replaying {
            return false;
        }
        self.current = Some(UndoLevel::new(name));
        true
    }

    /// Open a level for one operation if automatic levels are on.
    pub fn begin_auto(&mut self, name: &str) -> bool {
        self.auto_levels && self.begin_level(name)
    }

    /// Close the open level. A kept, non-empty level is pushed onto the undo
    /// stack and clears the redo stack. Returns whether a level was pushed.
    pub fn end_level(&mut self, keep: bool) -> bool {
        match self.current.take() {
            Some(level) if keep && !level.is_empty() => {
                log::debug!("Recorded undo level '{}'", level.name);
                self.undo_stack.push(level);
                self.redo_stack.clear();
                true
            }
            _ => false,
        }
    }

    /// Check if steps are being recorded.
    pub fn is_recording(&self) -> bool {
        self.current.is_some() && !self.replaying
    }

    /// Add a step to the open level.
    pub fn record(&mut self, step: UndoStep) {
        if self.replaying {
            return;
        }
        if let Some(level) = &mut self.current {
            level.steps.push(step);
        }
    }

    /// Suspend or resume recording while levels are replayed.
    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    /// Check if there is something to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if there is something to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Names of undoable levels, most recent last.
    pub fn undo_names(&self) -> Vec<&str> {
        self.undo_stack.iter().map(UndoLevel::name).collect()
    }

    /// Names of redoable levels, next redo last.
    pub fn redo_names(&self) -> Vec<&str> {
        self.redo_stack.iter().map(UndoLevel::name).collect()
    }

    pub(crate) fn pop_undo(&mut self) -> Option<UndoLevel> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<UndoLevel> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_undo(&mut self, level: UndoLevel) {
        self.undo_stack.push(level);
    }

    pub(crate) fn push_redo(&mut self, level: UndoLevel) {
        self.redo_stack.push(level);
    }

    /// Drop all history and any open level.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap_step() -> UndoStep {
        UndoStep::EntrySwap {
            dir_path: "/".to_string(),
            index1: 0,
            index2: 1,
        }
    }

    #[test]
    fn test_levels() {
        let mut manager = UndoManager::new(false);
        manager.record(swap_step());
        assert!(!manager.can_undo());

        assert!(manager.begin_level("Swap"));
        assert!(!manager.begin_level("Nested"));
        manager.record(swap_step());
        assert!(manager.end_level(true));
        assert_eq!(manager.undo_names(), ["Swap"]);

        // Empty and discarded levels are not kept
        manager.begin_level("Empty");
        assert!(!manager.end_level(true));
        manager.begin_level("Discarded");
        manager.record(swap_step());
        assert!(!manager.end_level(false));
        assert_eq!(manager.undo_names().len(), 1);
    }

    #[test]
    fn test_auto_levels_and_redo_reset() {
        let mut manager = UndoManager::new(true);
        assert!(manager.begin_auto("First"));
        manager.record(swap_step());
        manager.end_level(true);

        let level = manager.pop_undo().unwrap();
        manager.push_redo(level);
        assert!(manager.can_redo());

        assert!(manager.begin_auto("Second"));
        manager.record(swap_step());
        manager.end_level(true);
        assert!(!manager.can_redo());
    }

    #[test]
    fn test_replay_suppresses_recording() {
        let mut manager = UndoManager::new(false);
        manager.begin_level("Level");
        manager.set_replaying(true);
        assert!(!manager.is_recording());
        manager.record(swap_step());
        manager.set_replaying(false);
        assert!(!manager.end_level(true));
    }

    #[test]
    fn test_describe() {
        assert_eq!(swap_step().describe(), "Swap Entries");
        let step = UndoStep::DirCreateDelete {
            created: false,
            path: "/sprites/".to_string(),
            snapshot: None,
        };
        assert_eq!(step.describe(), "Delete Directory");
    }
}
