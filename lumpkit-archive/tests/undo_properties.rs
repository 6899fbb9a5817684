//! Property tests for the undo journal.
//!
//! Random edit sequences are applied to an archive; undoing everything must
//! restore the starting contents and redoing everything must restore the
//! edited contents.

use lumpkit_archive::{Archive, ArchiveFormat};
use lumpkit_core::{DirId, Entry, EntryId};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Directory path to its entries, as (name, data) pairs.
///
/// Keyed by path because restored directories are re-attached at the end of
/// their parent.
type Contents = BTreeMap<String, Vec<(String, Vec<u8>)>>;

#[derive(Debug, Clone)]
enum Op {
    Add { dir: usize, name: String, byte: u8 },
    Remove { entry: usize },
    Rename { entry: usize, name: String },
    Swap { dir: usize, index1: usize, index2: usize },
    CreateDir { base: usize, name: String },
    RemoveDir { dir: usize },
    RenameDir { dir: usize, name: String },
    Move { entry: usize, dir: usize, position: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let entry_name = "[a-c]{1,2}\\.lmp";
    let dir_name = "[d-f]{1,2}";
    prop_oneof![
        3 => (any::<usize>(), entry_name, any::<u8>())
            .prop_map(|(dir, name, byte)| Op::Add { dir, name, byte }),
        1 => any::<usize>().prop_map(|entry| Op::Remove { entry }),
        1 => (any::<usize>(), entry_name).prop_map(|(entry, name)| Op::Rename { entry, name }),
        1 => (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(dir, index1, index2)| Op::Swap { dir, index1, index2 }),
        2 => (any::<usize>(), dir_name).prop_map(|(base, name)| Op::CreateDir { base, name }),
        1 => any::<usize>().prop_map(|dir| Op::RemoveDir { dir }),
        1 => (any::<usize>(), dir_name).prop_map(|(dir, name)| Op::RenameDir { dir, name }),
        1 => (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(entry, dir, position)| Op::Move { entry, dir, position }),
    ]
}

fn dirs(archive: &Archive) -> Vec<DirId> {
    let root = archive.root();
    let mut dirs = vec![root];
    dirs.extend(archive.tree().descendants(root));
    dirs
}

fn entry_ids(archive: &Archive) -> Vec<EntryId> {
    dirs(archive)
        .into_iter()
        .flat_map(|dir| archive.tree().entries(dir).iter().map(Entry::id))
        .collect()
}

fn contents(archive: &Archive) -> Contents {
    let tree = archive.tree();
    dirs(archive)
        .into_iter()
        .map(|dir| {
            let entries = tree
                .entries(dir)
                .iter()
                .map(|entry| (entry.name().to_string(), entry.data().to_vec()))
                .collect();
            (tree.path(dir), entries)
        })
        .collect()
}

fn pick<T: Copy>(items: &[T], index: usize) -> Option<T> {
    (!items.is_empty()).then(|| items[index % items.len()])
}

/// Apply `op`, ignoring rejected edits. Rejected edits leave no trace.
fn apply(archive: &mut Archive, op: &Op) {
    let dirs = dirs(archive);
    let subdirs = &dirs[1..];
    let entries = entry_ids(archive);
    let _ = match op {
        Op::Add { dir, name, byte } => {
            let dir = pick(&dirs, *dir);
            archive
                .add_entry(Entry::with_data(name.as_str(), vec![*byte; 3]), None, dir, false)
                .map(|_| ())
        }
        Op::Remove { entry } => match pick(&entries, *entry) {
            Some(id) => archive.remove_entry(id),
            None => Ok(()),
        },
        Op::Rename { entry, name } => match pick(&entries, *entry) {
            Some(id) => archive.rename_entry(id, name),
            None => Ok(()),
        },
        Op::Swap { dir, index1, index2 } => {
            let dir = dirs[*dir % dirs.len()];
            let len = archive.tree().entries(dir).len().max(1);
            archive.swap_entries_at(index1 % len, index2 % len, Some(dir))
        }
        Op::CreateDir { base, name } => archive.create_dir(name, pick(&dirs, *base)).map(|_| ()),
        Op::RemoveDir { dir } => match pick(subdirs, *dir) {
            Some(dir) => {
                let path = archive.tree().path(dir);
                archive.remove_dir(&path, None)
            }
            None => Ok(()),
        },
        Op::RenameDir { dir, name } => match pick(subdirs, *dir) {
            Some(dir) => archive.rename_dir(dir, name),
            None => Ok(()),
        },
        Op::Move {
            entry,
            dir,
            position,
        } => match pick(&entries, *entry) {
            Some(id) => archive.move_entry(id, Some(*position % 4), pick(&dirs, *dir)),
            None => Ok(()),
        },
    };
}

fn seeded() -> Archive {
    let mut archive = Archive::new(ArchiveFormat::Zip);
    let maps = archive.create_dir("maps", None).unwrap();
    archive
        .add_entry(Entry::with_data("e1m1.wad", b"PWAD".to_vec()), None, Some(maps), false)
        .unwrap();
    archive
        .add_entry(Entry::with_data("mapinfo.txt", b"map E1M1".to_vec()), None, None, false)
        .unwrap();
    archive.set_record_undo(true);
    archive
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Undoing every level restores the starting contents; redoing every
    /// level restores the edited contents.
    #[test]
    fn undo_redo_restores_contents(ops in proptest::collection::vec(op_strategy(), 1..24)) {
        let mut archive = seeded();
        let initial = contents(&archive);
        for op in &ops {
            apply(&mut archive, op);
        }
        let edited = contents(&archive);

        for _ in 0..2 {
            while archive.can_undo() {
                prop_assert!(archive.undo().is_ok(), "undo failed: {:?}", archive.last_error());
            }
            prop_assert_eq!(&contents(&archive), &initial);

            while archive.can_redo() {
                prop_assert!(archive.redo().is_ok(), "redo failed: {:?}", archive.last_error());
            }
            prop_assert_eq!(&contents(&archive), &edited);
        }
    }

    /// A new edit after undoing drops the redo history.
    #[test]
    fn edit_after_undo_clears_redo(name in "[a-c]{1,3}\\.lmp") {
        let mut archive = seeded();
        archive.add_new_entry("first.lmp", None, None).unwrap();
        prop_assert!(archive.undo().unwrap());
        prop_assert!(archive.can_redo());

        archive.add_new_entry(&name, None, None).unwrap();
        prop_assert!(!archive.can_redo());
        prop_assert_eq!(archive.undo_names(), vec!["Add Entry"]);
    }
}
