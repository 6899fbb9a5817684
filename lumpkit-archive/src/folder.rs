//! Filesystem directories treated as archives.
//!
//! A folder archive has no byte form: it is read by walking a directory and
//! written by recreating the tree on disk.

use lumpkit_core::{ArchiveError, Codec, DirTree, Entry, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Codec stub for the folder format; it never matches bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderCodec;

impl Codec for FolderCodec {
    fn id(&self) -> &'static str {
        lumpkit_core::FOLDER_FORMAT
    }

    fn probe(&self, _data: &[u8]) -> bool {
        false
    }

    fn decode(&self, _data: &[u8]) -> Result<DirTree> {
        Err(ArchiveError::unsupported(
            lumpkit_core::FOLDER_FORMAT,
            "decoding from bytes",
        ))
    }

    fn encode(&self, _tree: &DirTree) -> Result<Vec<u8>> {
        Err(ArchiveError::unsupported(
            lumpkit_core::FOLDER_FORMAT,
            "encoding to bytes",
        ))
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_for_each(check_file_name)
    }
}

/// Reject names that can't be written as a single file or directory name.
pub fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ArchiveError::invalid_name(name, "not a valid file name"));
    }
    Ok(())
}

/// Read every file below `path` into a tree, recreating subdirectories.
///
/// Files and directories are visited in file name order.
pub fn import_dir(path: &Path) -> Result<DirTree> {
    if !path.is_dir() {
        return Err(ArchiveError::dir_not_found(path.display().to_string()));
    }

    let mut tree = DirTree::new();
    let root = tree.root();
    let mut files = 0usize;
    for item in WalkDir::new(path).min_depth(1).sort_by_file_name() {
        let item = item.map_err(std::io::Error::from)?;
        let relative = item
            .path()
            .strip_prefix(path)
            .map_err(|_| ArchiveError::invalid_state("walked outside the import directory"))?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if item.file_type().is_dir() {
            tree.add_child(root, &segments.join("/"))?;
        } else if item.file_type().is_file() {
            let Some((name, parents)) = segments.split_last() else {
                continue;
            };
            let (dir, _) = tree.add_child(root, &parents.join("/"))?;
            let data = fs::read(item.path())?;
            tree.add_entry(dir, Entry::with_data(name.as_str(), data), None)?;
            files += 1;
        }
    }

    log::info!("Imported {} files from {}", files, path.display());
    Ok(tree)
}

/// Write a tree to `path`, creating directories as needed.
pub fn export_dir(tree: &DirTree, path: &Path) -> Result<()> {
    let root = tree.root();
    let mut dirs = vec![root];
    dirs.extend(tree.descendants(root));

    // Validate every name before touching the filesystem
    for &dir in &dirs {
        if dir != root {
            check_file_name(tree.name(dir).unwrap_or_default())?;
        }
        for entry in tree.entries(dir) {
            check_file_name(entry.name())?;
        }
    }

    for dir in dirs {
        let mut target = path.to_path_buf();
        target.extend(tree.path(dir).split('/').filter(|s| !s.is_empty()));
        fs::create_dir_all(&target)?;
        for entry in tree.entries(dir) {
            fs::write(target.join(entry.name()), entry.data())?;
        }
    }

    log::info!("Exported {} entries to {}", tree.num_entries(root, true), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_rejects_escaping_names() {
        let target = tempfile::tempdir().unwrap();
        let out = target.path().join("out");

        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::with_data("ok.txt", vec![1]), None).unwrap();
        tree.add_entry(root, Entry::with_data("..", vec![2]), None).unwrap();
        assert!(matches!(
            export_dir(&tree, &out),
            Err(ArchiveError::InvalidName { .. })
        ));
        assert!(!out.exists());

        let mut tree = DirTree::new();
        tree.add_child(tree.root(), "..\\escape").unwrap();
        assert!(export_dir(&tree, &out).is_err());
        assert!(!out.exists());

        assert!(FolderCodec.check_entry_path("/maps/../x").is_err());
        assert!(FolderCodec.check_entry_path("/maps/").is_ok());
    }

    #[test]
    fn test_import_export() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("graphics/empty")).unwrap();
        fs::write(source.path().join("graphics/title.png"), [1, 2, 3]).unwrap();
        fs::write(source.path().join("mapinfo.txt"), "map MAP01").unwrap();

        let tree = import_dir(source.path()).unwrap();
        assert_eq!(tree.num_entries(tree.root(), true), 2);
        let graphics = tree.child(tree.root(), "graphics").unwrap();
        assert_eq!(tree.entry_at(graphics, 0).unwrap().data(), &[1, 2, 3]);
        assert!(tree.child(graphics, "empty").is_some());

        let target = tempfile::tempdir().unwrap();
        export_dir(&tree, target.path()).unwrap();
        assert_eq!(
            fs::read(target.path().join("mapinfo.txt")).unwrap(),
            b"map MAP01"
        );
        assert!(target.path().join("graphics/empty").is_dir());
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            import_dir(&dir.path().join("nope")),
            Err(ArchiveError::DirNotFound { .. })
        ));
    }

    #[test]
    fn test_codec_has_no_bytes() {
        assert!(!FolderCodec.probe(b"anything"));
        assert!(FolderCodec.decode(b"").is_err());
        assert!(FolderCodec.encode(&DirTree::new()).is_err());
    }
}
