//! Quake PAK support.
//!
//! Layout:
//!
//! ```text
//! 0   magic       "PACK"
//! 4   dir_offset  u32
//! 8   dir_size    u32 (64 bytes per record)
//! ... file data
//! dir_offset: records of { path [u8; 56], offset u32, size u32 }
//! ```
//!
//! Directories exist only as path components of file records, so empty
//! directories are not stored.

use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{ArchiveError, Codec, DataSource, DirTree, Entry, Result};

const HEADER_SIZE: usize = 12;
const DIR_RECORD_SIZE: usize = 64;
const PATH_WIDTH: usize = 56;

/// Longest storable path; the field keeps a terminating NUL.
pub const MAX_PATH_LEN: usize = PATH_WIDTH - 1;

/// PAK container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct PakCodec;

impl PakCodec {
    fn read_header(data: &[u8]) -> Result<(usize, usize)> {
        let mut reader = ByteReader::at(data, 0);
        let magic = reader.take(4)?;
        if magic != b"PACK" {
            return Err(ArchiveError::invalid_magic(b"PACK".to_vec(), magic.to_vec()));
        }
        let dir_offset = reader.u32()? as usize;
        let dir_size = reader.u32()? as usize;
        Ok((dir_offset, dir_size))
    }
}

impl Codec for PakCodec {
    fn id(&self) -> &'static str {
        "pak"
    }

    fn probe(&self, data: &[u8]) -> bool {
        match Self::read_header(data) {
            Ok((dir_offset, dir_size)) => {
                dir_size % DIR_RECORD_SIZE == 0
                    && dir_offset >= HEADER_SIZE
                    && dir_offset
                        .checked_add(dir_size)
                        .is_some_and(|end| end <= data.len())
            }
            Err(_) => false,
        }
    }

    fn decode(&self, data: &[u8]) -> Result<DirTree> {
        let (dir_offset, dir_size) = Self::read_header(data)?;
        if dir_size % DIR_RECORD_SIZE != 0 {
            return Err(ArchiveError::invalid_header(format!(
                "directory size {} is not a multiple of {}",
                dir_size, DIR_RECORD_SIZE
            )));
        }
        let directory = bytes::slice(data, dir_offset, dir_size)?;

        let mut tree = DirTree::new();
        let mut reader = ByteReader::at(directory, 0);
        for _ in 0..dir_size / DIR_RECORD_SIZE {
            let path = reader.name(PATH_WIDTH)?;
            let offset = reader.u32()? as usize;
            let size = reader.u32()? as usize;

            let (dir_path, name) = match path.rfind('/') {
                Some(pos) => (&path[..pos], &path[pos + 1..]),
                None => ("", path.as_str()),
            };
            if name.is_empty() {
                return Err(ArchiveError::corrupted(
                    (dir_offset + reader.position()) as u64,
                    format!("record '{}' has no file name", path),
                ));
            }

            let payload = bytes::slice(data, offset, size)?.to_vec();
            let (dir, _) = tree.add_child(tree.root(), dir_path)?;
            let source = DataSource::stored(offset as u64, size as u64);
            tree.add_entry(dir, Entry::from_container(name, payload, source), None)?;
        }

        Ok(tree)
    }

    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>> {
        let mut dirs = vec![tree.root()];
        dirs.extend(tree.descendants(tree.root()));

        let mut out = Vec::new();
        out.extend_from_slice(b"PACK");
        out.extend_from_slice(&[0u8; 8]);

        let mut records = Vec::new();
        for dir in dirs {
            let dir_path = tree.path(dir);
            for entry in tree.entries(dir) {
                let path = format!("{}{}", &dir_path[1..], entry.name());
                self.check_entry_path(&path)?;
                let offset = out.len();
                out.extend_from_slice(entry.data());

                records.extend_from_slice(&bytes::encode_name(&path, PATH_WIDTH));
                bytes::put_u32(&mut records, bytes::to_u32(offset, "file offset")?);
                bytes::put_u32(&mut records, bytes::to_u32(entry.data().len(), "file size")?);
            }
        }

        let dir_offset = bytes::to_u32(out.len(), "directory offset")?;
        let dir_size = bytes::to_u32(records.len(), "directory size")?;
        out[4..8].copy_from_slice(&dir_offset.to_le_bytes());
        out[8..12].copy_from_slice(&dir_size.to_le_bytes());
        out.extend_from_slice(&records);
        Ok(out)
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        let path = path.trim_start_matches('/');
        bytes::check_name(path)?;
        if bytes::encoded_len(path) > MAX_PATH_LEN {
            return Err(ArchiveError::invalid_name(
                path,
                format!("paths are limited to {} characters", MAX_PATH_LEN),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirTree {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::with_data("default.cfg", b"bind x".to_vec()), None)
            .unwrap();
        let (maps, _) = tree.add_child(root, "maps").unwrap();
        tree.add_entry(maps, Entry::with_data("e1m1.bsp", vec![7; 33]), None)
            .unwrap();
        let (sound, _) = tree.add_child(root, "sound/items").unwrap();
        tree.add_entry(sound, Entry::with_data("r_item1.wav", vec![1, 2]), None)
            .unwrap();
        tree
    }

    #[test]
    fn test_decode_encoded() {
        let bytes = PakCodec.encode(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"PACK");
        assert!(PakCodec.probe(&bytes));

        let tree = PakCodec.decode(&bytes).unwrap();
        let maps = tree.child(tree.root(), "maps").unwrap();
        assert_eq!(tree.entry_at(maps, 0).unwrap().data(), &[7; 33]);
        let items = tree.child(tree.root(), "sound/items").unwrap();
        assert_eq!(tree.entry_at(items, 0).unwrap().name(), "r_item1.wav");
        assert_eq!(tree.num_entries(tree.root(), true), 3);

        assert_eq!(PakCodec.encode(&tree).unwrap(), bytes);
    }

    #[test]
    fn test_record_layout() {
        let bytes = PakCodec.encode(&sample()).unwrap();
        let dir_offset = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let dir_size = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        assert_eq!(dir_size, 3 * 64);
        assert_eq!(dir_offset + dir_size, bytes.len());
        let second = &bytes[dir_offset + 64..dir_offset + 128];
        assert!(second.starts_with(b"maps/e1m1.bsp\0"));
    }

    #[test]
    fn test_path_limit() {
        let long = format!("maps/{}", "x".repeat(60));
        assert!(PakCodec.check_entry_path(&long).is_err());
        assert!(PakCodec.check_entry_path("/maps/e1m1.bsp").is_ok());

        let mut tree = DirTree::new();
        tree.add_entry(tree.root(), Entry::new(long), None).unwrap();
        assert!(matches!(
            PakCodec.encode(&tree),
            Err(ArchiveError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_bad_directory_size() {
        let mut bytes = b"PACK".to_vec();
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(!PakCodec.probe(&bytes));
        assert!(PakCodec.decode(&bytes).is_err());
    }
}
