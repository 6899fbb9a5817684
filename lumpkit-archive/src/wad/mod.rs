//! Doom WAD support.
//!
//! Layout:
//!
//! ```text
//! 0   magic       "IWAD" or "PWAD"
//! 4   num_lumps   u32
//! 8   dir_offset  u32
//! ... lump data
//! dir_offset: num_lumps × { offset u32, size u32, name [u8; 8] }
//! ```
//!
//! WADs are flat; namespaces are formed by marker lumps (see
//! [`crate::namespace`]). The IWAD/PWAD kind survives a rewrite through the
//! [`KIND_PROPERTY`] tree property.

use crate::{Archive, ArchiveFormat};
use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{ArchiveError, Codec, DataSource, DirTree, Entry, Result};
use std::path::Path;

/// Tree property holding the WAD kind (`IWAD` or `PWAD`).
pub const KIND_PROPERTY: &str = "wad.kind";

const HEADER_SIZE: usize = 12;
const DIR_RECORD_SIZE: usize = 16;
const NAME_WIDTH: usize = 8;

/// WAD container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct WadCodec;

impl WadCodec {
    fn read_header(data: &[u8]) -> Result<(&[u8], usize, usize)> {
        let mut reader = ByteReader::at(data, 0);
        let magic = reader.take(4)?;
        if magic != b"IWAD" && magic != b"PWAD" {
            return Err(ArchiveError::invalid_magic(b"PWAD".to_vec(), magic.to_vec()));
        }
        let num_lumps = reader.u32()? as usize;
        let dir_offset = reader.u32()? as usize;
        Ok((magic, num_lumps, dir_offset))
    }
}

impl Codec for WadCodec {
    fn id(&self) -> &'static str {
        "wad"
    }

    fn probe(&self, data: &[u8]) -> bool {
        let Ok((_, num_lumps, dir_offset)) = Self::read_header(data) else {
            return false;
        };
        num_lumps
            .checked_mul(DIR_RECORD_SIZE)
            .and_then(|size| size.checked_add(dir_offset))
            .is_some_and(|end| end <= data.len() && dir_offset >= HEADER_SIZE)
    }

    fn decode(&self, data: &[u8]) -> Result<DirTree> {
        let (magic, num_lumps, dir_offset) = Self::read_header(data)?;
        let dir_size = num_lumps
            .checked_mul(DIR_RECORD_SIZE)
            .ok_or_else(|| ArchiveError::corrupted(8, "lump count overflow"))?;
        let directory = bytes::slice(data, dir_offset, dir_size)?;

        let mut tree = DirTree::new();
        tree.set_property(KIND_PROPERTY, String::from_utf8_lossy(magic));
        let root = tree.root();

        let mut reader = ByteReader::at(directory, 0);
        for index in 0..num_lumps {
            let offset = reader.u32()? as usize;
            let size = reader.u32()? as usize;
            let name = reader.name(NAME_WIDTH)?;

            let payload = if size == 0 {
                Vec::new()
            } else {
                bytes::slice(data, offset, size)
                    .map_err(|_| {
                        ArchiveError::corrupted(
                            (dir_offset + index * DIR_RECORD_SIZE) as u64,
                            format!("lump {} extends past the end of the file", name),
                        )
                    })?
                    .to_vec()
            };

            let source = DataSource::stored(offset as u64, size as u64);
            tree.add_entry(root, Entry::from_container(name, payload, source), None)?;
        }

        log::debug!(
            "Read {} lumps from {}",
            num_lumps,
            String::from_utf8_lossy(magic)
        );
        Ok(tree)
    }

    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>> {
        let root = tree.root();
        if !tree.children(root).is_empty() {
            return Err(ArchiveError::unsupported("wad", "subdirectories"));
        }

        let lumps = tree.entries(root);
        let data_size: usize = lumps.iter().map(|lump| lump.data().len()).sum();
        let dir_offset = HEADER_SIZE + data_size;

        let magic: &[u8] = match tree.property(KIND_PROPERTY) {
            Some("IWAD") => b"IWAD",
            _ => b"PWAD",
        };

        let mut out = Vec::with_capacity(dir_offset + lumps.len() * DIR_RECORD_SIZE);
        out.extend_from_slice(magic);
        bytes::put_u32(&mut out, bytes::to_u32(lumps.len(), "lump count")?);
        bytes::put_u32(&mut out, bytes::to_u32(dir_offset, "directory offset")?);

        for lump in lumps {
            out.extend_from_slice(lump.data());
        }

        let mut offset = HEADER_SIZE;
        for lump in lumps {
            let size = lump.data().len();
            bytes::put_u32(&mut out, bytes::to_u32(offset, "lump offset")?);
            bytes::put_u32(&mut out, bytes::to_u32(size, "lump size")?);
            out.extend_from_slice(&bytes::encode_name(lump.name(), NAME_WIDTH));
            offset += size;
        }

        Ok(out)
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        let name = path.trim_start_matches('/');
        bytes::check_name(name)?;
        if bytes::encoded_len(name) > NAME_WIDTH {
            return Err(ArchiveError::invalid_name(
                name,
                format!("lump names are limited to {} characters", NAME_WIDTH),
            ));
        }
        Ok(())
    }
}

/// Check if `tree` was read from (or will be written as) an IWAD.
pub fn is_iwad(tree: &DirTree) -> bool {
    tree.property(KIND_PROPERTY) == Some("IWAD")
}

/// Write copies of `entries`, in order, to a new PWAD at `path`.
///
/// Names get the WAD naming rules. Every entry must have its data loaded.
pub fn export_entries(path: &Path, entries: &[&Entry]) -> Result<()> {
    let mut wad = Archive::new(ArchiveFormat::Wad);
    for &entry in entries {
        wad.add_entry(entry.clone(), None, None, true)?;
    }
    wad.save(Some(path))?;
    log::info!("Exported {} lumps to {}", entries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirTree {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::with_data("PLAYPAL", vec![1, 2, 3]), None)
            .unwrap();
        tree.add_entry(root, Entry::new("S_START"), None).unwrap();
        tree.add_entry(root, Entry::with_data("TROOA1", vec![9; 20]), None)
            .unwrap();
        tree.add_entry(root, Entry::new("S_END"), None).unwrap();
        tree
    }

    #[test]
    fn test_layout() {
        let bytes = WadCodec.encode(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"PWAD");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 4);
        let dir_offset = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        assert_eq!(dir_offset, 12 + 3 + 20);
        assert_eq!(bytes.len(), dir_offset + 4 * 16);
        assert_eq!(&bytes[12..15], &[1, 2, 3]);
        assert_eq!(&bytes[dir_offset + 8..dir_offset + 16], b"PLAYPAL\0");
    }

    #[test]
    fn test_decode_encoded() {
        let bytes = WadCodec.encode(&sample()).unwrap();
        assert!(WadCodec.probe(&bytes));

        let tree = WadCodec.decode(&bytes).unwrap();
        let names: Vec<&str> = tree.entries(tree.root()).iter().map(|e| e.name()).collect();
        assert_eq!(names, ["PLAYPAL", "S_START", "TROOA1", "S_END"]);
        assert_eq!(tree.entry_at(tree.root(), 2).unwrap().data(), &[9; 20]);
        assert_eq!(tree.property(KIND_PROPERTY), Some("PWAD"));

        // Re-encoding is byte identical
        assert_eq!(WadCodec.encode(&tree).unwrap(), bytes);
    }

    #[test]
    fn test_iwad_kind_kept() {
        let mut tree = sample();
        tree.set_property(KIND_PROPERTY, "IWAD");
        let bytes = WadCodec.encode(&tree).unwrap();
        assert_eq!(&bytes[0..4], b"IWAD");
        let decoded = WadCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.property(KIND_PROPERTY), Some("IWAD"));
    }

    #[test]
    fn test_export_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.wad");
        let tree = sample();
        let entries: Vec<&Entry> = tree.entries(tree.root()).iter().collect();
        let lowercase = Entry::with_data("demo1", vec![7]);
        let mut picked = vec![entries[2], entries[0]];
        picked.push(&lowercase);
        export_entries(&path, &picked).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"PWAD");
        let exported = WadCodec.decode(&bytes).unwrap();
        assert!(!is_iwad(&exported));
        let names: Vec<&str> = exported.entries(exported.root()).iter().map(|e| e.name()).collect();
        assert_eq!(names, ["TROOA1", "PLAYPAL", "DEMO1"]);
        assert_eq!(exported.entry_at(exported.root(), 0).unwrap().data(), &[9; 20]);

        let mut unloaded = Entry::from_container("GONE", vec![1], DataSource::stored(12, 1));
        assert!(unloaded.unload_data());
        assert!(export_entries(&dir.path().join("bad.wad"), &[&unloaded]).is_err());
        assert!(!dir.path().join("bad.wad").exists());
    }

    #[test]
    fn test_truncated() {
        let bytes = WadCodec.encode(&sample()).unwrap();
        let cut = &bytes[..bytes.len() - 5];
        assert!(!WadCodec.probe(cut));
        assert!(WadCodec.decode(cut).unwrap_err().is_format_error());
        assert!(WadCodec.decode(b"JUNKJUNKJUNK").is_err());
    }

    #[test]
    fn test_lump_past_end() {
        let mut bytes = b"PWAD".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(b"BROKEN\0\0");
        assert!(matches!(
            WadCodec.decode(&bytes),
            Err(ArchiveError::CorruptedData { .. })
        ));
    }

    #[test]
    fn test_name_limit() {
        assert!(WadCodec.check_entry_path("/MAP01").is_ok());
        assert!(WadCodec.check_entry_path("/TOOLONGNAME").is_err());
    }
}
