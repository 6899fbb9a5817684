//! Build engine GRP support.
//!
//! ```text
//! 0   magic       "KenSilverman"
//! 12  num_files   u32
//! 16  num_files × { name [u8; 12], size u32 }
//! ... file data, in record order
//! ```

use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{ArchiveError, Codec, DataSource, DirTree, Entry, Result};

const MAGIC: &[u8; 12] = b"KenSilverman";
const HEADER_SIZE: usize = 16;
const RECORD_SIZE: usize = 16;
const NAME_WIDTH: usize = 12;

/// GRP container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpCodec;

impl GrpCodec {
    fn read_header(data: &[u8]) -> Result<usize> {
        let mut reader = ByteReader::at(data, 0);
        let magic = reader.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(ArchiveError::invalid_magic(MAGIC.to_vec(), magic.to_vec()));
        }
        Ok(reader.u32()? as usize)
    }
}

impl Codec for GrpCodec {
    fn id(&self) -> &'static str {
        "grp"
    }

    fn probe(&self, data: &[u8]) -> bool {
        Self::read_header(data).is_ok_and(|count| {
            count
                .checked_mul(RECORD_SIZE)
                .and_then(|size| size.checked_add(HEADER_SIZE))
                .is_some_and(|end| end <= data.len())
        })
    }

    fn decode(&self, data: &[u8]) -> Result<DirTree> {
        let count = Self::read_header(data)?;
        let table_size = count
            .checked_mul(RECORD_SIZE)
            .ok_or_else(|| ArchiveError::corrupted(12, "file count overflow"))?;
        let table = bytes::slice(data, HEADER_SIZE, table_size)?;

        let mut tree = DirTree::new();
        let root = tree.root();
        let mut reader = ByteReader::at(table, 0);
        let mut offset = HEADER_SIZE + table_size;
        for _ in 0..count {
            let name = reader.name(NAME_WIDTH)?;
            let size = reader.u32()? as usize;
            let payload = bytes::slice(data, offset, size)?.to_vec();
            let source = DataSource::stored(offset as u64, size as u64);
            tree.add_entry(root, Entry::from_container(name, payload, source), None)?;
            offset += size;
        }

        Ok(tree)
    }

    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>> {
        let root = tree.root();
        if !tree.children(root).is_empty() {
            return Err(ArchiveError::unsupported("grp", "subdirectories"));
        }
        let files = tree.entries(root);

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        bytes::put_u32(&mut out, bytes::to_u32(files.len(), "file count")?);
        for file in files {
            out.extend_from_slice(&bytes::encode_name(file.name(), NAME_WIDTH));
            bytes::put_u32(&mut out, bytes::to_u32(file.data().len(), "file size")?);
        }
        for file in files {
            out.extend_from_slice(file.data());
        }
        Ok(out)
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        let name = path.trim_start_matches('/');
        bytes::check_name(name)?;
        if bytes::encoded_len(name) > NAME_WIDTH {
            return Err(ArchiveError::invalid_name(
                name,
                format!("names are limited to {} characters", NAME_WIDTH),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encoded() {
        let mut tree = DirTree::new();
        let root = tree.root();
        tree.add_entry(root, Entry::with_data("TILES000.ART", vec![1; 10]), None)
            .unwrap();
        tree.add_entry(root, Entry::with_data("GAME.CON", b"define".to_vec()), None)
            .unwrap();

        let bytes = GrpCodec.encode(&tree).unwrap();
        assert!(GrpCodec.probe(&bytes));
        assert_eq!(bytes.len(), 16 + 2 * 16 + 10 + 6);
        assert_eq!(&bytes[16..28], b"TILES000.ART");

        let decoded = GrpCodec.decode(&bytes).unwrap();
        let second = decoded.entry_at(decoded.root(), 1).unwrap();
        assert_eq!(second.name(), "GAME.CON");
        assert_eq!(second.data(), b"define");
        assert_eq!(second.source().unwrap().offset, 16 + 32 + 10);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(!GrpCodec.probe(b"KenSilverman"));
        assert!(GrpCodec.decode(b"NotKenSilver\0\0\0\0").is_err());

        let mut truncated = MAGIC.to_vec();
        truncated.extend_from_slice(&1u32.to_le_bytes());
        truncated.extend_from_slice(b"A.ART\0\0\0\0\0\0\0");
        truncated.extend_from_slice(&50u32.to_le_bytes());
        assert!(GrpCodec.probe(&truncated));
        assert!(GrpCodec.decode(&truncated).unwrap_err().is_format_error());
    }
}
