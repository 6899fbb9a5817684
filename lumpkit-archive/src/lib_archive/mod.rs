//! Shadowcaster LIB support.
//!
//! The index sits at the end of the file:
//!
//! ```text
//! 0   lump data
//! ... num_lumps × { size u32, offset u32, name [u8; 13] }
//! end-2  num_lumps  u16
//! ```
//!
//! There is no magic number, so probing checks that every record points
//! inside the data region before the index.

use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{ArchiveError, Codec, DataSource, DirTree, Entry, Result};

const RECORD_SIZE: usize = 21;
const NAME_WIDTH: usize = 13;
const COUNT_SIZE: usize = 2;

/// Longest storable name; the field keeps a terminating NUL.
pub const MAX_NAME_LEN: usize = NAME_WIDTH - 1;

struct Record {
    name: String,
    offset: usize,
    size: usize,
}

/// LIB container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibCodec;

impl LibCodec {
    fn read_index(data: &[u8]) -> Result<(usize, Vec<Record>)> {
        if data.len() < COUNT_SIZE {
            return Err(ArchiveError::unexpected_eof(0, COUNT_SIZE - data.len()));
        }
        let count_pos = data.len() - COUNT_SIZE;
        let count = ByteReader::at(data, count_pos).u16()? as usize;
        let index_start = count_pos
            .checked_sub(count * RECORD_SIZE)
            .ok_or_else(|| ArchiveError::invalid_header("lump index larger than the file"))?;

        let mut reader = ByteReader::at(data, index_start);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let size = reader.u32()? as usize;
            let offset = reader.u32()? as usize;
            let name = reader.name(NAME_WIDTH)?;
            let in_bounds = offset
                .checked_add(size)
                .is_some_and(|end| end <= index_start);
            if !in_bounds {
                return Err(ArchiveError::corrupted(
                    reader.position() as u64,
                    format!("lump {} lies outside the data region", name),
                ));
            }
            records.push(Record { name, offset, size });
        }
        Ok((index_start, records))
    }
}

impl Codec for LibCodec {
    fn id(&self) -> &'static str {
        "lib"
    }

    fn probe(&self, data: &[u8]) -> bool {
        match Self::read_index(data) {
            Ok((_, records)) => {
                !records.is_empty()
                    && records.iter().all(|record| {
                        !record.name.is_empty()
                            && record.name.chars().all(|c| c.is_ascii_graphic())
                    })
            }
            Err(_) => false,
        }
    }

    fn decode(&self, data: &[u8]) -> Result<DirTree> {
        let (_, records) = Self::read_index(data)?;
        let mut tree = DirTree::new();
        let root = tree.root();
        for record in records {
            let payload = bytes::slice(data, record.offset, record.size)?.to_vec();
            let source = DataSource::stored(record.offset as u64, record.size as u64);
            tree.add_entry(
                root,
                Entry::from_container(record.name, payload, source),
                None,
            )?;
        }
        Ok(tree)
    }

    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>> {
        let root = tree.root();
        if !tree.children(root).is_empty() {
            return Err(ArchiveError::unsupported("lib", "subdirectories"));
        }
        let lumps = tree.entries(root);
        let count = u16::try_from(lumps.len()).map_err(|_| {
            ArchiveError::invalid_header(format!("too many lumps: {}", lumps.len()))
        })?;

        let mut out = Vec::new();
        let mut index = Vec::with_capacity(lumps.len() * RECORD_SIZE);
        for lump in lumps {
            self.check_entry_path(lump.name())?;
            let offset = out.len();
            out.extend_from_slice(lump.data());
            bytes::put_u32(&mut index, bytes::to_u32(lump.data().len(), "lump size")?);
            bytes::put_u32(&mut index, bytes::to_u32(offset, "lump offset")?);
            index.extend_from_slice(&bytes::encode_name(lump.name(), NAME_WIDTH));
        }
        out.extend_from_slice(&index);
        bytes::put_u16(&mut out, count);
        Ok(out)
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        let name = path.trim_start_matches('/');
        bytes::check_name(name)?;
        if bytes::encoded_len(name) > MAX_NAME_LEN {
            return Err(ArchiveError::invalid_name(
                name,
                format!("names are limited to {} characters", MAX_NAME_LEN),
            ));
        }
        Ok(())
    }
}
