//! ZIP archive format support.
//!
//! Members are read through the central directory. Directory records
//! (`name/`) become tree directories, and every non-root directory is written
//! back as its own record so empty directories survive a round trip.
//! Members are stored or deflated; Zip64 and encrypted members are rejected.

mod header;

pub use header::{
    CentralDirEntry, EndOfCentralDir, dos_time, dos_time_now, method_from_u16, method_to_u16,
};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{
    ArchiveError, Codec, CompressionMethod, Crc32, DataSource, DirTree, Entry, Result,
};
use std::io::{Read, Write};

/// Deflate cannot expand input by more than this factor.
const MAX_DEFLATE_RATIO: u64 = 1032;

/// Upper bound on the up-front buffer for an inflated member.
const PREALLOC_LIMIT: u64 = 64 << 20;

/// ZIP container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ZipCodec {
    fn compress(data: &[u8]) -> Result<(Vec<u8>, CompressionMethod)> {
        if data.is_empty() {
            return Ok((Vec::new(), CompressionMethod::Stored));
        }
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        // Only use compression if it's smaller
        if compressed.len() < data.len() {
            Ok((compressed, CompressionMethod::Deflate))
        } else {
            Ok((data.to_vec(), CompressionMethod::Stored))
        }
    }

    fn write_member(
        out: &mut Vec<u8>,
        central: &mut Vec<u8>,
        mut record: CentralDirEntry,
        stored: &[u8],
    ) -> Result<()> {
        record.local_header_offset = bytes::to_u32(out.len(), "local header offset")?;
        record.write_local(out)?;
        out.extend_from_slice(stored);
        record.write_central(central)?;
        Ok(())
    }
}

impl Codec for ZipCodec {
    fn id(&self) -> &'static str {
        "zip"
    }

    fn probe(&self, data: &[u8]) -> bool {
        (data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06"))
            && EndOfCentralDir::find(data).is_ok()
    }

    fn decode(&self, data: &[u8]) -> Result<DirTree> {
        let eocd = EndOfCentralDir::find(data)?;
        let mut reader = ByteReader::at(data, eocd.cd_offset as usize);
        let mut tree = DirTree::new();
        let root = tree.root();

        for _ in 0..eocd.entries {
            let record = CentralDirEntry::read(&mut reader)?;
            self.check_entry_path(&record.name)?;
            let path = record.name.trim_start_matches('/');
            if record.is_dir() {
                tree.add_child(root, path)?;
                continue;
            }
            if record.is_encrypted() {
                return Err(ArchiveError::unsupported_method(format!(
                    "encrypted member '{}'",
                    record.name
                )));
            }

            let (dir_path, name) = match path.rfind('/') {
                Some(pos) => (&path[..pos], &path[pos + 1..]),
                None => ("", path),
            };

            let source = DataSource {
                offset: record.data_offset(data)? as u64,
                stored_size: u64::from(record.compressed_size),
                size: u64::from(record.uncompressed_size),
                method: record.method,
                crc32: Some(record.crc32),
            };
            let payload = self.load_entry_data(data, &source)?;
            let (dir, _) = tree.add_child(root, dir_path)?;
            tree.add_entry(dir, Entry::from_container(name, payload, source), None)?;
        }

        log::debug!("Read {} ZIP members", eocd.entries);
        Ok(tree)
    }

    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>> {
        let root = tree.root();
        let mut dirs = vec![root];
        dirs.extend(tree.descendants(root));

        let mut out = Vec::new();
        let mut central = Vec::new();
        let mut count = 0usize;

        for dir in dirs {
            let dir_path = tree.path(dir);
            let prefix = &dir_path[1..];
            if dir != root {
                Self::write_member(&mut out, &mut central, CentralDirEntry::directory(prefix), &[])?;
                count += 1;
            }

            for entry in tree.entries(dir) {
                let data = entry.data();
                let (stored, method) = Self::compress(data)?;
                let sizes = (
                    bytes::to_u32(stored.len(), "compressed size")?,
                    bytes::to_u32(data.len(), "uncompressed size")?,
                );
                let name = format!("{}{}", prefix, entry.name());
                let record = CentralDirEntry::file(&name, method, Crc32::compute(data), sizes);
                Self::write_member(&mut out, &mut central, record, &stored)?;
                count += 1;
            }
        }

        let entries = u16::try_from(count)
            .map_err(|_| ArchiveError::unsupported("zip", "more than 65535 members"))?;
        let eocd = EndOfCentralDir {
            entries,
            cd_size: bytes::to_u32(central.len(), "central directory size")?,
            cd_offset: bytes::to_u32(out.len(), "central directory offset")?,
        };
        out.extend_from_slice(&central);
        eocd.write(&mut out);
        Ok(out)
    }

    fn load_entry_data(&self, backing: &[u8], source: &DataSource) -> Result<Vec<u8>> {
        let offset = source.offset as usize;
        let stored = bytes::slice(backing, offset, source.stored_size as usize)?;
        let data = match source.method {
            CompressionMethod::Stored => stored.to_vec(),
            CompressionMethod::Deflate => {
                // The recorded size is untrusted: cap the preallocation and
                // stop inflating one byte past it.
                let capacity = source
                    .size
                    .min(source.stored_size.saturating_mul(MAX_DEFLATE_RATIO))
                    .min(PREALLOC_LIMIT);
                let mut data = Vec::with_capacity(capacity as usize);
                DeflateDecoder::new(stored)
                    .take(source.size.saturating_add(1))
                    .read_to_end(&mut data)
                    .map_err(|e| ArchiveError::corrupted(source.offset, e.to_string()))?;
                data
            }
            CompressionMethod::Unknown(id) => {
                return Err(ArchiveError::unsupported_method(format!("ZIP method {}", id)));
            }
        };

        if data.len() as u64 != source.size {
            return Err(ArchiveError::corrupted(
                source.offset,
                format!("expected {} bytes, got {}", source.size, data.len()),
            ));
        }
        if let Some(expected) = source.crc32 {
            let computed = Crc32::compute(&data);
            if computed != expected {
                return Err(ArchiveError::crc_mismatch(expected, computed));
            }
        }
        Ok(data)
    }

    fn check_entry_path(&self, path: &str) -> Result<()> {
        let escapes = path
            .split('/')
            .any(|segment| segment == "." || segment == "..");
        if escapes || path.contains('\0') {
            return Err(ArchiveError::invalid_name(path, "not a valid member path"));
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
        let text = "actor Imp2 : DoomImp {}\n".repeat(50);
        tree.add_entry(root, Entry::with_data("decorate.txt", text.into_bytes()), None)
            .unwrap();
        let (sprites, _) = tree.add_child(root, "sprites").unwrap();
        tree.add_entry(sprites, Entry::with_data("troo.png", vec![0x89, 1, 2]), None)
            .unwrap();
        tree.add_child(root, "sounds/empty").unwrap();
        tree
    }

    #[test]
    fn test_decode_encoded() {
        let bytes = ZipCodec.encode(&sample()).unwrap();
        assert!(ZipCodec.probe(&bytes));

        let tree = ZipCodec.decode(&bytes).unwrap();
        let decorate = tree.entry_at(tree.root(), 0).unwrap();
        assert_eq!(decorate.source().unwrap().method, CompressionMethod::Deflate);
        assert_eq!(decorate.data().len(), 24 * 50);

        let sprites = tree.child(tree.root(), "sprites").unwrap();
        assert_eq!(tree.entry_at(sprites, 0).unwrap().data(), &[0x89, 1, 2]);
        assert_eq!(
            tree.entry_at(sprites, 0).unwrap().source().unwrap().method,
            CompressionMethod::Stored
        );

        // Empty directories survive
        assert!(tree.child(tree.root(), "sounds/empty").is_some());
    }

    #[test]
    fn test_empty_archive() {
        let bytes = ZipCodec.encode(&DirTree::new()).unwrap();
        assert_eq!(bytes.len(), 22);
        assert!(ZipCodec.probe(&bytes));
        assert!(ZipCodec.decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_crc_mismatch() {
        let mut tree = DirTree::new();
        tree.add_entry(tree.root(), Entry::with_data("a.txt", b"abc".to_vec()), None)
            .unwrap();
        let mut bytes = ZipCodec.encode(&tree).unwrap();
        // Stored payload follows the 30 byte local header and the 5 byte name
        bytes[35] ^= 0xFF;
        assert!(matches!(
            ZipCodec.decode(&bytes),
            Err(ArchiveError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_inflate_stops_past_recorded_size() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&[0u8; 1 << 16]).unwrap();
        let stored = encoder.finish().unwrap();

        let source = DataSource {
            offset: 0,
            stored_size: stored.len() as u64,
            size: 16,
            method: CompressionMethod::Deflate,
            crc32: None,
        };
        let err = ZipCodec.load_entry_data(&stored, &source).unwrap_err();
        match err {
            ArchiveError::CorruptedData { message, .. } => {
                assert_eq!(message, "expected 16 bytes, got 17")
            }
            other => panic!("unexpected error: {other}"),
        }

        let honest = DataSource { size: 1 << 16, ..source };
        assert_eq!(ZipCodec.load_entry_data(&stored, &honest).unwrap().len(), 1 << 16);
    }

    #[test]
    fn test_rejects_parent_segments() {
        let mut tree = DirTree::new();
        let (dir, _) = tree.add_child(tree.root(), "aa").unwrap();
        tree.add_entry(dir, Entry::with_data("x", b"payload".to_vec()), None)
            .unwrap();
        let mut bytes = ZipCodec.encode(&tree).unwrap();

        // Rewrite both directory and member names, local and central
        let mut patched = 0;
        for i in 0..bytes.len() - 2 {
            if &bytes[i..i + 3] == b"aa/" {
                bytes[i..i + 3].copy_from_slice(b"../");
                patched += 1;
            }
        }
        assert_eq!(patched, 4);
        assert!(matches!(
            ZipCodec.decode(&bytes),
            Err(ArchiveError::InvalidName { .. })
        ));
        assert!(ZipCodec.check_entry_path("/maps/./e1m1.wad").is_err());
        assert!(ZipCodec.check_entry_path("/maps/e1m1.wad").is_ok());
    }

    #[test]
    fn test_not_a_zip() {
        assert!(!ZipCodec.probe(b"PWAD\0\0\0\0\0\0\0\0"));
        assert!(ZipCodec.decode(b"PK\x03\x04 but nothing else").is_err());
    }
}
