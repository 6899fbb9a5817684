//! The container codec interface.
//!
//! Each supported container format implements [`Codec`]: sniff raw bytes,
//! decode them into a [`DirTree`] and encode a tree back into the format's
//! exact binary layout.

use crate::bytes;
use crate::entry::{CompressionMethod, DataSource};
use crate::error::{ArchiveError, Result};
use crate::tree::DirTree;

/// A container format codec.
pub trait Codec: Sync {
    /// Format id (matches the registry).
    fn id(&self) -> &'static str;

    /// Check whether `data` looks like this format.
    fn probe(&self, data: &[u8]) -> bool;

    /// Decode a container into a tree.
    ///
    /// Decoded entries carry a [`DataSource`] describing where their payload
    /// lives in `data`.
    fn decode(&self, data: &[u8]) -> Result<DirTree>;

    /// Encode a tree into the container's byte layout.
    ///
    /// Every entry payload must be loaded.
    fn encode(&self, tree: &DirTree) -> Result<Vec<u8>>;

    /// Load one entry's payload from the container bytes it was decoded from.
    fn load_entry_data(&self, backing: &[u8], source: &DataSource) -> Result<Vec<u8>> {
        match source.method {
            CompressionMethod::Stored => {
                let offset = usize::try_from(source.offset)
                    .map_err(|_| ArchiveError::corrupted(source.offset, "offset too large"))?;
                let len = usize::try_from(source.stored_size)
                    .map_err(|_| ArchiveError::corrupted(source.offset, "size too large"))?;
                Ok(bytes::slice(backing, offset, len)?.to_vec())
            }
            other => Err(ArchiveError::unsupported_method(other.to_string())),
        }
    }

    /// Validate the full path of an entry (directory path plus name).
    ///
    /// The default accepts anything.
    fn check_entry_path(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Raw;

    impl Codec for Raw {
        fn id(&self) -> &'static str {
            "raw"
        }

        fn probe(&self, _data: &[u8]) -> bool {
            true
        }

        fn decode(&self, _data: &[u8]) -> Result<DirTree> {
            Ok(DirTree::new())
        }

        fn encode(&self, _tree: &DirTree) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_default_load_entry_data() {
        let backing = b"headerPAYLOADtail";
        let data = Raw
            .load_entry_data(backing, &DataSource::stored(6, 7))
            .unwrap();
        assert_eq!(data, b"PAYLOAD");

        assert!(Raw
            .load_entry_data(backing, &DataSource::stored(12, 40))
            .is_err());

        let deflated = DataSource {
            method: CompressionMethod::Deflate,
            ..DataSource::stored(0, 4)
        };
        assert!(matches!(
            Raw.load_entry_data(backing, &deflated),
            Err(ArchiveError::UnsupportedMethod { .. })
        ));
    }
}
