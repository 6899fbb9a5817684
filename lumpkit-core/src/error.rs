//! Error types for Lumpkit operations.
//!
//! Every archive-layer failure is surfaced as an [`ArchiveError`]. The
//! variants fall into four groups: container format errors raised while
//! decoding bytes, policy violations (read-only archives, locked or foreign
//! entries), logic errors (removing the root directory, bad indices) and
//! resource errors from the filesystem.

use std::io;
use thiserror::Error;

/// The main error type for Lumpkit operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic number in a container header.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Container data ended before a structure was complete.
    #[error("Unexpected end of data at offset {offset}: need {needed} more bytes")]
    UnexpectedEof {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Number of bytes that were missing.
        needed: usize,
    },

    /// Corrupted data in a container.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Unsupported compression method inside a container.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from the container.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// The archive is read-only.
    #[error("Archive is read-only")]
    ReadOnly,

    /// The entry is locked (it backs an open embedded archive).
    #[error("Entry '{name}' is locked")]
    EntryLocked {
        /// Name of the locked entry.
        name: String,
    },

    /// The entry does not belong to this archive.
    #[error("Entry is not part of this archive")]
    ForeignEntry,

    /// Attempt to swap entries in different directories.
    #[error("Can't swap two entries in different directories")]
    CrossDirectorySwap,

    /// Attempt to remove the root directory.
    #[error("The root directory can't be removed")]
    RootDirRemoval,

    /// Index outside a directory's entry list.
    #[error("Index {index} out of bounds (directory has {len} entries)")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of entries in the directory.
        len: usize,
    },

    /// Directory not found.
    #[error("Directory not found: {path}")]
    DirNotFound {
        /// Path of the missing directory.
        path: String,
    },

    /// Entry not found.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name or path of the missing entry.
        name: String,
    },

    /// An entry name is not valid for the archive's format.
    #[error("Invalid entry name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Operation not supported by the archive's format.
    #[error("Operation not supported by {format} archives: {operation}")]
    Unsupported {
        /// Format id.
        format: String,
        /// Description of the operation.
        operation: String,
    },

    /// Operation not valid in the archive's current lifecycle state.
    #[error("Invalid archive state: {message}")]
    InvalidState {
        /// Description of the state problem.
        message: String,
    },

    /// The parent archive of an embedded archive is gone or unusable.
    #[error("Parent archive unavailable: {message}")]
    ParentUnavailable {
        /// Description of the problem.
        message: String,
    },

    /// Configuration resource could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for Lumpkit operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unexpected end-of-data error.
    pub fn unexpected_eof(offset: usize, needed: usize) -> Self {
        Self::UnexpectedEof { offset, needed }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create a locked entry error.
    pub fn locked(name: impl Into<String>) -> Self {
        Self::EntryLocked { name: name.into() }
    }

    /// Create an index out of bounds error.
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }

    /// Create a directory not found error.
    pub fn dir_not_found(path: impl Into<String>) -> Self {
        Self::DirNotFound { path: path.into() }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(format: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            format: format.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a parent unavailable error.
    pub fn parent_unavailable(message: impl Into<String>) -> Self {
        Self::ParentUnavailable {
            message: message.into(),
        }
    }

    /// Whether this error was caused by malformed container bytes.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::UnexpectedEof { .. }
                | Self::CorruptedData { .. }
                | Self::InvalidHeader { .. }
                | Self::UnsupportedMethod { .. }
                | Self::CrcMismatch { .. }
        )
    }

    /// Whether this error is a policy violation (nothing was changed).
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::ReadOnly
                | Self::EntryLocked { .. }
                | Self::ForeignEntry
                | Self::CrossDirectorySwap
                | Self::Unsupported { .. }
                | Self::InvalidName { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArchiveError::invalid_magic(b"PWAD".to_vec(), b"JUNK".to_vec());
        assert!(err.to_string().contains("Invalid magic"));

        let err = ArchiveError::locked("MAP01");
        assert!(err.to_string().contains("MAP01"));

        let err = ArchiveError::out_of_bounds(5, 2);
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ArchiveError = io_err.into();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_error_classification() {
        assert!(ArchiveError::unexpected_eof(12, 4).is_format_error());
        assert!(ArchiveError::ReadOnly.is_policy_violation());
        assert!(ArchiveError::CrossDirectorySwap.is_policy_violation());
        assert!(!ArchiveError::RootDirRemoval.is_policy_violation());
    }
}
