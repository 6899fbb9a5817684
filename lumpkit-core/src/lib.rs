//! # Lumpkit Core
//!
//! Core components for the Lumpkit archive library.
//!
//! This crate provides the building blocks shared by every container format:
//!
//! - [`entry`]: Archive entries, their state and advisory locks
//! - [`entry_type`]: Byte-level content type detection
//! - [`tree`]: Arena-backed directory tree
//! - [`format`]: Format descriptors and the format registry
//! - [`event`]: Change notifications
//! - [`traits`]: The container codec interface
//! - [`bytes`]: Little-endian fields and legacy name encoding
//! - [`crc`]: CRC-32 checksum
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Archive (lumpkit-archive)                               │
//! │     mutation API, undo journal, search, namespaces      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Codec                                                   │
//! │     WAD, PAK, GRP, LIB, ZIP, folder                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     Entry, DirTree, FormatRegistry, events, CRC         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use lumpkit_core::{DirTree, Entry, EntryState};
//!
//! let mut tree = DirTree::new();
//! let (sprites, _) = tree.add_child(tree.root(), "sprites").unwrap();
//! tree.add_entry(sprites, Entry::new("TROOA1"), None).unwrap();
//!
//! assert_eq!(tree.path(sprites), "/sprites/");
//! assert_eq!(tree.num_entries(tree.root(), true), 1);
//! assert_eq!(tree.entry_at(sprites, 0).unwrap().state(), EntryState::New);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bytes;
pub mod crc;
pub mod entry;
pub mod entry_type;
pub mod error;
pub mod event;
pub mod format;
pub mod traits;
pub mod tree;

// Re-exports for convenience
pub use crc::Crc32;
pub use entry::{CompressionMethod, DataSource, Entry, EntryId, EntryLock, EntryState};
pub use entry_type::EntryType;
pub use error::{ArchiveError, Result};
pub use event::{Announcer, ArchiveEvent, ArchiveListener, ListenerId};
pub use format::{ExtensionDesc, FOLDER_FORMAT, FormatDescriptor, FormatRegistry};
pub use traits::Codec;
pub use tree::{DirId, DirNode, DirTree, EntryLoc, check_dir_name};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entry::{Entry, EntryId, EntryState};
    pub use crate::entry_type::EntryType;
    pub use crate::error::{ArchiveError, Result};
    pub use crate::event::{ArchiveEvent, ArchiveListener};
    pub use crate::format::{FormatDescriptor, FormatRegistry};
    pub use crate::traits::Codec;
    pub use crate::tree::{DirId, DirTree};
}
