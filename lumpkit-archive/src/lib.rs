//! # Lumpkit Archive
//!
//! Editable game resource archives for Lumpkit.
//!
//! This crate reads, edits and writes these container formats:
//!
//! - **WAD**: Doom lump archives, with marker-bracketed namespaces
//! - **PAK**: Quake archives with directory paths
//! - **GRP**: Build engine group files
//! - **LIB**: Shadowcaster libraries
//! - **ZIP / PK3**: stored and deflated members with directories
//! - **Folder**: a filesystem directory treated as an archive
//!
//! Every format is opened into the same [`Archive`], which offers entry and
//! directory mutations with change events, entry locking for embedded
//! archives, search, namespace detection and an undo/redo journal.
//!
//! ## Example
//!
//! ```rust
//! use lumpkit_archive::{Archive, ArchiveFormat};
//!
//! let mut wad = Archive::new(ArchiveFormat::Wad);
//! wad.set_record_undo(true);
//! let id = wad.add_new_entry("dehacked", None, None).unwrap();
//! wad.rename_entry(id, "bex").unwrap();
//! assert_eq!(wad.entry(id).unwrap().name(), "BEX");
//!
//! let bytes = wad.write_bytes(false).unwrap();
//! assert_eq!(&bytes[0..4], b"PWAD");
//!
//! wad.undo().unwrap();
//! wad.undo().unwrap();
//! assert_eq!(wad.num_entries(), 0);
//! ```
//!
//! ## Format Detection
//!
//! Use [`detect::ArchiveFormat`] to identify container bytes, or
//! [`Archive::from_bytes`] / [`Archive::from_file`] to detect and open in one
//! step.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod detect;
pub mod folder;
pub mod grp;
pub mod lib_archive;
pub mod namespace;
pub mod options;
pub mod pak;
pub mod search;
pub mod undo;
pub mod wad;
pub mod zip;

// Re-exports
pub use archive::Archive;
pub use detect::ArchiveFormat;
pub use folder::FolderCodec;
pub use grp::GrpCodec;
pub use lib_archive::LibCodec;
pub use namespace::{GLOBAL_NAMESPACE, MarkerNamespace, NamespacePolicy};
pub use options::ArchiveOptions;
pub use pak::PakCodec;
pub use search::SearchOptions;
pub use undo::{UndoLevel, UndoManager, UndoStep};
pub use wad::WadCodec;
pub use zip::ZipCodec;
