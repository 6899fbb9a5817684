//! Archive format dispatch and auto-detection.
//!
//! [`ArchiveFormat`] is the closed set of supported containers. Each variant
//! maps to a static [`Codec`]; detection probes the codecs in a fixed order so
//! that formats with strong signatures win over the loosely identified LIB.

use crate::folder::FolderCodec;
use crate::grp::GrpCodec;
use crate::lib_archive::LibCodec;
use crate::pak::PakCodec;
use crate::wad::WadCodec;
use crate::zip::ZipCodec;
use lumpkit_core::Codec;

static WAD: WadCodec = WadCodec;
static PAK: PakCodec = PakCodec;
static GRP: GrpCodec = GrpCodec;
static LIB: LibCodec = LibCodec;
static ZIP: ZipCodec = ZipCodec;
static FOLDER: FolderCodec = FolderCodec;

/// Known archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Doom WAD (.wad).
    Wad,
    /// Quake PAK (.pak).
    Pak,
    /// Build engine GRP (.grp).
    Grp,
    /// Shadowcaster LIB (.lib).
    Lib,
    /// ZIP / PK3 (.zip, .pk3).
    Zip,
    /// A filesystem directory.
    Folder,
}

impl ArchiveFormat {
    /// Every format, in detection order.
    pub const ALL: [ArchiveFormat; 6] = [
        Self::Zip,
        Self::Pak,
        Self::Grp,
        Self::Wad,
        Self::Lib,
        Self::Folder,
    ];

    /// Format id, as used by the format registry.
    pub fn id(&self) -> &'static str {
        self.codec().id()
    }

    /// Look up a format by registry id.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.id() == id)
    }

    /// Look up a format by file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "wad" => Some(Self::Wad),
            "pak" => Some(Self::Pak),
            "grp" => Some(Self::Grp),
            "lib" => Some(Self::Lib),
            "zip" | "pk3" => Some(Self::Zip),
            _ => None,
        }
    }

    /// Detect the format of container bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.codec().probe(data))
    }

    /// The codec for this format.
    pub fn codec(&self) -> &'static dyn Codec {
        match self {
            Self::Wad => &WAD,
            Self::Pak => &PAK,
            Self::Grp => &GRP,
            Self::Lib => &LIB,
            Self::Zip => &ZIP,
            Self::Folder => &FOLDER,
        }
    }

    /// Check if the format has real directories.
    pub fn supports_dirs(&self) -> bool {
        matches!(self, Self::Pak | Self::Zip | Self::Folder)
    }

    /// Check if namespaces are bracketed by marker entries.
    pub fn uses_marker_namespaces(&self) -> bool {
        matches!(self, Self::Wad)
    }

    /// Check if the format is backed by container bytes.
    pub fn is_byte_backed(&self) -> bool {
        !matches!(self, Self::Folder)
    }

    /// Get the typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wad => "wad",
            Self::Pak => "pak",
            Self::Grp => "grp",
            Self::Lib => "lib",
            Self::Zip => "zip",
            Self::Folder => "",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wad => write!(f, "WAD"),
            Self::Pak => write!(f, "PAK"),
            Self::Grp => write!(f, "GRP"),
            Self::Lib => write!(f, "LIB"),
            Self::Zip => write!(f, "ZIP"),
            Self::Folder => write!(f, "Folder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumpkit_core::{DirTree, Entry};

    fn encoded(format: ArchiveFormat) -> Vec<u8> {
        let mut tree = DirTree::new();
        tree.add_entry(tree.root(), Entry::with_data("LUMP", vec![1, 2, 3]), None)
            .unwrap();
        format.codec().encode(&tree).unwrap()
    }

    #[test]
    fn test_detect_each_format() {
        for format in [
            ArchiveFormat::Wad,
            ArchiveFormat::Pak,
            ArchiveFormat::Grp,
            ArchiveFormat::Lib,
            ArchiveFormat::Zip,
        ] {
            assert_eq!(ArchiveFormat::detect(&encoded(format)), Some(format));
        }
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(ArchiveFormat::detect(&[0x00, 0x00, 0x00, 0x00]), None);
        assert_eq!(ArchiveFormat::detect(b"plain text, not a container"), None);
    }

    #[test]
    fn test_ids() {
        for format in ArchiveFormat::ALL {
            assert_eq!(ArchiveFormat::from_id(format.id()), Some(format));
        }
        assert_eq!(ArchiveFormat::from_extension("PK3"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_extension(".wad"), Some(ArchiveFormat::Wad));
        assert_eq!(ArchiveFormat::Folder.id(), "folder");
    }

    #[test]
    fn test_format_properties() {
        assert!(ArchiveFormat::Zip.supports_dirs());
        assert!(!ArchiveFormat::Wad.supports_dirs());
        assert!(ArchiveFormat::Wad.uses_marker_namespaces());
        assert!(!ArchiveFormat::Folder.is_byte_backed());
        assert_eq!(ArchiveFormat::Grp.to_string(), "GRP");
    }
}
