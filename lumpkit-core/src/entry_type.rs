//! Byte-level content type detection for entries.
//!
//! Detection only looks at signatures and the shape of the payload. Decoding
//! of images, palettes or maps is left to downstream consumers.

use crate::entry::Entry;

/// Number of leading bytes inspected when deciding whether data is text.
const TEXT_PROBE_LEN: usize = 4096;

/// Detected content type of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryType {
    /// Not yet detected, or no signature matched.
    #[default]
    Unknown,
    /// Zero-length entry (namespace or map marker).
    Marker,
    /// Synthetic entry standing for a directory.
    Folder,
    /// Plain text (ASCII or UTF-8).
    Text,
    /// PNG image.
    Png,
    /// RIFF WAVE audio.
    Wav,
    /// Standard MIDI file.
    Midi,
    /// DMX MUS music lump.
    Mus,
    /// Ogg container.
    Ogg,
    /// A nested container, identified by format id.
    Archive(&'static str),
}

impl EntryType {
    /// Detect the type of `data`.
    pub fn detect(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self::Marker;
        }

        if let Some(format) = Self::container_magic(data) {
            return Self::Archive(format);
        }

        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Self::Png;
        }

        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Self::Wav;
        }

        if data.starts_with(b"MThd") {
            return Self::Midi;
        }

        if data.starts_with(b"MUS\x1A") {
            return Self::Mus;
        }

        if data.starts_with(b"OggS") {
            return Self::Ogg;
        }

        if Self::looks_like_text(data) {
            return Self::Text;
        }

        Self::Unknown
    }

    /// Check whether an entry's payload fits this type.
    ///
    /// Used as the type-probe predicate when searching entries whose type has
    /// not been detected yet.
    pub fn probe(&self, entry: &Entry) -> bool {
        match self {
            Self::Folder => entry.entry_type() == Self::Folder,
            Self::Unknown => true,
            expected => Self::detect(entry.data()) == *expected,
        }
    }

    /// Human readable type name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Marker => "Marker",
            Self::Folder => "Folder",
            Self::Text => "Text",
            Self::Png => "PNG",
            Self::Wav => "WAV",
            Self::Midi => "MIDI",
            Self::Mus => "MUS",
            Self::Ogg => "Ogg",
            Self::Archive(_) => "Archive",
        }
    }

    /// Check if this is a nested container.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive(_))
    }

    fn container_magic(data: &[u8]) -> Option<&'static str> {
        if data.len() >= 12 && (data.starts_with(b"PWAD") || data.starts_with(b"IWAD")) {
            return Some("wad");
        }
        if data.len() >= 12 && data.starts_with(b"PACK") {
            return Some("pak");
        }
        if data.len() >= 16 && data.starts_with(b"KenSilverman") {
            return Some("grp");
        }
        if data.len() >= 4 && data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some("zip");
        }
        None
    }

    fn looks_like_text(data: &[u8]) -> bool {
        let probe = &data[..data.len().min(TEXT_PROBE_LEN)];
        let valid_utf8 = match std::str::from_utf8(probe) {
            Ok(_) => true,
            // A multi-byte sequence cut by the probe window is still text
            Err(e) => e.error_len().is_none(),
        };
        valid_utf8
            && probe
                .iter()
                .all(|&b| b >= 0x20 || matches!(b, b'\n' | b'\r' | b'\t' | 0x0C))
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archive(format) => write!(f, "Archive({})", format),
            _ => write!(f, "{}", self.name()),
        }
    }
}
