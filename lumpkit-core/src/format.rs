//! Archive format descriptors.
//!
//! A [`FormatDescriptor`] holds the static metadata of one container format:
//! naming constraints, directory support and file extensions. The
//! [`FormatRegistry`] is loaded once (from JSON or the built-in table) and
//! shared by archives.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Id of the synthetic format standing for a filesystem directory.
pub const FOLDER_FORMAT: &str = "folder";

/// One file extension of a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDesc {
    /// Extension without the dot.
    pub ext: String,
    /// Description shown in file filters.
    pub description: String,
}

impl ExtensionDesc {
    /// Create an extension description.
    pub fn new(ext: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            ext: ext.into(),
            description: description.into(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Static metadata of an archive format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Format id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the format has real directories.
    #[serde(default)]
    pub supports_dirs: bool,
    /// Whether entry names carry extensions.
    #[serde(default = "default_true")]
    pub names_extensions: bool,
    /// Maximum entry name length, if limited.
    #[serde(default)]
    pub max_name_length: Option<usize>,
    /// Entry data format id for entries of this archive type.
    #[serde(default)]
    pub entry_format: String,
    /// Whether entry names are conventionally uppercase.
    #[serde(default)]
    pub prefer_uppercase: bool,
    /// File extensions.
    #[serde(default)]
    pub extensions: Vec<ExtensionDesc>,
}

impl FormatDescriptor {
    /// Create a descriptor with default properties.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supports_dirs: false,
            names_extensions: true,
            max_name_length: None,
            entry_format: String::new(),
            prefer_uppercase: false,
            extensions: Vec::new(),
        }
    }

    /// Descriptor of the synthetic folder format.
    pub fn folder() -> Self {
        Self {
            supports_dirs: true,
            ..Self::new(FOLDER_FORMAT, "Folder")
        }
    }

    /// Descriptor used when a format id is not registered.
    pub fn unknown() -> Self {
        Self::new("unknown", "Unknown")
    }

    /// Apply this format's naming rules to `name`.
    pub fn format_name(&self, name: &str) -> String {
        let mut name = name;
        if !self.names_extensions {
            if let Some(pos) = name.rfind('.').filter(|&pos| pos > 0) {
                name = &name[..pos];
            }
        }

        let mut formatted: String = match self.max_name_length {
            Some(max) => name.chars().take(max).collect(),
            None => name.to_string(),
        };
        if self.prefer_uppercase {
            formatted = formatted.to_uppercase();
        }
        formatted
    }

    /// Check if `ext` is one of this format's extensions, ignoring case.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.extensions
            .iter()
            .any(|desc| desc.ext.eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    archive_formats: Vec<FormatDescriptor>,
}

/// Load-once table of format descriptors.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
    unknown: FormatDescriptor,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatRegistry {
    fn from_descriptors(descriptors: Vec<FormatDescriptor>) -> Self {
        let mut formats: Vec<FormatDescriptor> = descriptors
            .into_iter()
            .filter(|desc| desc.id != FOLDER_FORMAT)
            .collect();
        formats.push(FormatDescriptor::folder());
        Self {
            formats,
            unknown: FormatDescriptor::unknown(),
        }
    }

    /// Parse a registry from JSON holding an `archive_formats` array.
    ///
    /// The folder format is always appended.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;
        for desc in &file.archive_formats {
            log::debug!(
                "Read archive format {}: \"{}\" (dirs: {}, extensions: {}, max name: {:?})",
                desc.id,
                desc.name,
                desc.supports_dirs,
                desc.names_extensions,
                desc.max_name_length
            );
        }
        Ok(Self::from_descriptors(file.archive_formats))
    }

    /// Load a registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize the registry (without the folder format) as JSON.
    pub fn to_json(&self) -> Result<String> {
        let file = RegistryFile {
            archive_formats: self
                .formats
                .iter()
                .filter(|desc| desc.id != FOLDER_FORMAT)
                .cloned()
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Registry with every format implemented in this workspace.
    pub fn builtin() -> Self {
        let single = |id: &str, name: &str| vec![ExtensionDesc::new(id, name)];
        Self::from_descriptors(vec![
            FormatDescriptor {
                names_extensions: false,
                max_name_length: Some(8),
                entry_format: "wad".to_string(),
                prefer_uppercase: true,
                extensions: single("wad", "Doom Wad"),
                ..FormatDescriptor::new("wad", "Doom Wad")
            },
            FormatDescriptor {
                supports_dirs: true,
                extensions: single("pak", "Quake Pak"),
                ..FormatDescriptor::new("pak", "Quake Pak")
            },
            FormatDescriptor {
                max_name_length: Some(12),
                prefer_uppercase: true,
                extensions: single("grp", "Build Grp"),
                ..FormatDescriptor::new("grp", "Build Grp")
            },
            FormatDescriptor {
                max_name_length: Some(12),
                prefer_uppercase: true,
                extensions: single("lib", "Shadowcaster Lib"),
                ..FormatDescriptor::new("lib", "Shadowcaster Lib")
            },
            FormatDescriptor {
                supports_dirs: true,
                extensions: vec![
                    ExtensionDesc::new("zip", "Zip"),
                    ExtensionDesc::new("pk3", "Pk3"),
                ],
                ..FormatDescriptor::new("zip", "Zip")
            },
        ])
    }

    /// Look up a format by id.
    pub fn get(&self, id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|desc| desc.id == id)
    }

    /// Look up a format by id, falling back to the unknown descriptor.
    pub fn descriptor(&self, id: &str) -> &FormatDescriptor {
        self.get(id).unwrap_or(&self.unknown)
    }

    /// First format using file extension `ext`.
    pub fn by_extension(&self, ext: &str) -> Option<&FormatDescriptor> {
        let ext = ext.trim_start_matches('.');
        self.formats.iter().find(|desc| desc.has_extension(ext))
    }

    /// File dialog filter string for a format.
    ///
    /// Formats with several extensions get an "Any X File" filter covering
    /// all of them followed by one filter per extension.
    pub fn file_filter(&self, id: &str) -> String {
        let desc = self.descriptor(id);
        let patterns = |ext: &str| {
            format!(
                "*.{};*.{};*.{}",
                ext.to_lowercase(),
                ext.to_uppercase(),
                capitalize(ext)
            )
        };

        match desc.extensions.as_slice() {
            [] => "Any File|*.*".to_string(),
            [single] => format!(
                "{} File (*.{})|{}",
                single.description,
                single.ext,
                patterns(&single.ext)
            ),
            many => {
                let all: Vec<String> = many.iter().map(|e| patterns(&e.ext)).collect();
                let mut filter = format!("Any {} File|{}", desc.name, all.join(";"));
                for (ext, pattern) in many.iter().zip(&all) {
                    filter.push_str(&format!(
                        "|{} File (*.{})|{}",
                        ext.description, ext.ext, pattern
                    ));
                }
                filter
            }
        }
    }

    /// Iterate over all descriptors, folder last.
    pub fn iter(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.iter()
    }

    /// Number of registered formats, including folder.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Check if no formats are registered (never true; folder is built in).
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_matches_builtin() {
        let json = include_str!("../resources/archive_formats.json");
        let loaded = FormatRegistry::from_json(json).unwrap();
        let builtin = FormatRegistry::builtin();
        assert_eq!(
            loaded.iter().collect::<Vec<_>>(),
            builtin.iter().collect::<Vec<_>>()
        );
        assert_eq!(loaded.iter().last().unwrap().id, FOLDER_FORMAT);
    }

    #[test]
    fn test_format_name() {
        let registry = FormatRegistry::builtin();
        let wad = registry.descriptor("wad");
        assert_eq!(wad.format_name("texture1.txt"), "TEXTURE1");
        assert_eq!(wad.format_name("longlumpname"), "LONGLUMP");

        let zip = registry.descriptor("zip");
        assert_eq!(zip.format_name("Decorate.txt"), "Decorate.txt");
    }

    #[test]
    fn test_lookup() {
        let registry = FormatRegistry::builtin();
        assert_eq!(registry.by_extension("PK3").unwrap().id, "zip");
        assert_eq!(registry.by_extension(".wad").unwrap().id, "wad");
        assert!(registry.get("rff").is_none());
        assert_eq!(registry.descriptor("rff").id, "unknown");
        assert!(registry.get(FOLDER_FORMAT).unwrap().supports_dirs);
    }

    #[test]
    fn test_file_filter() {
        let registry = FormatRegistry::builtin();
        assert_eq!(
            registry.file_filter("wad"),
            "Doom Wad File (*.wad)|*.wad;*.WAD;*.Wad"
        );
        assert_eq!(
            registry.file_filter("zip"),
            "Any Zip File|*.zip;*.ZIP;*.Zip;*.pk3;*.PK3;*.Pk3\
             |Zip File (*.zip)|*.zip;*.ZIP;*.Zip\
             |Pk3 File (*.pk3)|*.pk3;*.PK3;*.Pk3"
        );
        assert_eq!(registry.file_filter(FOLDER_FORMAT), "Any File|*.*");
    }

    #[test]
    fn test_json_defaults() {
        let registry =
            FormatRegistry::from_json(r#"{"archive_formats":[{"id":"rff","name":"Blood Rff"}]}"#)
                .unwrap();
        let rff = registry.get("rff").unwrap();
        assert!(rff.names_extensions);
        assert!(!rff.supports_dirs);
        assert_eq!(registry.len(), 2);

        assert!(FormatRegistry::from_json("{").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formats.json");
        std::fs::write(&path, FormatRegistry::builtin().to_json().unwrap()).unwrap();
        let loaded = FormatRegistry::load(&path).unwrap();
        assert_eq!(loaded.len(), FormatRegistry::builtin().len());
    }
}
