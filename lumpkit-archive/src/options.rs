//! Archive behaviour options.

use crate::namespace::NamespacePolicy;
use serde::{Deserialize, Serialize};

/// Options controlling how an [`Archive`](crate::Archive) loads, saves and
/// journals changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Copy the previous file to `<name>.bak` before overwriting it.
    pub backup_on_save: bool,
    /// Keep entry payloads in memory after opening. When false, payloads are
    /// reloaded from the container bytes on demand.
    pub load_data: bool,
    /// Journal every mutation as its own undo level unless an explicit level
    /// is open.
    pub record_undo: bool,
    /// Open IWADs read-only.
    pub lock_iwads: bool,
    /// Marker namespace rules for flat lump archives.
    pub namespaces: NamespacePolicy,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            backup_on_save: true,
            load_data: true,
            record_undo: false,
            lock_iwads: true,
            namespaces: NamespacePolicy::default(),
        }
    }
}

impl ArchiveOptions {
    /// Options with undo recording turned on.
    pub fn with_undo() -> Self {
        Self {
            record_undo: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ArchiveOptions::default();
        assert!(options.backup_on_save);
        assert!(options.load_data);
        assert!(!options.record_undo);
        assert!(options.lock_iwads);
        assert!(ArchiveOptions::with_undo().record_undo);
    }

    #[test]
    fn test_partial_json() {
        let options: ArchiveOptions =
            serde_json::from_str(r#"{"backup_on_save": false, "record_undo": true}"#).unwrap();
        assert!(!options.backup_on_save);
        assert!(options.record_undo);
        assert!(options.load_data);
        assert!(options.lock_iwads);
        assert_eq!(options.namespaces, NamespacePolicy::default());
    }
}
