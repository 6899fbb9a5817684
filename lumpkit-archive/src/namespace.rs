//! Namespace detection.
//!
//! Archives with real directories derive an entry's namespace from the first
//! directory below the root. Flat lump archives instead bracket namespaces
//! with marker entries (`S_START` ... `S_END`); [`marker_namespaces`] pairs
//! those markers up according to a [`NamespacePolicy`].

use lumpkit_core::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Namespace of entries that belong to no other namespace.
pub const GLOBAL_NAMESPACE: &str = "global";

/// Table-driven rules for naming marker namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespacePolicy {
    /// Marker prefix (lowercase, after collapsing) to namespace name.
    pub aliases: BTreeMap<String, String>,
    /// Single-letter prefixes whose doubled form means the same namespace
    /// (`PP_START` opens the same namespace as `P_START`).
    pub collapse_doubled: Vec<String>,
    /// Open the flat namespace at the first entry when an `F_END` has no
    /// matching start marker.
    pub flat_hack: bool,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        let aliases = [
            ("p", "patches"),
            ("s", "sprites"),
            ("f", "flats"),
            ("tx", "textures"),
            ("hi", "hires"),
            ("c", "colormaps"),
            ("a", "acs"),
            ("v", "voices"),
            ("vx", "voxels"),
        ]
        .into_iter()
        .map(|(prefix, name)| (prefix.to_string(), name.to_string()))
        .collect();

        Self {
            aliases,
            collapse_doubled: vec!["p".to_string(), "f".to_string(), "s".to_string()],
            flat_hack: true,
        }
    }
}

impl NamespacePolicy {
    /// Canonical lowercase prefix of a marker (`PP` becomes `p`).
    pub fn canonical_prefix(&self, prefix: &str) -> String {
        let lower = prefix.to_lowercase();
        let mut chars = lower.chars();
        if let (Some(a), Some(b), None) = (chars.next(), chars.next(), chars.next()) {
            let single = a.to_string();
            if a == b && self.collapse_doubled.contains(&single) {
                return single;
            }
        }
        lower
    }

    /// Namespace name for a canonical prefix.
    pub fn namespace_name(&self, canonical: &str) -> String {
        self.aliases
            .get(canonical)
            .cloned()
            .unwrap_or_else(|| canonical.to_string())
    }

    /// Namespace name for a raw marker prefix.
    pub fn resolve(&self, prefix: &str) -> String {
        self.namespace_name(&self.canonical_prefix(prefix))
    }
}

/// A namespace bracketed by marker entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerNamespace {
    /// Namespace name.
    pub name: String,
    /// Index of the start marker; `None` when the namespace opens at the
    /// first entry (flat hack).
    pub start: Option<usize>,
    /// Index of the end marker.
    pub end: usize,
}

impl MarkerNamespace {
    /// Check if the entry at `index` lies strictly between the markers.
    pub fn contains(&self, index: usize) -> bool {
        self.start.is_none_or(|start| index > start) && index < self.end
    }
}

/// Pair up the start and end markers of a flat entry list.
///
/// An end marker closes the most recent open namespace with the same
/// canonical prefix. Start markers that are never closed are dropped, as are
/// end markers with nothing to close (except the flat hack).
pub fn marker_namespaces(entries: &[Entry], policy: &NamespacePolicy) -> Vec<MarkerNamespace> {
    let mut open: Vec<(String, usize)> = Vec::new();
    let mut found = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let name = entry.upper_name();
        if let Some(prefix) = name.strip_suffix("_START").filter(|p| !p.is_empty()) {
            open.push((policy.canonical_prefix(prefix), index));
        } else if let Some(prefix) = name.strip_suffix("_END").filter(|p| !p.is_empty()) {
            let canonical = policy.canonical_prefix(prefix);
            if let Some(pos) = open.iter().rposition(|(p, _)| *p == canonical) {
                let (prefix, start) = open.remove(pos);
                found.push(MarkerNamespace {
                    name: policy.namespace_name(&prefix),
                    start: Some(start),
                    end: index,
                });
            } else if policy.flat_hack
                && canonical == "f"
                && !found.iter().any(|ns: &MarkerNamespace| ns.start.is_none())
            {
                log::debug!("{} without start marker, flats begin at the first entry", name);
                found.push(MarkerNamespace {
                    name: policy.namespace_name(&canonical),
                    start: None,
                    end: index,
                });
            } else {
                log::warn!("End marker {} at index {} has no start marker", name, index);
            }
        }
    }

    for (prefix, start) in open {
        log::warn!(
            "Namespace {} opened at index {} has no end marker, ignoring it",
            prefix,
            start
        );
    }

    found.sort_by_key(|ns| (ns.start, ns.end));
    found
}

/// Namespace of the entry at `index`.
///
/// When namespaces nest, the innermost one wins.
pub fn namespace_at(namespaces: &[MarkerNamespace], index: usize) -> &str {
    namespaces
        .iter()
        .filter(|ns| ns.contains(index))
        .min_by_key(|ns| ns.end - ns.start.unwrap_or(0))
        .map_or(GLOBAL_NAMESPACE, |ns| ns.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lumps(names: &[&str]) -> Vec<Entry> {
        names.iter().map(|name| Entry::new(*name)).collect()
    }

    #[test]
    fn test_canonical_prefix() {
        let policy = NamespacePolicy::default();
        assert_eq!(policy.resolve("PP"), "patches");
        assert_eq!(policy.resolve("S"), "sprites");
        assert_eq!(policy.resolve("TX"), "textures");
        assert_eq!(policy.resolve("VX"), "voxels");
        // Doubled letters outside the table are kept
        assert_eq!(policy.resolve("CC"), "cc");
        assert_eq!(policy.resolve("DEHACKED"), "dehacked");
    }

    #[test]
    fn test_pairs_markers() {
        let entries = lumps(&[
            "PLAYPAL", "S_START", "TROOA1", "S_END", "PP_START", "WALL00", "P_END",
        ]);
        let namespaces = marker_namespaces(&entries, &NamespacePolicy::default());
        assert_eq!(namespaces.len(), 2);

        assert_eq!(namespace_at(&namespaces, 0), "global");
        assert_eq!(namespace_at(&namespaces, 1), "global");
        assert_eq!(namespace_at(&namespaces, 2), "sprites");
        assert_eq!(namespace_at(&namespaces, 3), "global");
        assert_eq!(namespace_at(&namespaces, 5), "patches");
    }

    #[test]
    fn test_unmatched_start_dropped() {
        let entries = lumps(&["S_START", "TROOA1", "F_START", "FLOOR0", "F_END"]);
        let namespaces = marker_namespaces(&entries, &NamespacePolicy::default());
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespace_at(&namespaces, 1), "global");
        assert_eq!(namespace_at(&namespaces, 3), "flats");
    }

    #[test]
    fn test_flat_hack() {
        let entries = lumps(&["FLOOR0", "FLOOR1", "FF_END", "OTHER"]);
        let policy = NamespacePolicy::default();
        let namespaces = marker_namespaces(&entries, &policy);
        assert_eq!(namespace_at(&namespaces, 0), "flats");
        assert_eq!(namespace_at(&namespaces, 1), "flats");
        assert_eq!(namespace_at(&namespaces, 3), "global");

        let strict = NamespacePolicy {
            flat_hack: false,
            ..NamespacePolicy::default()
        };
        assert!(marker_namespaces(&entries, &strict).is_empty());
    }

    #[test]
    fn test_nested_innermost_wins() {
        let entries = lumps(&["S_START", "SS_START", "A", "SS_END", "B", "S_END"]);
        let namespaces = marker_namespaces(&entries, &NamespacePolicy::default());
        // SS_END closes the most recent open sprite namespace
        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespace_at(&namespaces, 2), "sprites");
        assert_eq!(namespace_at(&namespaces, 4), "sprites");
    }

    #[test]
    fn test_policy_from_json() {
        let policy: NamespacePolicy =
            serde_json::from_str(r#"{"aliases":{"zz":"zombies"},"flat_hack":false}"#).unwrap();
        assert_eq!(policy.resolve("ZZ"), "zombies");
        assert!(policy.collapse_doubled.contains(&"p".to_string()));
        assert!(!policy.flat_hack);
    }
}
