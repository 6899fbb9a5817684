//! Entry search.
//!
//! Names are matched as case-insensitive glob patterns (`*`, `?`, `[...]`).
//! Types match exactly, or through a content probe for entries whose type
//! is still unknown.

use crate::archive::Archive;
use crate::namespace::{MarkerNamespace, marker_namespaces, namespace_at};
use glob::{MatchOptions, Pattern};
use lumpkit_core::{DirId, Entry, EntryType};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// What to look for.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Name pattern.
    pub match_name: Option<String>,
    /// Entry type.
    pub match_type: Option<EntryType>,
    /// Namespace name.
    pub match_namespace: Option<String>,
    /// Directory to search (the root when `None`).
    pub dir: Option<DirId>,
    /// Match names without their extension.
    pub ignore_ext: bool,
    /// Descend into subdirectories.
    pub search_subdirs: bool,
}

impl SearchOptions {
    /// Match every entry of the root directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match names against a glob pattern.
    pub fn name(mut self, pattern: impl Into<String>) -> Self {
        self.match_name = Some(pattern.into());
        self
    }

    /// Match an entry type.
    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.match_type = Some(entry_type);
        self
    }

    /// Match a namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.match_namespace = Some(namespace.into());
        self
    }

    /// Search `dir` instead of the root.
    pub fn in_dir(mut self, dir: DirId) -> Self {
        self.dir = Some(dir);
        self
    }

    /// Match names without their extension.
    pub fn ignore_ext(mut self, ignore: bool) -> Self {
        self.ignore_ext = ignore;
        self
    }

    /// Descend into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.search_subdirs = recursive;
        self
    }
}

/// Search options compiled against one archive.
struct Matcher<'a> {
    archive: &'a Archive,
    options: &'a SearchOptions,
    pattern: Option<Pattern>,
    markers: Option<Vec<MarkerNamespace>>,
}

impl<'a> Matcher<'a> {
    fn new(archive: &'a Archive, options: &'a SearchOptions) -> Self {
        let pattern = options
            .match_name
            .as_deref()
            .and_then(|name| match Pattern::new(name) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    log::debug!("Invalid name pattern '{}': {}", name, e);
                    None
                }
            });

        let markers = (options.match_namespace.is_some()
            && archive.format().uses_marker_namespaces())
        .then(|| {
            let tree = archive.tree();
            marker_namespaces(tree.entries(tree.root()), &archive.options().namespaces)
        });

        Self {
            archive,
            options,
            pattern,
            markers,
        }
    }

    fn matches(&self, dir: DirId, index: usize, entry: &Entry) -> bool {
        self.name_matches(entry) && self.type_matches(entry) && self.namespace_matches(dir, index)
    }

    fn name_matches(&self, entry: &Entry) -> bool {
        let Some(wanted) = &self.options.match_name else {
            return true;
        };
        let name = if self.options.ignore_ext {
            entry.name_no_ext()
        } else {
            entry.name()
        };
        match &self.pattern {
            Some(pattern) => pattern.matches_with(name, MATCH_OPTIONS),
            None => name.eq_ignore_ascii_case(wanted),
        }
    }

    fn type_matches(&self, entry: &Entry) -> bool {
        let Some(wanted) = self.options.match_type else {
            return true;
        };
        if entry.entry_type() == wanted {
            return true;
        }
        if entry.entry_type() != EntryType::Unknown {
            return false;
        }
        if entry.is_loaded() {
            wanted.probe(entry)
        } else {
            EntryType::detect(&self.archive.peek_data(entry)) == wanted
        }
    }

    fn namespace_matches(&self, dir: DirId, index: usize) -> bool {
        let Some(wanted) = &self.options.match_namespace else {
            return true;
        };
        let tree = self.archive.tree();
        let found = match &self.markers {
            Some(markers) if dir == tree.root() => namespace_at(markers, index).to_string(),
            _ => self.archive.dir_namespace(dir),
        };
        found.eq_ignore_ascii_case(wanted)
    }
}

impl Archive {
    /// First matching entry: the directory's own entries in order, then its
    /// subdirectories.
    pub fn find_first(&self, options: &SearchOptions) -> Option<&Entry> {
        let matcher = Matcher::new(self, options);
        let dir = options.dir.unwrap_or(self.root());
        self.first_in(&matcher, dir)
    }

    /// Last matching entry: subdirectories in reverse first, then the
    /// directory's own entries from the end.
    ///
    /// This gives the closest preceding match when walking backwards.
    pub fn find_last(&self, options: &SearchOptions) -> Option<&Entry> {
        let matcher = Matcher::new(self, options);
        let dir = options.dir.unwrap_or(self.root());
        self.last_in(&matcher, dir)
    }

    /// Every matching entry: each directory's own entries, then its
    /// subdirectories.
    pub fn find_all(&self, options: &SearchOptions) -> Vec<&Entry> {
        let matcher = Matcher::new(self, options);
        let dir = options.dir.unwrap_or(self.root());
        let mut found = Vec::new();
        self.all_in(&matcher, dir, &mut found);
        found
    }

    fn first_in(&self, matcher: &Matcher<'_>, dir: DirId) -> Option<&Entry> {
        let tree = self.tree();
        let hit = tree
            .entries(dir)
            .iter()
            .enumerate()
            .find(|(index, entry)| matcher.matches(dir, *index, entry))
            .map(|(_, entry)| entry);
        if hit.is_some() || !matcher.options.search_subdirs {
            return hit;
        }
        tree.children(dir)
            .iter()
            .find_map(|&child| self.first_in(matcher, child))
    }

    fn last_in(&self, matcher: &Matcher<'_>, dir: DirId) -> Option<&Entry> {
        let tree = self.tree();
        if matcher.options.search_subdirs {
            let hit = tree
                .children(dir)
                .iter()
                .rev()
                .find_map(|&child| self.last_in(matcher, child));
            if hit.is_some() {
                return hit;
            }
        }
        tree.entries(dir)
            .iter()
            .enumerate()
            .rev()
            .find(|(index, entry)| matcher.matches(dir, *index, entry))
            .map(|(_, entry)| entry)
    }

    fn all_in<'a>(&'a self, matcher: &Matcher<'_>, dir: DirId, found: &mut Vec<&'a Entry>) {
        let tree = self.tree();
        found.extend(
            tree.entries(dir)
                .iter()
                .enumerate()
                .filter(|(index, entry)| matcher.matches(dir, *index, entry))
                .map(|(_, entry)| entry),
        );
        if matcher.options.search_subdirs {
            for &child in tree.children(dir) {
                self.all_in(matcher, child, found);
            }
        }
    }
}
