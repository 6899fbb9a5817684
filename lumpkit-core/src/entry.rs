//! Archive entries.
//!
//! An [`Entry`] is a named binary payload inside an archive directory. It
//! carries its modification state, an advisory lock, the detected content
//! type and a non-owning reference to the directory that holds it.

use crate::entry_type::EntryType;
use crate::error::Result;
use crate::format::FormatDescriptor;
use crate::tree::DirId;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique entry identifier.
///
/// Ids are never shared between two live entries, so an id also tells which
/// archive an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Modification state of an entry relative to the container on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EntryState {
    /// Identical to the last opened or saved container.
    #[default]
    Unmodified,
    /// Changed since the last open or save.
    Modified,
    /// Not present in the last opened or saved container.
    New,
}

/// Compression of an entry payload inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (stored).
    #[default]
    Stored,
    /// DEFLATE compression (ZIP).
    Deflate,
    /// Unknown/unsupported method.
    Unknown(u16),
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            Self::Deflate => write!(f, "Deflate"),
            Self::Unknown(id) => write!(f, "Unknown({})", id),
        }
    }
}

/// Location of an entry payload inside the backing container bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSource {
    /// Offset of the stored payload.
    pub offset: u64,
    /// Stored (possibly compressed) length.
    pub stored_size: u64,
    /// Uncompressed length.
    pub size: u64,
    /// Compression of the stored payload.
    pub method: CompressionMethod,
    /// CRC-32 of the uncompressed payload, when the container records one.
    pub crc32: Option<u32>,
}

impl DataSource {
    /// An uncompressed payload at `offset`.
    pub fn stored(offset: u64, size: u64) -> Self {
        Self {
            offset,
            stored_size: size,
            size,
            method: CompressionMethod::Stored,
            crc32: None,
        }
    }
}

/// Cooperative advisory lock on an entry.
///
/// The lock is a shared counter rather than a mutex: it marks an entry as
/// logically in use (for example as the backing of an open embedded archive)
/// and is checked before structural mutations. Handles obtained through
/// [`Entry::lock_handle`] refer to the same counter.
#[derive(Debug, Default)]
pub struct EntryLock(Arc<AtomicUsize>);

impl EntryLock {
    /// Take the lock.
    pub fn acquire(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one hold on the lock.
    pub fn release(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Check if any hold is active.
    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }

    /// Another handle to the same lock.
    pub fn share(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// An entry in an archive.
#[derive(Debug)]
pub struct Entry {
    id: EntryId,
    name: String,
    data: Option<Vec<u8>>,
    size: u64,
    entry_type: EntryType,
    state: EntryState,
    lock: EntryLock,
    parent: Option<DirId>,
    source: Option<DataSource>,
}

impl Entry {
    /// Create a new empty entry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Vec::new())
    }

    /// Create a new entry holding `data`.
    pub fn with_data(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: EntryId::next(),
            name: name.into(),
            size: data.len() as u64,
            data: Some(data),
            entry_type: EntryType::Unknown,
            state: EntryState::New,
            lock: EntryLock::default(),
            parent: None,
            source: None,
        }
    }

    /// Create the synthetic entry representing a directory.
    pub fn folder(name: impl Into<String>) -> Self {
        let mut entry = Self::new(name);
        entry.entry_type = EntryType::Folder;
        entry
    }

    /// Create an entry decoded from a container, stamped Unmodified.
    pub fn from_container(name: impl Into<String>, data: Vec<u8>, source: DataSource) -> Self {
        let mut entry = Self::with_data(name, data);
        entry.state = EntryState::Unmodified;
        entry.source = Some(source);
        entry
    }

    /// Entry id.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Give this entry a fresh id.
    pub(crate) fn refresh_id(&mut self) {
        self.id = EntryId::next();
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the entry name without any format rules applied.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Uppercase name.
    pub fn upper_name(&self) -> String {
        self.name.to_uppercase()
    }

    /// Name without its extension.
    pub fn name_no_ext(&self) -> &str {
        match self.name.rfind('.') {
            Some(pos) if pos > 0 => &self.name[..pos],
            _ => &self.name,
        }
    }

    /// Uppercase name without its extension.
    pub fn upper_name_no_ext(&self) -> String {
        self.name_no_ext().to_uppercase()
    }

    /// Extension (without the dot), if any.
    pub fn extension(&self) -> Option<&str> {
        match self.name.rfind('.') {
            Some(pos) if pos > 0 => Some(&self.name[pos + 1..]),
            _ => None,
        }
    }

    /// Payload bytes. Empty when the data is not loaded.
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Check if the payload is in memory.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Payload size, known even when the data is not loaded.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Replace the payload. The entry becomes Modified unless it is New.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.data = Some(data);
        self.set_state(EntryState::Modified);
    }

    /// Replace the payload with the contents of a file.
    pub fn import_file(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        self.set_data(data);
        Ok(())
    }

    /// Put payload bytes loaded from the backing container.
    pub fn set_loaded_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.data = Some(data);
    }

    /// Drop the in-memory payload if it can be reloaded from the container.
    ///
    /// Returns whether the payload was dropped.
    pub fn unload_data(&mut self) -> bool {
        if self.source.is_some() && self.state == EntryState::Unmodified {
            self.data = None;
            true
        } else {
            false
        }
    }

    /// Where the payload lives in the backing container.
    pub fn source(&self) -> Option<&DataSource> {
        self.source.as_ref()
    }

    /// Record where the payload lives in the backing container.
    pub fn set_source(&mut self, source: Option<DataSource>) {
        self.source = source;
    }

    /// Modification state.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Update the modification state.
    ///
    /// Unmodified always applies; otherwise the state only moves up
    /// (a New entry stays New when modified).
    pub fn set_state(&mut self, state: EntryState) {
        if state == EntryState::Unmodified || state > self.state {
            self.state = state;
        }
    }

    /// Set the modification state unconditionally.
    pub fn force_state(&mut self, state: EntryState) {
        self.state = state;
    }

    /// Detected content type.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Set the content type.
    pub fn set_entry_type(&mut self, entry_type: EntryType) {
        self.entry_type = entry_type;
    }

    /// Run content detection on the loaded payload.
    pub fn detect_type(&mut self) -> EntryType {
        if self.entry_type != EntryType::Folder && self.is_loaded() {
            self.entry_type = EntryType::detect(self.data());
        }
        self.entry_type
    }

    /// Lock the entry.
    pub fn lock(&self) {
        self.lock.acquire();
    }

    /// Release one hold on the entry lock.
    pub fn unlock(&self) {
        self.lock.release();
    }

    /// Check if the entry is locked.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// A handle to this entry's lock that outlives borrows of the entry.
    pub fn lock_handle(&self) -> EntryLock {
        self.lock.share()
    }

    /// Directory holding this entry.
    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<DirId>) {
        self.parent = parent;
    }

    /// Apply a format's naming rules to the entry name.
    ///
    /// Drops the extension when the format's names carry none, truncates to
    /// the maximum length and uppercases when the format prefers it.
    pub fn format_name(&mut self, format: &FormatDescriptor) {
        self.name = format.format_name(&self.name);
    }

    /// Copy of this entry with a fresh id, detached and unlocked.
    pub fn deep_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.refresh_id();
        copy.parent = None;
        copy
    }
}

impl Clone for Entry {
    /// Snapshot of the entry. The id is kept, the lock is not shared.
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            data: self.data.clone(),
            size: self.size,
            entry_type: self.entry_type,
            state: self.state,
            lock: EntryLock::default(),
            parent: self.parent,
            source: self.source,
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state_char = match self.state {
            EntryState::Unmodified => ' ',
            EntryState::Modified => '*',
            EntryState::New => '+',
        };
        write!(
            f,
            "{}{:>10} {:<10} {}",
            state_char, self.size, self.entry_type, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_names() {
        let entry = Entry::new("textures.txt");
        assert_eq!(entry.name_no_ext(), "textures");
        assert_eq!(entry.upper_name_no_ext(), "TEXTURES");
        assert_eq!(entry.extension(), Some("txt"));

        let dotfile = Entry::new(".hidden");
        assert_eq!(dotfile.name_no_ext(), ".hidden");
        assert_eq!(dotfile.extension(), None);
    }

    #[test]
    fn test_state_transitions() {
        let mut entry = Entry::from_container("MAP01", vec![], DataSource::stored(12, 0));
        assert_eq!(entry.state(), EntryState::Unmodified);

        entry.set_data(vec![1, 2, 3]);
        assert_eq!(entry.state(), EntryState::Modified);
        assert_eq!(entry.size(), 3);

        let mut fresh = Entry::new("NEW");
        fresh.set_data(vec![9]);
        assert_eq!(fresh.state(), EntryState::New);

        fresh.set_state(EntryState::Unmodified);
        assert_eq!(fresh.state(), EntryState::Unmodified);
    }

    #[test]
    fn test_lock_is_shared_by_handles() {
        let entry = Entry::new("GRP");
        let handle = entry.lock_handle();
        handle.acquire();
        assert!(entry.is_locked());

        handle.release();
        assert!(!entry.is_locked());

        // Releasing more than acquired never underflows
        handle.release();
        assert!(!entry.is_locked());
    }

    #[test]
    fn test_clone_and_deep_copy() {
        let entry = Entry::with_data("DEMO1", vec![4, 5]);
        entry.lock();

        let snapshot = entry.clone();
        assert_eq!(snapshot.id(), entry.id());
        assert!(!snapshot.is_locked());

        let copy = entry.deep_copy();
        assert_ne!(copy.id(), entry.id());
        assert_eq!(copy.data(), entry.data());
    }

    #[test]
    fn test_unload_requires_source() {
        let mut decoded = Entry::from_container("A", vec![1], DataSource::stored(0, 1));
        assert!(decoded.unload_data());
        assert!(!decoded.is_loaded());
        assert_eq!(decoded.size(), 1);
        assert!(decoded.data().is_empty());

        let mut fresh = Entry::with_data("B", vec![1]);
        assert!(!fresh.unload_data());
        assert!(fresh.is_loaded());
    }
}
