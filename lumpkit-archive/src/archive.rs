//! The editable archive.
//!
//! An [`Archive`] owns one [`DirTree`] and the container bytes it was read
//! from. Every mutation goes through a single guard that rejects closed and
//! read-only archives, foreign entries and locked entries before anything
//! changes, then announces events, flags the archive modified and, when a
//! level is open, journals an [`UndoStep`].
//!
//! Failures are returned as [`ArchiveError`]s; the message of the most
//! recent one is also kept in [`Archive::last_error`].

use crate::detect::ArchiveFormat;
use crate::folder;
use crate::namespace::{GLOBAL_NAMESPACE, marker_namespaces};
use crate::options::ArchiveOptions;
use crate::undo::{UndoManager, UndoStep};
use crate::wad;
use lumpkit_core::{
    Announcer, ArchiveError, ArchiveEvent, ArchiveListener, DirId, DirTree, Entry, EntryId,
    EntryLoc, EntryLock, EntryState, FormatDescriptor, FormatRegistry, ListenerId, Result,
};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

/// Link from an embedded archive to the entry holding its bytes.
#[derive(Debug)]
struct ParentLink {
    archive: Weak<Mutex<Archive>>,
    entry: EntryId,
    lock: EntryLock,
    display: String,
}

/// An archive of entries and directories in one container format.
#[derive(Debug)]
pub struct Archive {
    format: ArchiveFormat,
    registry: Arc<FormatRegistry>,
    options: ArchiveOptions,
    tree: DirTree,
    filename: Option<PathBuf>,
    backing: Option<Arc<[u8]>>,
    parent: Option<ParentLink>,
    on_disk: bool,
    read_only: bool,
    modified: bool,
    closed: bool,
    announcer: Announcer,
    undo: UndoManager,
    last_error: Option<String>,
}

impl Archive {
    /// Create an empty archive using the built-in format registry.
    pub fn new(format: ArchiveFormat) -> Self {
        Self::with_registry(format, Arc::new(FormatRegistry::builtin()))
    }

    /// Create an empty archive using `registry` for naming rules.
    pub fn with_registry(format: ArchiveFormat, registry: Arc<FormatRegistry>) -> Self {
        Self::with_options(format, registry, ArchiveOptions::default())
    }

    /// Create an empty archive with explicit options.
    pub fn with_options(
        format: ArchiveFormat,
        registry: Arc<FormatRegistry>,
        options: ArchiveOptions,
    ) -> Self {
        let undo = UndoManager::new(options.record_undo);
        Self {
            format,
            registry,
            options,
            tree: DirTree::new(),
            filename: None,
            backing: None,
            parent: None,
            on_disk: false,
            read_only: false,
            modified: false,
            closed: false,
            announcer: Announcer::new(),
            undo,
            last_error: None,
        }
    }

    /// Detect the format of `data` and open it.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let format = ArchiveFormat::detect(data)
            .ok_or_else(|| ArchiveError::invalid_header("unrecognized archive format"))?;
        let mut archive = Self::new(format);
        archive.open_bytes(data)?;
        Ok(archive)
    }

    /// Open a file or directory, detecting its format.
    ///
    /// Directories open as folder archives. Files are identified by content,
    /// falling back to the extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        if path.is_dir() {
            let mut archive = Self::new(ArchiveFormat::Folder);
            archive.open_file(path)?;
            return Ok(archive);
        }

        let data = fs::read(path)?;
        let format = ArchiveFormat::detect(&data)
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ArchiveFormat::from_extension(&ext.to_string_lossy()))
            })
            .ok_or_else(|| ArchiveError::invalid_header("unrecognized archive format"))?;
        let mut archive = Self::new(format);
        archive.open_data(Arc::from(data))?;
        archive.filename = Some(path.to_path_buf());
        archive.on_disk = true;
        Ok(archive)
    }

    /// Open an entry of `parent` as an embedded archive, detecting its format.
    pub fn from_entry(parent: &Arc<Mutex<Archive>>, id: EntryId) -> Result<Self> {
        let (format, registry) = {
            let mut guard = lock_parent(parent)?;
            let registry = Arc::clone(&guard.registry);
            let format = ArchiveFormat::detect(guard.entry_data(id)?)
                .ok_or_else(|| ArchiveError::invalid_header("unrecognized archive format"))?;
            (format, registry)
        };
        let mut archive = Self::with_registry(format, registry);
        archive.open_entry(parent, id)?;
        Ok(archive)
    }

    // ---------------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------------

    /// The container format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Registry descriptor of the container format.
    pub fn format_desc(&self) -> &FormatDescriptor {
        self.registry.descriptor(self.format.id())
    }

    /// The format registry in use.
    pub fn registry(&self) -> &Arc<FormatRegistry> {
        &self.registry
    }

    /// Archive options.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Replace the archive options.
    pub fn set_options(&mut self, options: ArchiveOptions) {
        self.undo.set_auto_levels(options.record_undo);
        self.options = options;
    }

    /// The directory tree.
    pub fn tree(&self) -> &DirTree {
        &self.tree
    }

    /// Display name of the archive.
    ///
    /// Embedded archives are named `parent/entry`. With `full`, on-disk
    /// archives give their whole path, otherwise only the file name.
    pub fn filename(&self, full: bool) -> String {
        if let Some(link) = &self.parent {
            return if full {
                link.display.clone()
            } else {
                link.display.rsplit('/').next().unwrap_or_default().to_string()
            };
        }
        match &self.filename {
            Some(path) if full => path.display().to_string(),
            Some(path) => match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => path.display().to_string(),
            },
            None => "UNSAVED".to_string(),
        }
    }

    /// Path of the file this archive was opened from or saved to.
    pub fn path(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Check if the archive has unsaved changes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Check if the archive exists as a file on disk.
    pub fn is_on_disk(&self) -> bool {
        self.on_disk
    }

    /// Check if this is a WAD flagged as an IWAD.
    pub fn is_iwad(&self) -> bool {
        self.format == ArchiveFormat::Wad && wad::is_iwad(&self.tree)
    }

    /// Check if mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Reject (or allow again) every mutation.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Check if the archive can still be used.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Check if the archive was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Entry holding this archive's bytes, for embedded archives.
    pub fn parent_entry(&self) -> Option<EntryId> {
        self.parent.as_ref().map(|link| link.entry)
    }

    /// Message of the most recent failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Register a change listener.
    pub fn subscribe(&mut self, listener: impl ArchiveListener + 'static) -> ListenerId {
        self.announcer.subscribe(listener)
    }

    /// Remove a change listener.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.announcer.unsubscribe(id)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Decode container bytes into this archive.
    ///
    /// On failure the archive keeps its previous contents.
    pub fn open_bytes(&mut self, data: &[u8]) -> Result<()> {
        let result = self.open_data(Arc::from(data));
        self.track(result)
    }

    /// Read a file (or, for folder archives, a directory) into this archive.
    ///
    /// On failure the archive keeps its previous contents and filename.
    pub fn open_file(&mut self, path: &Path) -> Result<()> {
        let result = self.open_file_inner(path);
        self.track(result)
    }

    fn open_file_inner(&mut self, path: &Path) -> Result<()> {
        self.check_open()?;
        if self.format.is_byte_backed() {
            let data = fs::read(path)?;
            self.open_data(Arc::from(data))?;
        } else {
            let tree = folder::import_dir(path)?;
            self.install(tree, None);
        }
        self.filename = Some(path.to_path_buf());
        self.on_disk = true;
        log::info!("Opened {}", path.display());
        Ok(())
    }

    /// Open the data of entry `id` in `parent` as this archive.
    ///
    /// The entry stays locked until this archive is closed or dropped, so the
    /// parent can't remove, rename, move or swap it meanwhile.
    pub fn open_entry(&mut self, parent: &Arc<Mutex<Archive>>, id: EntryId) -> Result<()> {
        let result = self.open_entry_inner(parent, id);
        self.track(result)
    }

    fn open_entry_inner(&mut self, parent: &Arc<Mutex<Archive>>, id: EntryId) -> Result<()> {
        self.check_open()?;
        let (data, lock, display) = {
            let mut guard = lock_parent(parent)?;
            let data = guard.entry_data(id)?.to_vec();
            let entry = guard
                .tree
                .entry(id)
                .ok_or(ArchiveError::ForeignEntry)?;
            let display = format!("{}/{}", guard.filename(false), entry.name());
            (data, entry.lock_handle(), display)
        };

        self.open_data(Arc::from(data))?;
        self.release_parent();
        lock.acquire();
        log::debug!("Opened embedded archive {}", display);
        self.parent = Some(ParentLink {
            archive: Arc::downgrade(parent),
            entry: id,
            lock,
            display,
        });
        self.filename = None;
        self.on_disk = false;
        Ok(())
    }

    fn open_data(&mut self, data: Arc<[u8]>) -> Result<()> {
        self.check_open()?;
        if !self.format.is_byte_backed() {
            return Err(ArchiveError::unsupported(
                self.format.id(),
                "opening from bytes",
            ));
        }
        let tree = self.format.codec().decode(&data)?;
        self.install(tree, Some(data));
        if self.options.lock_iwads && self.is_iwad() {
            log::info!("Opened an IWAD, locking it read-only");
            self.read_only = true;
        }
        log::debug!(
            "Read {} archive with {} entries",
            self.format,
            self.tree.num_entries(self.tree.root(), true)
        );
        Ok(())
    }

    fn install(&mut self, mut tree: DirTree, backing: Option<Arc<[u8]>>) {
        let root = tree.root();
        tree.mark_all(root, EntryState::Unmodified);
        let mut dirs = vec![root];
        dirs.extend(tree.descendants(root));
        for dir in dirs {
            for entry in tree.entries_mut(dir) {
                entry.detect_type();
                if !self.options.load_data {
                    entry.unload_data();
                }
            }
        }

        self.tree = tree;
        self.backing = backing;
        self.undo.clear();
        self.on_disk = false;
        self.set_modified(false);
    }

    /// Close the archive.
    ///
    /// Announces `closing` and `closed`, drops the tree and releases the
    /// parent entry lock. A closed archive rejects every operation.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.announce(ArchiveEvent::Closing);
        self.tree.clear();
        self.backing = None;
        self.undo.clear();
        self.release_parent();
        self.closed = true;
        self.announce(ArchiveEvent::Closed);
    }

    fn release_parent(&mut self) {
        if let Some(link) = self.parent.take() {
            link.lock.release();
            log::debug!("Released parent entry of {}", link.display);
        }
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Encode the tree to container bytes.
    ///
    /// With `update`, the encoded bytes become the new backing data: entry
    /// sources point into them and every entry is marked unmodified.
    pub fn write_bytes(&mut self, update: bool) -> Result<Vec<u8>> {
        let result = self.encode().and_then(|bytes| {
            if update {
                self.commit(&bytes);
            }
            Ok(bytes)
        });
        self.track(result)
    }

    /// Write the archive to `path` without changing its filename.
    ///
    /// Folder archives are exported as a directory tree.
    pub fn write_file(&mut self, path: &Path) -> Result<()> {
        let result = self.write_file_inner(path);
        self.track(result)
    }

    /// Write copies of the entries `ids`, in order, to a new PWAD at `path`.
    ///
    /// Payloads still on disk are loaded first.
    pub fn export_entries_as_wad(&mut self, ids: &[EntryId], path: &Path) -> Result<()> {
        let result = self.export_wad_inner(ids, path);
        self.track(result)
    }

    fn export_wad_inner(&mut self, ids: &[EntryId], path: &Path) -> Result<()> {
        for &id in ids {
            self.ensure_loaded(id)?;
        }
        let entries = ids
            .iter()
            .map(|&id| self.tree.entry(id).ok_or(ArchiveError::ForeignEntry))
            .collect::<Result<Vec<_>>>()?;
        wad::export_entries(path, &entries)
    }

    fn write_file_inner(&mut self, path: &Path) -> Result<()> {
        self.check_open()?;
        if !self.format.is_byte_backed() {
            self.load_all_data()?;
            folder::export_dir(&self.tree, path)?;
            self.tree.mark_all(self.tree.root(), EntryState::Unmodified);
            return Ok(());
        }
        let bytes = self.encode()?;
        fs::write(path, &bytes)?;
        self.commit(&bytes);
        Ok(())
    }

    /// Save the archive.
    ///
    /// Embedded archives write into their parent entry. Otherwise the target
    /// is `path` or the current filename; when overwriting the current file
    /// and backups are enabled, the old file is copied to `<name>.bak` first.
    pub fn save(&mut self, path: Option<&Path>) -> Result<()> {
        let result = self.save_inner(path);
        match &result {
            Ok(()) => {
                self.set_modified(false);
                self.announce(ArchiveEvent::Saved);
                log::info!("Saved {}", self.filename(true));
            }
            Err(e) => log::error!("Saving {} failed: {}", self.filename(true), e),
        }
        self.track(result)
    }

    fn save_inner(&mut self, path: Option<&Path>) -> Result<()> {
        self.check_writable()?;

        if let Some((archive, entry)) = self
            .parent
            .as_ref()
            .map(|link| (link.archive.clone(), link.entry))
        {
            let bytes = self.encode()?;
            let parent = archive.upgrade().ok_or_else(|| {
                ArchiveError::parent_unavailable("the parent archive was dropped")
            })?;
            lock_parent(&parent)?.receive_embedded(entry, bytes.clone())?;
            self.commit(&bytes);
            return Ok(());
        }

        let (target, backup) = match (path, &self.filename) {
            (Some(path), _) => (path.to_path_buf(), false),
            (None, Some(current)) => (current.clone(), self.options.backup_on_save),
            (None, None) => {
                return Err(ArchiveError::invalid_state("the archive has no filename"));
            }
        };

        if !self.format.is_byte_backed() {
            self.write_file_inner(&target)?;
        } else {
            let bytes = self.encode()?;
            if backup && target.is_file() {
                let mut name = target.clone().into_os_string();
                name.push(".bak");
                if let Err(e) = fs::copy(&target, &name) {
                    log::warn!("Could not back up {}: {}", target.display(), e);
                }
            }
            fs::write(&target, &bytes)?;
            self.commit(&bytes);
        }

        self.filename = Some(target);
        self.on_disk = true;
        Ok(())
    }

    /// Take the saved bytes of an embedded archive into entry `id`.
    fn receive_embedded(&mut self, id: EntryId, data: Vec<u8>) -> Result<()> {
        self.check_writable()?;
        let (dir, index) = self.tree.position(id).ok_or(ArchiveError::ForeignEntry)?;
        if let Some(entry) = self.tree.entry_at_mut(dir, index) {
            entry.set_data(data);
        }
        self.announce(ArchiveEvent::EntryStateChanged { index, id });
        self.set_modified(true);
        Ok(())
    }

    fn encode(&mut self) -> Result<Vec<u8>> {
        self.check_open()?;
        self.load_all_data()?;
        self.format.codec().encode(&self.tree)
    }

    /// Make `bytes` the backing data and point entry sources into it.
    fn commit(&mut self, bytes: &[u8]) {
        let root = self.tree.root();
        match self.format.codec().decode(bytes) {
            Ok(written) => {
                let mut dirs = vec![root];
                dirs.extend(self.tree.descendants(root));
                for dir in dirs {
                    let path = self.tree.path(dir);
                    let written_dir = written.child(written.root(), &path);
                    for (index, entry) in self.tree.entries_mut(dir).iter_mut().enumerate() {
                        let source = written_dir
                            .and_then(|d| written.entry_at(d, index))
                            .and_then(|e| e.source().copied());
                        entry.set_source(source);
                    }
                }
                self.backing = Some(Arc::from(bytes));
            }
            Err(e) => {
                log::warn!("Written {} data did not decode: {}", self.format, e);
                self.backing = None;
            }
        }
        self.tree.mark_all(root, EntryState::Unmodified);
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// The root directory.
    pub fn root(&self) -> DirId {
        self.tree.root()
    }

    /// Resolve a directory path from `base` (the root when `None`).
    pub fn dir(&self, path: &str, base: Option<DirId>) -> Option<DirId> {
        self.tree.child(base.unwrap_or(self.tree.root()), path)
    }

    /// Get an entry by id.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.tree.entry(id)
    }

    /// Get the entry at `index` in `dir` (the root when `None`).
    pub fn entry_at(&self, index: usize, dir: Option<DirId>) -> Option<&Entry> {
        self.tree.entry_at(dir.unwrap_or(self.tree.root()), index)
    }

    /// Index of entry `id` within `dir`, or within its own directory when
    /// `dir` is `None`.
    pub fn entry_index(&self, id: EntryId, dir: Option<DirId>) -> Option<usize> {
        match dir {
            Some(dir) => self.tree.entry_index(dir, id),
            None => self.tree.position(id).map(|(_, index)| index),
        }
    }

    /// Get an entry by path, e.g. `sprites/trooa1.png`.
    ///
    /// The directory part is case-sensitive, the entry name is not.
    pub fn entry_at_path(&self, path: &str) -> Option<&Entry> {
        let path = path.trim_start_matches('/');
        let (dir_path, name) = path.rsplit_once('/').unwrap_or(("", path));
        let dir = self.tree.child(self.tree.root(), dir_path)?;
        self.tree.entry_by_name(dir, name, false)
    }

    /// Find an entry by name in `dir` (the root when `None`), ignoring case
    /// and optionally the extension.
    pub fn entry_by_name(&self, name: &str, cut_ext: bool, dir: Option<DirId>) -> Option<&Entry> {
        self.tree
            .entry_by_name(dir.unwrap_or(self.tree.root()), name, cut_ext)
    }

    /// Full path of an entry, e.g. `/sprites/TROOA1`.
    pub fn entry_path(&self, id: EntryId) -> Option<String> {
        let (dir, index) = self.tree.position(id)?;
        let entry = self.tree.entry_at(dir, index)?;
        Some(format!("{}{}", self.tree.path(dir), entry.name()))
    }

    /// Number of entries in the whole tree.
    pub fn num_entries(&self) -> usize {
        self.tree.num_entries(self.tree.root(), true)
    }

    /// Every entry in the tree, directory entries included.
    pub fn all_entries(&self) -> Vec<&Entry> {
        self.tree.all_entries(self.tree.root())
    }

    /// The entry representing directory `dir`.
    pub fn dir_entry(&self, dir: DirId) -> Option<&Entry> {
        self.tree.dir_entry(dir)
    }

    /// Data of entry `id`, loading it from the container bytes if needed.
    pub fn entry_data(&mut self, id: EntryId) -> Result<&[u8]> {
        let result = self.ensure_loaded(id);
        self.track(result)?;
        self.tree
            .entry(id)
            .map(Entry::data)
            .ok_or(ArchiveError::ForeignEntry)
    }

    /// Data of `entry` without caching it.
    pub(crate) fn peek_data<'a>(&self, entry: &'a Entry) -> Cow<'a, [u8]> {
        if entry.is_loaded() {
            return Cow::Borrowed(entry.data());
        }
        match (entry.source(), &self.backing) {
            (Some(source), Some(backing)) => self
                .format
                .codec()
                .load_entry_data(backing, source)
                .map_or_else(|_| Cow::default(), Cow::Owned),
            _ => Cow::default(),
        }
    }

    fn ensure_loaded(&mut self, id: EntryId) -> Result<()> {
        let entry = self.tree.entry(id).ok_or(ArchiveError::ForeignEntry)?;
        if entry.is_loaded() {
            return Ok(());
        }
        let source = *entry.source().ok_or_else(|| {
            ArchiveError::invalid_state(format!("entry '{}' has no data", entry.name()))
        })?;
        let data = {
            let backing = self
                .backing
                .as_ref()
                .ok_or_else(|| ArchiveError::invalid_state("the archive has no backing data"))?;
            self.format.codec().load_entry_data(backing, &source)?
        };
        if let Some(entry) = self.tree.entry_mut(id) {
            entry.set_loaded_data(data);
        }
        Ok(())
    }

    fn load_all_data(&mut self) -> Result<()> {
        let root = self.tree.root();
        let mut dirs = vec![root];
        dirs.extend(self.tree.descendants(root));
        self.load_data_in(&dirs)
    }

    fn load_data_in(&mut self, dirs: &[DirId]) -> Result<()> {
        let unloaded: Vec<EntryId> = dirs
            .iter()
            .flat_map(|&dir| self.tree.entries(dir))
            .filter(|entry| !entry.is_loaded())
            .map(Entry::id)
            .collect();
        for id in unloaded {
            self.ensure_loaded(id)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Guard
    // ---------------------------------------------------------------------

    /// The single check in front of every mutation.
    ///
    /// Rejects closed and read-only archives; for a target entry, also rejects
    /// entries of other archives and locked entries (for a directory entry,
    /// any locked entry in its subtree).
    fn guard(&self, target: Option<EntryId>) -> Result<Option<EntryLoc>> {
        self.check_open()?;
        if self.read_only {
            return Err(ArchiveError::ReadOnly);
        }
        let Some(id) = target else {
            return Ok(None);
        };

        let loc = self.tree.location(id).ok_or(ArchiveError::ForeignEntry)?;
        let locked = match loc {
            EntryLoc::InDir(_) => self.tree.entry(id).filter(|e| e.is_locked()),
            EntryLoc::DirEntry(dir) => self.locked_in(dir),
        };
        if let Some(entry) = locked {
            return Err(ArchiveError::locked(entry.name()));
        }
        Ok(Some(loc))
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(ArchiveError::invalid_state("the archive is closed"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.guard(None).map(|_| ())
    }

    fn guard_entry(&self, id: EntryId) -> Result<EntryLoc> {
        self.guard(Some(id))?.ok_or(ArchiveError::ForeignEntry)
    }

    fn locked_in(&self, dir: DirId) -> Option<&Entry> {
        let mut dirs = self.tree.descendants(dir);
        dirs.push(dir);
        dirs.into_iter()
            .flat_map(|d| self.tree.entries(d))
            .find(|entry| entry.is_locked())
    }

    fn check_flat(&self, dir: DirId) -> Result<()> {
        if !self.tree.contains_dir(dir) {
            return Err(ArchiveError::dir_not_found(dir.to_string()));
        }
        if dir != self.tree.root() && !self.format.supports_dirs() {
            return Err(ArchiveError::unsupported(
                self.format.id(),
                "entries outside the root directory",
            ));
        }
        Ok(())
    }

    /// Apply the format's naming rules to `name` for an entry in `dir`.
    fn prepare_name(&self, dir: DirId, name: &str) -> Result<String> {
        self.prepare_name_at(&self.tree.path(dir), name)
    }

    fn prepare_name_at(&self, dir_path: &str, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(ArchiveError::invalid_name(name, "empty name"));
        }
        if name.contains(['/', '\0']) {
            return Err(ArchiveError::invalid_name(name, "contains '/' or NUL"));
        }
        let formatted = self.format_desc().format_name(name);
        if formatted.is_empty() {
            return Err(ArchiveError::invalid_name(name, "empty after formatting"));
        }
        let path = format!("{}{}", dir_path, formatted);
        self.format.codec().check_entry_path(&path)?;
        Ok(formatted)
    }

    /// Check that every entry and directory of `source` below `from` can be
    /// pasted under `dir_path`, so a paste fails before changing anything.
    ///
    /// With `flat`, directories are skipped and every entry lands in
    /// `dir_path` itself.
    fn check_paste(
        &self,
        source: &DirTree,
        from: DirId,
        dir_path: &str,
        flat: bool,
    ) -> Result<()> {
        for entry in source.entries(from) {
            if !entry.is_loaded() {
                return Err(ArchiveError::invalid_state(format!(
                    "entry '{}' has no data loaded",
                    entry.name()
                )));
            }
            self.prepare_name_at(dir_path, entry.name())?;
        }
        for &child in source.children(from) {
            if flat {
                self.check_paste(source, child, dir_path, true)?;
                continue;
            }
            let name = source.name(child).unwrap_or_default();
            lumpkit_core::check_dir_name(name)?;
            let child_path = format!("{}{}/", dir_path, name);
            self.format.codec().check_entry_path(&child_path)?;
            self.check_paste(source, child, &child_path, false)?;
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::debug!("{}: {}", self.filename(false), e);
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn announce(&mut self, event: ArchiveEvent) {
        self.announcer.announce(event);
    }

    fn set_modified(&mut self, modified: bool) {
        if self.modified != modified {
            self.modified = modified;
            self.announce(ArchiveEvent::Modified { modified });
        }
    }

    fn record(&mut self, step: impl FnOnce(&Self) -> UndoStep) {
        if self.undo.is_recording() {
            let step = step(self);
            self.undo.record(step);
        }
    }

    /// Run `op` inside an automatic undo level when automatic levels are on.
    fn journal<T>(&mut self, name: &str, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let auto = self.undo.begin_auto(name);
        let result = op(self);
        if auto {
            self.undo.end_level(result.is_ok());
        }
        self.track(result)
    }

    // ---------------------------------------------------------------------
    // Entry mutation
    // ---------------------------------------------------------------------

    /// Add `entry` to `dir` (the root when `None`) at `position` (appended
    /// when `None` or past the end).
    ///
    /// With `copy`, a deep copy with a fresh id is added instead. The added
    /// entry is marked New. Returns its id.
    pub fn add_entry(
        &mut self,
        entry: Entry,
        position: Option<usize>,
        dir: Option<DirId>,
        copy: bool,
    ) -> Result<EntryId> {
        self.journal("Add Entry", |a| {
            a.insert_entry(entry, position, dir, copy, EntryState::New)
        })
    }

    /// Create an empty entry named `name`.
    pub fn add_new_entry(
        &mut self,
        name: &str,
        position: Option<usize>,
        dir: Option<DirId>,
    ) -> Result<EntryId> {
        self.add_entry(Entry::with_data(name, Vec::new()), position, dir, false)
    }

    fn insert_entry(
        &mut self,
        entry: Entry,
        position: Option<usize>,
        dir: Option<DirId>,
        copy: bool,
        state: EntryState,
    ) -> Result<EntryId> {
        self.check_writable()?;
        let dir = dir.unwrap_or(self.tree.root());
        self.check_flat(dir)?;
        if !entry.is_loaded() {
            return Err(ArchiveError::invalid_state(format!(
                "entry '{}' has no data loaded",
                entry.name()
            )));
        }

        let mut entry = if copy { entry.deep_copy() } else { entry };
        let name = self.prepare_name(dir, entry.name())?;
        entry.set_name(name);
        entry.set_source(None);
        entry.force_state(state);
        if entry.entry_type() == lumpkit_core::EntryType::Unknown {
            entry.detect_type();
        }

        let index = self.tree.add_entry(dir, entry, position)?;
        let id = self
            .tree
            .entry_at(dir, index)
            .map(Entry::id)
            .ok_or_else(|| ArchiveError::invalid_state("inserted entry vanished"))?;
        log::debug!("Added entry {} at {}{}", id, self.tree.path(dir), index);

        self.announce(ArchiveEvent::EntryAdded { index, id });
        self.record(|a| UndoStep::EntryCreateDelete {
            created: true,
            dir_path: a.tree.path(dir),
            index,
            entry: a.tree.entries(dir)[index].clone(),
        });
        self.set_modified(true);
        Ok(id)
    }

    /// Add `entry` to namespace `namespace`.
    ///
    /// Archives with directories put it in the namespace directory (created
    /// if needed, the root for `global`). Marker archives insert it before
    /// the namespace's end marker, or append it when there is no such
    /// namespace.
    pub fn add_entry_in_namespace(
        &mut self,
        entry: Entry,
        namespace: &str,
        copy: bool,
    ) -> Result<EntryId> {
        self.journal("Add Entry", |a| a.insert_in_namespace(entry, namespace, copy))
    }

    /// Create an empty entry named `name` in namespace `namespace`.
    pub fn add_new_entry_in_namespace(&mut self, name: &str, namespace: &str) -> Result<EntryId> {
        self.add_entry_in_namespace(Entry::with_data(name, Vec::new()), namespace, false)
    }

    fn insert_in_namespace(
        &mut self,
        entry: Entry,
        namespace: &str,
        copy: bool,
    ) -> Result<EntryId> {
        self.check_writable()?;
        let root = self.tree.root();
        if namespace.eq_ignore_ascii_case(GLOBAL_NAMESPACE) {
            return self.insert_entry(entry, None, Some(root), copy, EntryState::New);
        }

        if self.format.uses_marker_namespaces() {
            let position = marker_namespaces(self.tree.entries(root), &self.options.namespaces)
                .into_iter()
                .find(|ns| ns.name.eq_ignore_ascii_case(namespace))
                .map(|ns| ns.end);
            self.insert_entry(entry, position, Some(root), copy, EntryState::New)
        } else {
            let dir = self.make_dir(namespace, root)?;
            self.insert_entry(entry, None, Some(dir), copy, EntryState::New)
        }
    }

    /// Remove an entry. Removing a directory entry removes the directory.
    pub fn remove_entry(&mut self, id: EntryId) -> Result<()> {
        self.journal("Remove Entry", |a| match a.guard_entry(id)? {
            EntryLoc::DirEntry(dir) => a.delete_dir(dir),
            EntryLoc::InDir(dir) => {
                let index = a
                    .tree
                    .entry_index(dir, id)
                    .ok_or(ArchiveError::ForeignEntry)?;
                if a.undo.is_recording() {
                    a.ensure_loaded(id)?;
                }
                let entry = a.detach_entry(dir, index)?;
                a.record(|a| UndoStep::EntryCreateDelete {
                    created: false,
                    dir_path: a.tree.path(dir),
                    index,
                    entry,
                });
                Ok(())
            }
        })
    }

    fn detach_entry(&mut self, dir: DirId, index: usize) -> Result<Entry> {
        let len = self.tree.entries(dir).len();
        let entry = self
            .tree
            .entry_at(dir, index)
            .ok_or(ArchiveError::out_of_bounds(index, len))?;
        if entry.is_locked() {
            return Err(ArchiveError::locked(entry.name()));
        }
        let id = entry.id();

        self.announce(ArchiveEvent::EntryRemoving { index, id });
        let entry = self.tree.remove_entry(dir, index)?;
        log::debug!("Removed entry {} ({})", entry.name(), id);
        self.announce(ArchiveEvent::EntryRemoved { index, id });
        self.set_modified(true);
        Ok(entry)
    }

    /// Rename an entry. Renaming a directory entry renames the directory.
    pub fn rename_entry(&mut self, id: EntryId, name: &str) -> Result<()> {
        self.journal("Rename Entry", |a| match a.guard_entry(id)? {
            EntryLoc::DirEntry(dir) => a.rename_dir_inner(dir, name),
            EntryLoc::InDir(dir) => {
                let index = a
                    .tree
                    .entry_index(dir, id)
                    .ok_or(ArchiveError::ForeignEntry)?;
                let name = a.prepare_name(dir, name)?;
                let old_name = a.tree.entries(dir)[index].name().to_string();
                if old_name == name {
                    return Ok(());
                }
                a.set_entry_name(dir, index, &name)?;
                a.record(|a| UndoStep::EntryRename {
                    dir_path: a.tree.path(dir),
                    index,
                    old_name,
                    new_name: name,
                });
                Ok(())
            }
        })
    }

    fn set_entry_name(&mut self, dir: DirId, index: usize, name: &str) -> Result<()> {
        let len = self.tree.entries(dir).len();
        let entry = self
            .tree
            .entry_at(dir, index)
            .ok_or(ArchiveError::out_of_bounds(index, len))?;
        if entry.is_locked() {
            return Err(ArchiveError::locked(entry.name()));
        }
        let id = entry.id();

        self.announce(ArchiveEvent::EntryRenaming { index, id });
        if let Some(entry) = self.tree.entry_at_mut(dir, index) {
            entry.set_name(name);
            entry.set_state(EntryState::Modified);
        }
        self.announce(ArchiveEvent::EntryStateChanged { index, id });
        self.set_modified(true);
        Ok(())
    }

    /// Move an entry to `position` in `dir` (its current directory when
    /// `None`).
    ///
    /// The move is a removal followed by an insertion, so `position` counts
    /// entries after the removal and the moved entry is marked New.
    pub fn move_entry(
        &mut self,
        id: EntryId,
        position: Option<usize>,
        dir: Option<DirId>,
    ) -> Result<()> {
        self.journal("Move Entry", |a| {
            let EntryLoc::InDir(current) = a.guard_entry(id)? else {
                return Err(ArchiveError::unsupported(
                    a.format.id(),
                    "moving directories",
                ));
            };
            let target = dir.unwrap_or(current);
            a.check_flat(target)?;
            let name = a
                .tree
                .entry(id)
                .map(|e| e.name().to_string())
                .ok_or(ArchiveError::ForeignEntry)?;
            a.format
                .codec()
                .check_entry_path(&format!("{}{}", a.tree.path(target), name))?;
            a.ensure_loaded(id)?;

            let index = a
                .tree
                .entry_index(current, id)
                .ok_or(ArchiveError::ForeignEntry)?;
            let entry = a.detach_entry(current, index)?;
            a.record(|a| UndoStep::EntryCreateDelete {
                created: false,
                dir_path: a.tree.path(current),
                index,
                entry: entry.clone(),
            });
            a.insert_entry(entry, position, Some(target), false, EntryState::New)?;
            Ok(())
        })
    }

    /// Swap two entries of the same directory.
    pub fn swap_entries(&mut self, id1: EntryId, id2: EntryId) -> Result<()> {
        self.journal("Swap Entries", |a| {
            let loc1 = a.guard_entry(id1)?;
            let loc2 = a.guard_entry(id2)?;
            let (EntryLoc::InDir(dir1), EntryLoc::InDir(dir2)) = (loc1, loc2) else {
                return Err(ArchiveError::unsupported(
                    a.format.id(),
                    "swapping directories",
                ));
            };
            if dir1 != dir2 {
                log::error!("Can't swap two entries in different directories");
                return Err(ArchiveError::CrossDirectorySwap);
            }
            let index1 = a.tree.entry_index(dir1, id1).ok_or(ArchiveError::ForeignEntry)?;
            let index2 = a.tree.entry_index(dir1, id2).ok_or(ArchiveError::ForeignEntry)?;
            a.swap_at(dir1, index1, index2)
        })
    }

    /// Swap the entries at two indices of `dir` (the root when `None`).
    pub fn swap_entries_at(
        &mut self,
        index1: usize,
        index2: usize,
        dir: Option<DirId>,
    ) -> Result<()> {
        self.journal("Swap Entries", |a| {
            a.check_writable()?;
            let dir = dir.unwrap_or(a.tree.root());
            if !a.tree.contains_dir(dir) {
                return Err(ArchiveError::dir_not_found(dir.to_string()));
            }
            a.swap_at(dir, index1, index2)
        })
    }

    fn swap_at(&mut self, dir: DirId, index1: usize, index2: usize) -> Result<()> {
        let entries = self.tree.entries(dir);
        for index in [index1, index2] {
            let entry = entries
                .get(index)
                .ok_or(ArchiveError::out_of_bounds(index, entries.len()))?;
            if entry.is_locked() {
                return Err(ArchiveError::locked(entry.name()));
            }
        }

        self.tree.swap_entries(dir, index1, index2)?;
        self.announce(ArchiveEvent::EntriesSwapped {
            dir,
            index1,
            index2,
        });
        self.record(|a| UndoStep::EntrySwap {
            dir_path: a.tree.path(dir),
            index1,
            index2,
        });
        self.set_modified(true);
        Ok(())
    }

    /// Replace the data of an entry and mark it Modified.
    pub fn set_entry_data(&mut self, id: EntryId, data: Vec<u8>) -> Result<()> {
        let result = self.guard_entry(id).and_then(|_| {
            let (dir, index) = self.tree.position(id).ok_or(ArchiveError::ForeignEntry)?;
            if let Some(entry) = self.tree.entry_at_mut(dir, index) {
                entry.set_data(data);
                entry.detect_type();
            }
            self.announce(ArchiveEvent::EntryStateChanged { index, id });
            self.set_modified(true);
            Ok(())
        });
        self.track(result)
    }

    /// Restore the original data of a Modified entry.
    ///
    /// Entries in any other state are left alone.
    pub fn revert_entry(&mut self, id: EntryId) -> Result<()> {
        let result = self.revert_inner(id);
        self.track(result)
    }

    fn revert_inner(&mut self, id: EntryId) -> Result<()> {
        self.guard_entry(id)?;
        let (dir, index) = self.tree.position(id).ok_or(ArchiveError::ForeignEntry)?;
        let entry = &self.tree.entries(dir)[index];
        if entry.state() != EntryState::Modified {
            return Ok(());
        }
        let source = *entry.source().ok_or_else(|| {
            ArchiveError::invalid_state(format!("entry '{}' has no original data", entry.name()))
        })?;
        let data = {
            let backing = self
                .backing
                .as_ref()
                .ok_or_else(|| ArchiveError::invalid_state("the archive has no backing data"))?;
            self.format.codec().load_entry_data(backing, &source)?
        };

        if let Some(entry) = self.tree.entry_at_mut(dir, index) {
            entry.set_loaded_data(data);
            entry.force_state(EntryState::Unmodified);
            entry.detect_type();
        }
        self.announce(ArchiveEvent::EntryStateChanged { index, id });
        Ok(())
    }

    /// Ids of every entry that is New or Modified.
    ///
    /// Clears the modified flag when there are none.
    pub fn find_modified_entries(&mut self) -> Vec<EntryId> {
        let modified: Vec<EntryId> = self
            .tree
            .all_entries(self.tree.root())
            .into_iter()
            .filter(|entry| entry.state() != EntryState::Unmodified)
            .map(Entry::id)
            .collect();
        if modified.is_empty() {
            self.set_modified(false);
        }
        modified
    }

    // ---------------------------------------------------------------------
    // Directory mutation
    // ---------------------------------------------------------------------

    /// Create the directory at `path` below `base` (the root when `None`),
    /// along with any missing parents.
    ///
    /// Returns the existing directory unchanged if it is already there.
    pub fn create_dir(&mut self, path: &str, base: Option<DirId>) -> Result<DirId> {
        self.journal("Create Directory", |a| {
            let base = base.unwrap_or(a.tree.root());
            a.make_dir(path, base)
        })
    }

    fn make_dir(&mut self, path: &str, base: DirId) -> Result<DirId> {
        self.check_writable()?;
        if !self.format.supports_dirs() {
            return Err(ArchiveError::unsupported(self.format.id(), "directories"));
        }
        if !self.tree.contains_dir(base) {
            return Err(ArchiveError::dir_not_found(base.to_string()));
        }
        if let Some(existing) = self.tree.child(base, path) {
            return Ok(existing);
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            lumpkit_core::check_dir_name(segment)?;
        }
        let full_path = format!("{}{}/", self.tree.path(base), path.trim_matches('/'));
        self.format.codec().check_entry_path(&full_path)?;

        let (dir, created) = self.tree.add_child(base, path)?;
        for &new_dir in &created {
            self.announce(ArchiveEvent::DirectoryAdded { dir: new_dir });
            self.record(|a| UndoStep::DirCreateDelete {
                created: true,
                path: a.tree.path(new_dir),
                snapshot: None,
            });
        }
        log::debug!("Created directory {}", self.tree.path(dir));
        self.set_modified(true);
        Ok(dir)
    }

    /// Remove the directory at `path` below `base` (the root when `None`)
    /// with everything in it.
    pub fn remove_dir(&mut self, path: &str, base: Option<DirId>) -> Result<()> {
        self.journal("Remove Directory", |a| {
            let base = base.unwrap_or(a.tree.root());
            let dir = a
                .tree
                .child(base, path)
                .ok_or_else(|| ArchiveError::dir_not_found(path))?;
            a.delete_dir(dir)
        })
    }

    fn delete_dir(&mut self, dir: DirId) -> Result<()> {
        self.check_writable()?;
        if self.undo.is_recording() {
            let mut dirs = self.tree.descendants(dir);
            dirs.push(dir);
            self.load_data_in(&dirs)?;
        }
        let path = self.tree.path(dir);
        let snapshot = self.detach_dir(dir)?;
        self.record(|_| UndoStep::DirCreateDelete {
            created: false,
            path,
            snapshot: Some(snapshot),
        });
        Ok(())
    }

    fn detach_dir(&mut self, dir: DirId) -> Result<DirTree> {
        if dir == self.tree.root() {
            return Err(ArchiveError::RootDirRemoval);
        }
        if !self.tree.contains_dir(dir) {
            return Err(ArchiveError::dir_not_found(dir.to_string()));
        }
        if let Some(entry) = self.locked_in(dir) {
            return Err(ArchiveError::locked(entry.name()));
        }

        let parent = self.tree.parent(dir).unwrap_or(self.tree.root());
        let path = self.tree.path(dir);
        let snapshot = self.tree.remove_child(dir)?;
        log::debug!("Removed directory {}", path);
        self.announce(ArchiveEvent::DirectoryModified { dir: parent });
        self.set_modified(true);
        Ok(snapshot)
    }

    /// Rename a directory.
    pub fn rename_dir(&mut self, dir: DirId, name: &str) -> Result<()> {
        self.journal("Rename Directory", |a| {
            a.check_writable()?;
            a.rename_dir_inner(dir, name)
        })
    }

    fn rename_dir_inner(&mut self, dir: DirId, name: &str) -> Result<()> {
        let old_name = self
            .tree
            .name(dir)
            .ok_or_else(|| ArchiveError::dir_not_found(dir.to_string()))?
            .to_string();
        if old_name == name {
            return Ok(());
        }
        self.set_dir_name(dir, name)?;
        self.record(|a| UndoStep::DirRename {
            path: a.tree.path(dir),
            old_name,
            new_name: name.to_string(),
        });
        Ok(())
    }

    fn set_dir_name(&mut self, dir: DirId, name: &str) -> Result<()> {
        lumpkit_core::check_dir_name(name)?;
        let parent = self.tree.parent(dir).unwrap_or(self.tree.root());
        self.format
            .codec()
            .check_entry_path(&format!("{}{}/", self.tree.path(parent), name))?;
        if self.tree.child_by_name(parent, name).is_some() {
            return Err(ArchiveError::invalid_name(
                name,
                "a directory with this name already exists",
            ));
        }
        if let Some(entry) = self.locked_in(dir) {
            return Err(ArchiveError::locked(entry.name()));
        }

        self.tree.rename_dir(dir, name)?;
        if let Some(entry) = self.tree.dir_entry_mut(dir) {
            entry.set_state(EntryState::Modified);
        }
        self.announce(ArchiveEvent::DirectoryModified { dir: parent });
        self.set_modified(true);
        Ok(())
    }

    /// Paste copies of everything in `tree` into `base` (the root when
    /// `None`), root entries starting at `position`.
    ///
    /// Archives without directories receive every entry of `tree` flattened
    /// into the root. Returns the ids of the pasted entries.
    pub fn paste(
        &mut self,
        tree: &DirTree,
        position: Option<usize>,
        base: Option<DirId>,
    ) -> Result<Vec<EntryId>> {
        self.journal("Paste", |a| {
            a.check_writable()?;
            let base = base.unwrap_or(a.tree.root());
            a.check_flat(base)?;
            let flat = !a.format.supports_dirs();
            a.check_paste(tree, tree.root(), &a.tree.path(base), flat)?;

            let mut pasted = Vec::new();
            if !flat {
                a.paste_dir(tree, tree.root(), base, position, EntryState::New, &mut pasted)?;
            } else {
                let mut dirs = vec![tree.root()];
                dirs.extend(tree.descendants(tree.root()));
                let mut position = position;
                for dir in dirs {
                    for entry in tree.entries(dir) {
                        let id = a.insert_entry(
                            entry.deep_copy(),
                            position,
                            Some(base),
                            false,
                            EntryState::New,
                        )?;
                        position = position.map(|p| p + 1);
                        pasted.push(id);
                    }
                }
            }
            Ok(pasted)
        })
    }

    fn paste_dir(
        &mut self,
        source: &DirTree,
        from: DirId,
        into: DirId,
        position: Option<usize>,
        state: EntryState,
        pasted: &mut Vec<EntryId>,
    ) -> Result<()> {
        let mut position = position;
        for entry in source.entries(from) {
            let id = self.insert_entry(entry.deep_copy(), position, Some(into), false, state)?;
            position = position.map(|p| p + 1);
            pasted.push(id);
        }
        for &child in source.children(from) {
            let name = source.name(child).unwrap_or_default();
            let dir = self.make_dir(name, into)?;
            self.paste_dir(source, child, dir, None, state, pasted)?;
        }
        Ok(())
    }

    /// Import every file below a filesystem directory.
    ///
    /// Subdirectories are recreated (or flattened into the root for archives
    /// without directories). Imported entries are marked Unmodified.
    pub fn import_dir(&mut self, path: &Path) -> Result<()> {
        self.journal("Import Directory", |a| {
            a.check_writable()?;
            let imported = folder::import_dir(path)?;
            let root = a.tree.root();
            let flat = !a.format.supports_dirs();
            a.check_paste(&imported, imported.root(), &a.tree.path(root), flat)?;

            let mut pasted = Vec::new();
            if !flat {
                a.paste_dir(
                    &imported,
                    imported.root(),
                    root,
                    None,
                    EntryState::Unmodified,
                    &mut pasted,
                )?;
            } else {
                let mut dirs = vec![imported.root()];
                dirs.extend(imported.descendants(imported.root()));
                for dir in dirs {
                    for entry in imported.entries(dir) {
                        let id = a.insert_entry(
                            entry.deep_copy(),
                            None,
                            Some(root),
                            false,
                            EntryState::Unmodified,
                        )?;
                        pasted.push(id);
                    }
                }
            }
            log::info!("Imported {} entries from {}", pasted.len(), path.display());
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Namespaces
    // ---------------------------------------------------------------------

    /// Namespace of entry `id`.
    ///
    /// Archives with directories use the first directory below the root
    /// (lowercased), `global` for root entries. Marker archives use the
    /// `X_START`/`X_END` pairs around the entry.
    pub fn detect_namespace(&self, id: EntryId) -> Option<String> {
        match self.tree.location(id)? {
            EntryLoc::InDir(dir) => {
                let index = self.tree.entry_index(dir, id)?;
                Some(self.detect_namespace_at(index, Some(dir)))
            }
            EntryLoc::DirEntry(dir) => {
                let parent = self.tree.parent(dir).unwrap_or(self.tree.root());
                Some(self.dir_namespace(parent))
            }
        }
    }

    /// Namespace of the entry at `index` in `dir` (the root when `None`).
    pub fn detect_namespace_at(&self, index: usize, dir: Option<DirId>) -> String {
        let dir = dir.unwrap_or(self.tree.root());
        if self.format.uses_marker_namespaces() && dir == self.tree.root() {
            let namespaces = marker_namespaces(self.tree.entries(dir), &self.options.namespaces);
            return crate::namespace::namespace_at(&namespaces, index).to_string();
        }
        self.dir_namespace(dir)
    }

    pub(crate) fn dir_namespace(&self, dir: DirId) -> String {
        let root = self.tree.root();
        let mut current = dir;
        while let Some(parent) = self.tree.parent(current) {
            if parent == root {
                return self.tree.name(current).unwrap_or_default().to_lowercase();
            }
            current = parent;
        }
        GLOBAL_NAMESPACE.to_string()
    }

    // ---------------------------------------------------------------------
    // Undo
    // ---------------------------------------------------------------------

    /// Open an undo level; mutations until [`end_undo_level`] are undone
    /// together. Returns false if a level is already open.
    ///
    /// [`end_undo_level`]: Archive::end_undo_level
    pub fn begin_undo_level(&mut self, name: &str) -> bool {
        self.undo.begin_level(name)
    }

    /// Close the open undo level, keeping it if `keep` and it recorded
    /// anything.
    pub fn end_undo_level(&mut self, keep: bool) -> bool {
        self.undo.end_level(keep)
    }

    /// Record every mutation as its own undo level when no level is open.
    pub fn set_record_undo(&mut self, record: bool) {
        self.options.record_undo = record;
        self.undo.set_auto_levels(record);
    }

    /// Undo the most recent level. Returns false if there was none.
    pub fn undo(&mut self) -> Result<bool> {
        let result = self.replay(true);
        self.track(result)
    }

    /// Redo the most recently undone level. Returns false if there was none.
    pub fn redo(&mut self) -> Result<bool> {
        let result = self.replay(false);
        self.track(result)
    }

    fn replay(&mut self, undo: bool) -> Result<bool> {
        self.check_writable()?;
        let level = if undo {
            self.undo.pop_undo()
        } else {
            self.undo.pop_redo()
        };
        let Some(mut level) = level else {
            return Ok(false);
        };

        self.undo.set_replaying(true);
        let result = if undo {
            level.undo(self)
        } else {
            level.redo(self)
        };
        self.undo.set_replaying(false);

        match result {
            Ok(()) => {
                log::debug!("{} '{}'", if undo { "Undid" } else { "Redid" }, level.name());
                if undo {
                    self.undo.push_redo(level);
                } else {
                    self.undo.push_undo(level);
                }
                Ok(true)
            }
            Err(e) => {
                log::error!("Replaying '{}' failed, dropping undo history: {}", level.name(), e);
                self.undo.clear();
                Err(e)
            }
        }
    }

    /// Check if there is something to undo.
    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    /// Check if there is something to redo.
    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Names of undoable levels, most recent last.
    pub fn undo_names(&self) -> Vec<&str> {
        self.undo.undo_names()
    }

    /// Names of redoable levels, next redo last.
    pub fn redo_names(&self) -> Vec<&str> {
        self.undo.redo_names()
    }

    /// Forget all undo history.
    pub fn clear_undo(&mut self) {
        self.undo.clear();
    }

    // Replay primitives. Steps resolve paths to directories and call these
    // without going through the journal.

    pub(crate) fn resolve_dir(&self, path: &str) -> Result<DirId> {
        self.tree
            .child(self.tree.root(), path)
            .ok_or_else(|| ArchiveError::dir_not_found(path))
    }

    pub(crate) fn replay_rename_entry(
        &mut self,
        dir: DirId,
        index: usize,
        name: &str,
    ) -> Result<()> {
        self.set_entry_name(dir, index, name)
    }

    pub(crate) fn replay_rename_dir(&mut self, dir: DirId, name: &str) -> Result<()> {
        self.set_dir_name(dir, name)
    }

    pub(crate) fn replay_swap(&mut self, dir: DirId, index1: usize, index2: usize) -> Result<()> {
        self.swap_at(dir, index1, index2)
    }

    pub(crate) fn replay_insert(&mut self, dir: DirId, index: usize, entry: Entry) -> Result<()> {
        let index = self.tree.add_entry(dir, entry, Some(index))?;
        let id = self.tree.entries(dir)[index].id();
        self.announce(ArchiveEvent::EntryAdded { index, id });
        self.set_modified(true);
        Ok(())
    }

    pub(crate) fn replay_remove(&mut self, dir: DirId, index: usize) -> Result<Entry> {
        if let Some(id) = self.tree.entry_at(dir, index).map(Entry::id) {
            self.ensure_loaded(id)?;
        }
        self.detach_entry(dir, index)
    }

    pub(crate) fn replay_remove_dir(&mut self, dir: DirId) -> Result<DirTree> {
        let mut dirs = self.tree.descendants(dir);
        dirs.push(dir);
        self.load_data_in(&dirs)?;
        self.detach_dir(dir)
    }

    pub(crate) fn replay_restore_dir(&mut self, path: &str, snapshot: DirTree) -> Result<()> {
        let trimmed = path.trim_end_matches('/');
        let parent_path = trimmed.rsplit_once('/').map_or("", |(parent, _)| parent);
        let root = self.tree.root();
        let (parent, created) = self.tree.add_child(root, parent_path)?;
        for dir in created {
            self.announce(ArchiveEvent::DirectoryAdded { dir });
        }
        let dir = self.tree.graft(parent, snapshot, EntryState::Unmodified)?;
        self.announce(ArchiveEvent::DirectoryAdded { dir });
        self.set_modified(true);
        Ok(())
    }

    pub(crate) fn replay_create_dir(&mut self, path: &str) -> Result<()> {
        let root = self.tree.root();
        let (_, created) = self.tree.add_child(root, path)?;
        for dir in created {
            self.announce(ArchiveEvent::DirectoryAdded { dir });
        }
        self.set_modified(true);
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        self.release_parent();
    }
}

fn lock_parent(parent: &Arc<Mutex<Archive>>) -> Result<std::sync::MutexGuard<'_, Archive>> {
    parent
        .lock()
        .map_err(|_| ArchiveError::parent_unavailable("the parent archive lock is poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_archive() {
        let archive = Archive::new(ArchiveFormat::Wad);
        assert!(archive.is_open());
        assert!(!archive.is_modified());
        assert!(!archive.is_on_disk());
        assert_eq!(archive.num_entries(), 0);
        assert_eq!(archive.filename(false), "UNSAVED");
        assert_eq!(archive.format_desc().id, "wad");
    }

    #[test]
    fn test_names_follow_format() {
        let mut archive = Archive::new(ArchiveFormat::Wad);
        let id = archive.add_new_entry("mapinfo.txt", None, None).unwrap();
        assert_eq!(archive.entry(id).unwrap().name(), "MAPINFO");

        let id = archive.add_new_entry("averyverylongname", None, None).unwrap();
        assert_eq!(archive.entry(id).unwrap().name(), "AVERYVER");

        assert!(matches!(
            archive.add_new_entry("", None, None),
            Err(ArchiveError::InvalidName { .. })
        ));
        assert!(archive.last_error().is_some());
    }

    #[test]
    fn test_guard_order() {
        let mut archive = Archive::new(ArchiveFormat::Zip);
        let id = archive.add_new_entry("a.txt", None, None).unwrap();

        let foreign = Entry::new("b.txt").id();
        assert!(matches!(
            archive.remove_entry(foreign),
            Err(ArchiveError::ForeignEntry)
        ));

        archive.entry(id).unwrap().lock();
        assert!(matches!(
            archive.remove_entry(id),
            Err(ArchiveError::EntryLocked { .. })
        ));

        archive.set_read_only(true);
        assert!(matches!(
            archive.remove_entry(id),
            Err(ArchiveError::ReadOnly)
        ));
    }

    #[test]
    fn test_flat_rejects_dirs() {
        let mut archive = Archive::new(ArchiveFormat::Grp);
        assert!(matches!(
            archive.create_dir("sprites", None),
            Err(ArchiveError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_closed_archive() {
        let mut archive = Archive::new(ArchiveFormat::Pak);
        archive.add_new_entry("progs/player.mdl", None, None).unwrap_err();
        archive.add_new_entry("player.mdl", None, None).unwrap();
        archive.close();
        assert!(archive.is_closed());
        assert_eq!(archive.num_entries(), 0);
        assert!(archive.add_new_entry("x", None, None).is_err());
        assert!(archive.write_bytes(false).is_err());
    }
}
