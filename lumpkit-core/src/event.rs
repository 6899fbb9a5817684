//! Archive change notifications.
//!
//! Delivery is synchronous and in-process: listeners run on the calling
//! thread before the mutating call returns.

use crate::entry::EntryId;
use crate::tree::DirId;

/// A change announced by an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    /// The archive's modified flag changed.
    Modified {
        /// New value of the flag.
        modified: bool,
    },
    /// The archive was saved.
    Saved,
    /// The archive is about to close.
    Closing,
    /// The archive closed.
    Closed,
    /// An entry was added.
    EntryAdded {
        /// Index in its directory.
        index: usize,
        /// Entry id.
        id: EntryId,
    },
    /// An entry is about to be removed.
    EntryRemoving {
        /// Index in its directory.
        index: usize,
        /// Entry id.
        id: EntryId,
    },
    /// An entry was removed.
    EntryRemoved {
        /// Former index in its directory.
        index: usize,
        /// Entry id.
        id: EntryId,
    },
    /// Two entries of one directory swapped places.
    EntriesSwapped {
        /// Directory holding both entries.
        dir: DirId,
        /// First index.
        index1: usize,
        /// Second index.
        index2: usize,
    },
    /// An entry is about to be renamed.
    EntryRenaming {
        /// Index in its directory.
        index: usize,
        /// Entry id.
        id: EntryId,
    },
    /// An entry's name, data or state changed.
    EntryStateChanged {
        /// Index in its directory.
        index: usize,
        /// Entry id.
        id: EntryId,
    },
    /// A directory was created.
    DirectoryAdded {
        /// The new directory.
        dir: DirId,
    },
    /// A directory's children changed (one was removed or renamed).
    DirectoryModified {
        /// The affected directory.
        dir: DirId,
    },
}

impl ArchiveEvent {
    /// String key of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Modified { .. } => "modified",
            Self::Saved => "saved",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::EntryAdded { .. } => "entry_added",
            Self::EntryRemoving { .. } => "entry_removing",
            Self::EntryRemoved { .. } => "entry_removed",
            Self::EntriesSwapped { .. } => "entries_swapped",
            Self::EntryRenaming { .. } => "entry_renaming",
            Self::EntryStateChanged { .. } => "entry_state_changed",
            Self::DirectoryAdded { .. } => "directory_added",
            Self::DirectoryModified { .. } => "directory_modified",
        }
    }

    /// Entry id carried by the event, if any.
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            Self::EntryAdded { id, .. }
            | Self::EntryRemoving { id, .. }
            | Self::EntryRemoved { id, .. }
            | Self::EntryRenaming { id, .. }
            | Self::EntryStateChanged { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiver of archive events.
pub trait ArchiveListener: Send {
    /// Handle one event.
    fn on_event(&mut self, event: &ArchiveEvent);
}

impl<F> ArchiveListener for F
where
    F: FnMut(&ArchiveEvent) + Send,
{
    fn on_event(&mut self, event: &ArchiveEvent) {
        self(event)
    }
}

/// Handle returned by [`Announcer::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out of events to registered listeners.
#[derive(Default)]
pub struct Announcer {
    listeners: Vec<(ListenerId, Box<dyn ArchiveListener>)>,
    next_id: u64,
}

impl Announcer {
    /// Create an announcer with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&mut self, listener: impl ArchiveListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener in subscription order.
    pub fn announce(&mut self, event: ArchiveEvent) {
        log::trace!("announce {}", event.name());
        for (_, listener) in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_event_names() {
        assert_eq!(ArchiveEvent::Saved.name(), "saved");
        assert_eq!(
            ArchiveEvent::DirectoryAdded { dir: DirId::ROOT }.to_string(),
            "directory_added"
        );
        let id = EntryId::next();
        assert_eq!(
            ArchiveEvent::EntryRemoving { index: 0, id }.entry_id(),
            Some(id)
        );
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut announcer = Announcer::new();

        let sink = Arc::clone(&seen);
        let id = announcer.subscribe(move |event: &ArchiveEvent| {
            sink.lock().unwrap().push(event.name());
        });

        announcer.announce(ArchiveEvent::Closing);
        announcer.announce(ArchiveEvent::Closed);
        assert!(announcer.unsubscribe(id));
        announcer.announce(ArchiveEvent::Saved);

        assert_eq!(*seen.lock().unwrap(), ["closing", "closed"]);
        assert!(announcer.is_empty());
        assert!(!announcer.unsubscribe(id));
    }
}
