//! Remote document store contract.
//!
//! The binding layer only needs four things from a document store: a push
//! based live watch, a point-in-time read, a create-if-absent write and a
//! merge write. [`RemoteStore`] captures exactly that. [`MemoryStore`] is a
//! complete in-process implementation used by tests and local development.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::reference::Reference;
use crate::subscriptions::{Event, Snapshot};
use crate::types::Fields;
use std::fmt;
use std::sync::Arc;

/// Callback a store invokes for every event of a live watch.
///
/// Sinks must not block and must not write back into the store.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

/// Store operations, used for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Watch,
    Read,
    Write,
}

/// The subscribe/read/write surface of a remote document store.
pub trait RemoteStore: Send + Sync {
    /// Open a live watch. The sink receives the current snapshot and then one
    /// snapshot per change until the returned handle is released.
    fn watch(&self, reference: &Reference, sink: EventSink) -> Result<WatchHandle>;

    /// Point-in-time read.
    fn read_once(&self, reference: &Reference) -> Result<Snapshot>;

    /// Create a document unless one already exists under the same id.
    ///
    /// Returns `true` when this call created the document.
    fn create_if_absent(&self, reference: &Reference, fields: Fields) -> Result<bool>;

    /// Merge fields into a document, creating it if needed.
    fn merge(&self, reference: &Reference, fields: Fields) -> Result<()>;
}

/// Releases a live watch when unsubscribed or dropped.
///
/// Unsubscribing is idempotent.
pub struct WatchHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A handle with nothing to release.
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unsubscribe_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut handle = WatchHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.unsubscribe();
        handle.unsubscribe();
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = WatchHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!WatchHandle::detached().is_active());
    }
}
