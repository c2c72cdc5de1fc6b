//! In-process document store with live watches.

use crate::error::{BindError, ErrorKind, Result};
use crate::reference::Reference;
use crate::subscriptions::{Event, Snapshot};
use crate::types::{Fields, Record};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::{EventSink, Operation, RemoteStore, WatchHandle};

/// Documents keyed by collection, then by id.
type Collections = BTreeMap<String, BTreeMap<String, Fields>>;

/// A registered live watch.
struct Watch {
    reference: Reference,
    sink: EventSink,
    /// Last snapshot delivered, used to suppress no-op notifications.
    last: Snapshot,
}

struct Inner {
    documents: RwLock<Collections>,
    watches: RwLock<HashMap<u64, Watch>>,
    next_watch_id: AtomicU64,
    /// Pending injected failures, consumed in order.
    faults: Mutex<Vec<Operation>>,
    write_count: AtomicU64,
    /// Serializes writes and their notifications so every watch sees
    /// snapshots in write order.
    write_lock: Mutex<()>,
}

/// Thread-safe in-memory store implementing [`RemoteStore`].
///
/// Cloning yields another handle to the same documents and watches.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(Collections::new()),
                watches: RwLock::new(HashMap::new()),
                next_watch_id: AtomicU64::new(1),
                faults: Mutex::new(Vec::new()),
                write_count: AtomicU64::new(0),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Replace a document's fields entirely.
    pub fn set(&self, reference: &Reference, fields: Fields) -> Result<()> {
        let (collection, id) = document_target(reference)?;
        self.check_fault(Operation::Write)?;
        let _lock = self.inner.write_lock.lock();
        self.inner
            .documents
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.after_write(collection);
        Ok(())
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete(&self, reference: &Reference) -> Result<bool> {
        let (collection, id) = document_target(reference)?;
        self.check_fault(Operation::Write)?;
        let _lock = self.inner.write_lock.lock();
        let existed = self
            .inner
            .documents
            .write()
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if existed {
            self.after_write(collection);
        }
        Ok(existed)
    }

    /// Make the next call of the given kind fail with a transport error.
    pub fn fail_next(&self, operation: Operation) {
        self.inner.faults.lock().push(operation);
    }

    /// Terminate every live watch on `reference` with a failure event.
    ///
    /// Returns the number of watches failed.
    pub fn fail_watches(&self, reference: &Reference, message: &str) -> usize {
        let failed: Vec<EventSink> = {
            let mut watches = self.inner.watches.write();
            let ids: Vec<u64> = watches
                .iter()
                .filter(|(_, w)| w.reference == *reference)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| watches.remove(&id))
                .map(|w| w.sink)
                .collect()
        };

        for sink in &failed {
            sink(Event::Failure {
                kind: ErrorKind::TransportFailure,
                message: message.to_string(),
            });
        }
        failed.len()
    }

    /// References of all live watches.
    pub fn active_watches(&self) -> Vec<Reference> {
        self.inner
            .watches
            .read()
            .values()
            .map(|w| w.reference.clone())
            .collect()
    }

    pub fn watch_count(&self) -> usize {
        self.inner.watches.read().len()
    }

    /// Number of writes that changed stored data.
    pub fn write_count(&self) -> u64 {
        self.inner.write_count.load(Ordering::SeqCst)
    }

    fn check_fault(&self, operation: Operation) -> Result<()> {
        let mut faults = self.inner.faults.lock();
        if let Some(pos) = faults.iter().position(|op| *op == operation) {
            faults.remove(pos);
            return Err(BindError::Transport(format!(
                "injected {:?} failure",
                operation
            )));
        }
        Ok(())
    }

    fn snapshot_for(&self, reference: &Reference) -> Snapshot {
        let documents = self.inner.documents.read();
        let collection = documents.get(reference.collection_name());
        match reference {
            Reference::Document { id, .. } => match collection.and_then(|c| c.get(id)) {
                Some(fields) => Snapshot::Found(Record::new(id.clone(), fields.clone())),
                None => Snapshot::Missing,
            },
            Reference::Query(q) => {
                let candidates = collection
                    .into_iter()
                    .flat_map(|c| c.iter())
                    .map(|(id, fields)| Record::new(id.clone(), fields.clone()));
                Snapshot::Collection(q.evaluate(candidates))
            }
        }
    }

    /// Push fresh snapshots to watches on `collection` whose result changed.
    ///
    /// Caller must hold the write lock.
    fn after_write(&self, collection: &str) {
        self.inner.write_count.fetch_add(1, Ordering::SeqCst);

        let mut pending = Vec::new();
        {
            let mut watches = self.inner.watches.write();
            for watch in watches.values_mut() {
                if watch.reference.collection_name() != collection {
                    continue;
                }
                let snapshot = self.snapshot_for(&watch.reference);
                if snapshot != watch.last {
                    watch.last = snapshot.clone();
                    pending.push((Arc::clone(&watch.sink), snapshot));
                }
            }
        }

        for (sink, snapshot) in pending {
            sink(Event::Snapshot(snapshot));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document_target(reference: &Reference) -> Result<(&str, &str)> {
    reference.validate()?;
    match reference {
        Reference::Document { collection, id } => Ok((collection, id)),
        Reference::Query(_) => Err(BindError::InvalidReference(format!(
            "write target {} is not a document",
            reference
        ))),
    }
}

impl RemoteStore for MemoryStore {
    fn watch(&self, reference: &Reference, sink: EventSink) -> Result<WatchHandle> {
        reference.validate()?;
        self.check_fault(Operation::Watch)?;

        let _lock = self.inner.write_lock.lock();
        let id = self.inner.next_watch_id.fetch_add(1, Ordering::SeqCst);
        let initial = self.snapshot_for(reference);

        self.inner.watches.write().insert(
            id,
            Watch {
                reference: reference.clone(),
                sink: Arc::clone(&sink),
                last: initial.clone(),
            },
        );
        debug!(watch_id = id, reference = %reference, "watch opened");

        sink(Event::Snapshot(initial));

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(WatchHandle::new(move || {
            if let Some(inner) = inner.upgrade() {
                if inner.watches.write().remove(&id).is_some() {
                    debug!(watch_id = id, "watch released");
                }
            }
        }))
    }

    fn read_once(&self, reference: &Reference) -> Result<Snapshot> {
        reference.validate()?;
        self.check_fault(Operation::Read)?;
        Ok(self.snapshot_for(reference))
    }

    fn create_if_absent(&self, reference: &Reference, fields: Fields) -> Result<bool> {
        let (collection, id) = document_target(reference)?;
        self.check_fault(Operation::Write)?;

        let _lock = self.inner.write_lock.lock();
        let created = {
            let mut documents = self.inner.documents.write();
            let docs = documents.entry(collection.to_string()).or_default();
            if docs.contains_key(id) {
                false
            } else {
                docs.insert(id.to_string(), fields);
                true
            }
        };
        if created {
            self.after_write(collection);
        }
        Ok(created)
    }

    fn merge(&self, reference: &Reference, fields: Fields) -> Result<()> {
        let (collection, id) = document_target(reference)?;
        self.check_fault(Operation::Write)?;

        let _lock = self.inner.write_lock.lock();
        {
            let mut documents = self.inner.documents.write();
            let doc = documents
                .entry(collection.to_string())
                .or_default()
                .entry(id.to_string())
                .or_default();
            for (key, value) in fields {
                doc.insert(key, value);
            }
        }
        self.after_write(collection);
        Ok(())
    }
}
