//! Events and snapshots delivered by live watches.

use crate::error::ErrorKind;
use crate::types::{Generation, Record};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Point-in-time value of a reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    /// The watched document exists.
    Found(Record),
    /// The watched document does not exist.
    Missing,
    /// Current result of a collection query, in query order.
    Collection(Vec<Record>),
}

impl Snapshot {
    pub fn len(&self) -> usize {
        match self {
            Snapshot::Found(_) => 1,
            Snapshot::Missing => 0,
            Snapshot::Collection(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One item of a live watch stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Snapshot(Snapshot),
    /// The watch failed and will deliver nothing further.
    Failure { kind: ErrorKind, message: String },
}

/// An event tagged with the generation of the subscription that produced it.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub generation: Generation,
    pub event: Event,
}

/// Receiving side of a standalone subscription.
pub struct EventStream {
    pub(super) receiver: Receiver<Delivery>,
}

impl EventStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok().map(|d| d.event)
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv().map(|d| d.event)
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout).map(|d| d.event)
    }

    /// Take every event currently queued.
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().map(|d| d.event).collect()
    }
}
