//! Opens and releases live watches against a [`RemoteStore`].

use crate::error::Result;
use crate::reference::Reference;
use crate::store::{EventSink, RemoteStore, WatchHandle};
use crate::types::Generation;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{Delivery, EventStream};

/// Default buffer for standalone subscriptions.
const DEFAULT_STREAM_BUFFER: usize = 256;

/// State shared between a subscription and its store-side sink.
struct Shared {
    /// Cleared on close; the sink forwards nothing once it is false.
    open: AtomicBool,
    /// Set when the consumer's buffer was full and an event was lost.
    overflowed: AtomicBool,
}

/// One live watch, opened for one reference.
///
/// Closing is idempotent and also happens on drop. After close no further
/// events are forwarded, even if the store's unsubscribe lags behind.
pub struct Subscription {
    reference: Reference,
    generation: Generation,
    handle: WatchHandle,
    shared: Arc<Shared>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    /// The reference this subscription watches.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Generation its deliveries are tagged with.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether the watch is still held.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Whether an event was dropped because the consumer fell behind.
    pub fn overflowed(&self) -> bool {
        self.shared.overflowed.load(Ordering::Acquire)
    }

    /// Release the watch. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.shared.open.swap(false, Ordering::AcqRel) {
            self.handle.unsubscribe();
            self.active.fetch_sub(1, Ordering::SeqCst);
            debug!(
                generation = %self.generation,
                reference = %self.reference,
                "subscription closed"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("reference", &self.reference)
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Opens exactly one store watch per subscription.
///
/// Cheap to clone; clones share the store and the active-subscription count.
#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn RemoteStore>,
    active: Arc<AtomicUsize>,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The store watches are opened against.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Open a subscription with its own event stream.
    pub fn open(&self, reference: &Reference) -> Result<(Subscription, EventStream)> {
        let (sender, receiver) = bounded(DEFAULT_STREAM_BUFFER);
        let subscription = self.open_into(reference, Generation::default(), sender)?;
        Ok((subscription, EventStream { receiver }))
    }

    /// Open a subscription whose events are tagged with `generation` and
    /// forwarded into `outbox`.
    ///
    /// Fails fast with `InvalidReference` before any watch is opened.
    pub fn open_into(
        &self,
        reference: &Reference,
        generation: Generation,
        outbox: Sender<Delivery>,
    ) -> Result<Subscription> {
        reference.validate()?;

        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            overflowed: AtomicBool::new(false),
        });

        let sink_shared = Arc::clone(&shared);
        let sink: EventSink = Arc::new(move |event| {
            if !sink_shared.open.load(Ordering::Acquire) {
                return;
            }
            match outbox.try_send(Delivery { generation, event }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(generation = %generation, "subscriber buffer full, event dropped");
                    sink_shared.overflowed.store(true, Ordering::Release);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        });

        let handle = self.store.watch(reference, sink)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(
            generation = %generation,
            reference = %reference,
            fingerprint = %reference.fingerprint(),
            "subscription opened"
        );

        Ok(Subscription {
            reference: reference.clone(),
            generation,
            handle,
            shared,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of subscriptions opened through this manager and not yet closed.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
