//! Lifecycle-bound live bindings.
//!
//! A [`Binding`] keeps a [`BindingState`] in sync with whatever reference it
//! is currently pointed at. The owner drives it from its event loop:
//!
//! - [`Binding::set_reference`] on every re-evaluation. Structurally equal
//!   references are a no-op; a changed reference closes the old subscription,
//!   bumps the generation and opens a new one.
//! - [`Binding::pump`] to apply queued deliveries. Deliveries from older
//!   generations are discarded.
//! - [`Binding::detach`] (or drop) when the consumer goes away.

use crate::config::BindingConfig;
use crate::error::{BindError, ErrorKind, Result};
use crate::reference::Reference;
use crate::subscriptions::{Delivery, Event, Snapshot, Subscription, SubscriptionManager};
use crate::types::{Generation, WithId};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Shapes a binding can decode snapshots into.
pub trait SnapshotData: Sized {
    /// `Ok(None)` means "no data", e.g. a missing document.
    fn from_snapshot(snapshot: Snapshot) -> Result<Option<Self>>;
}

impl<T: DeserializeOwned> SnapshotData for WithId<T> {
    fn from_snapshot(snapshot: Snapshot) -> Result<Option<Self>> {
        match snapshot {
            Snapshot::Found(record) => record.decode().map(Some),
            Snapshot::Missing => Ok(None),
            Snapshot::Collection(_) => Err(BindError::InvalidReference(
                "document binding received a collection snapshot".into(),
            )),
        }
    }
}

impl<T: DeserializeOwned> SnapshotData for Vec<WithId<T>> {
    fn from_snapshot(snapshot: Snapshot) -> Result<Option<Self>> {
        match snapshot {
            Snapshot::Collection(records) => records
                .iter()
                .map(|r| r.decode())
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Snapshot::Found(record) => Ok(Some(vec![record.decode()?])),
            Snapshot::Missing => Ok(Some(Vec::new())),
        }
    }
}

/// What a consumer renders from.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingState<D> {
    pub data: Option<D>,
    /// True only until the current subscription's first snapshot or error.
    pub is_loading: bool,
    pub error: Option<ErrorKind>,
}

impl<D> BindingState<D> {
    /// No reference: nothing to load.
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }

    fn failed(kind: ErrorKind) -> Self {
        Self {
            data: None,
            is_loading: false,
            error: Some(kind),
        }
    }
}

impl<D> Default for BindingState<D> {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
    Settled,
}

/// Binding to a single document.
pub type DocBinding<T> = Binding<WithId<T>>;

/// Binding to a collection query.
pub type CollectionBinding<T> = Binding<Vec<WithId<T>>>;

/// Adapts a subscription to a consumer's lifecycle.
pub struct Binding<D> {
    manager: SubscriptionManager,
    inbox_tx: Sender<Delivery>,
    inbox: Receiver<Delivery>,
    reference: Option<Reference>,
    subscription: Option<Subscription>,
    generation: Generation,
    state: BindingState<D>,
    detached: bool,
}

impl<D: SnapshotData> Binding<D> {
    /// Create an idle binding with the default configuration.
    pub fn new(manager: SubscriptionManager) -> Self {
        Self::with_config(manager, &BindingConfig::default())
    }

    /// Create an idle binding with a custom configuration.
    pub fn with_config(manager: SubscriptionManager, config: &BindingConfig) -> Self {
        let (inbox_tx, inbox) = bounded(config.inbox_capacity.max(1));
        Self {
            manager,
            inbox_tx,
            inbox,
            reference: None,
            subscription: None,
            generation: Generation::default(),
            state: BindingState::idle(),
            detached: false,
        }
    }

    /// Point the binding at `reference`.
    ///
    /// Returns `true` if this changed the subscription. Passing a reference
    /// equal to the current one does nothing.
    pub fn set_reference(&mut self, reference: Option<Reference>) -> bool {
        if self.detached || reference == self.reference {
            return false;
        }
        self.resubscribe(reference);
        true
    }

    /// Reopen the current reference under a new generation.
    pub fn retry(&mut self) {
        if self.detached {
            return;
        }
        if let Some(reference) = self.reference.clone() {
            self.resubscribe(Some(reference));
        }
    }

    fn resubscribe(&mut self, reference: Option<Reference>) {
        self.close_subscription();
        // The closed sink forwards nothing more, so whatever is queued is stale.
        while self.inbox.try_recv().is_ok() {}
        self.generation = self.generation.next();
        self.reference = reference;

        let Some(reference) = self.reference.as_ref() else {
            self.state = BindingState::idle();
            return;
        };

        self.state = BindingState::pending();
        match self
            .manager
            .open_into(reference, self.generation, self.inbox_tx.clone())
        {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                warn!(
                    generation = %self.generation,
                    reference = %reference,
                    error = %e,
                    "failed to open subscription"
                );
                self.state = BindingState::failed(e.kind());
            }
        }
    }

    fn close_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    /// Apply every queued delivery. Returns how many changed the state.
    pub fn pump(&mut self) -> usize {
        if self.detached {
            return 0;
        }
        let mut applied = 0;
        while let Ok(delivery) = self.inbox.try_recv() {
            if self.apply(delivery) {
                applied += 1;
            }
        }
        self.check_overflow();
        applied
    }

    /// Wait up to `timeout` for a delivery, then drain like [`Binding::pump`].
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        if self.detached {
            return 0;
        }
        let mut applied = 0;
        if let Ok(delivery) = self.inbox.recv_timeout(timeout) {
            if self.apply(delivery) {
                applied += 1;
            }
        }
        applied + self.pump()
    }

    fn apply(&mut self, delivery: Delivery) -> bool {
        if delivery.generation != self.generation || self.subscription.is_none() {
            debug!(
                stale = %delivery.generation,
                current = %self.generation,
                "discarding stale delivery"
            );
            return false;
        }

        match delivery.event {
            Event::Snapshot(snapshot) => match D::from_snapshot(snapshot) {
                Ok(data) => {
                    self.state = BindingState {
                        data,
                        is_loading: false,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(generation = %self.generation, error = %e, "snapshot rejected");
                    self.state = BindingState::failed(e.kind());
                }
            },
            Event::Failure { kind, message } => {
                warn!(
                    generation = %self.generation,
                    reference = ?self.reference,
                    message = %message,
                    "live binding failed"
                );
                self.state = BindingState::failed(kind);
                self.close_subscription();
            }
        }
        true
    }

    fn check_overflow(&mut self) {
        let overflowed = self
            .subscription
            .as_ref()
            .map(|s| s.overflowed())
            .unwrap_or(false);
        if overflowed {
            warn!(generation = %self.generation, "binding fell behind its subscription");
            self.state = BindingState::failed(ErrorKind::TransportFailure);
            self.close_subscription();
        }
    }

    /// Release the subscription. No state changes happen afterwards.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.close_subscription();
        while self.inbox.try_recv().is_ok() {}
    }
}

impl<D> Binding<D> {
    /// Current state for the bound reference.
    pub fn state(&self) -> &BindingState<D> {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        if self.reference.is_none() {
            Phase::Idle
        } else if self.state.is_loading {
            Phase::Pending
        } else {
            Phase::Settled
        }
    }

    /// The reference currently bound, if any.
    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether a live watch is currently held.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().map(|s| s.is_open()).unwrap_or(false)
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl<D> Drop for Binding<D> {
    fn drop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }
}
