//! Provisioning guard and cross-thread delivery tests.

use crossbeam_channel::{unbounded, Receiver, Sender};
use livebind::{
    AccountIdentity, AuthState, BootstrapConfig, BootstrapOutcome, DocBinding, EventSink, Fields,
    IdentityBootstrap, MemoryStore, Reference, RemoteStore, Result, SkipReason, Snapshot,
    SubscriptionManager, UserProfile, WatchHandle,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Blocks every read until the test releases it.
struct GatedStore {
    inner: MemoryStore,
    entered: Sender<()>,
    release: Receiver<()>,
    creates: AtomicUsize,
}

impl RemoteStore for GatedStore {
    fn watch(&self, reference: &Reference, sink: EventSink) -> Result<WatchHandle> {
        self.inner.watch(reference, sink)
    }

    fn read_once(&self, reference: &Reference) -> Result<Snapshot> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.inner.read_once(reference)
    }

    fn create_if_absent(&self, reference: &Reference, fields: Fields) -> Result<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_if_absent(reference, fields)
    }

    fn merge(&self, reference: &Reference, fields: Fields) -> Result<()> {
        self.inner.merge(reference, fields)
    }
}

fn signed_in(uid: &str) -> AuthState {
    AuthState::SignedIn(AccountIdentity::new(uid))
}

#[test]
fn test_reevaluation_while_in_flight_is_a_noop() {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let store = Arc::new(GatedStore {
        inner: MemoryStore::new(),
        entered: entered_tx,
        release: release_rx,
        creates: AtomicUsize::new(0),
    });
    let bootstrap = Arc::new(IdentityBootstrap::new(
        store.clone(),
        BootstrapConfig::default(),
    ));

    let worker = {
        let bootstrap = Arc::clone(&bootstrap);
        thread::spawn(move || bootstrap.on_auth(&signed_in("u1")))
    };

    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("provisioning read never started");
    assert!(bootstrap.is_processing());

    for _ in 0..5 {
        assert_eq!(
            bootstrap.on_auth(&signed_in("u1")),
            BootstrapOutcome::Skipped(SkipReason::InFlight)
        );
    }

    release_tx.send(()).unwrap();
    assert_eq!(worker.join().unwrap(), BootstrapOutcome::Created);
    assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    assert!(!bootstrap.is_processing());

    // Next evaluation finds the profile and writes nothing.
    release_tx.send(()).unwrap();
    assert_eq!(
        bootstrap.on_auth(&signed_in("u1")),
        BootstrapOutcome::AlreadyExists
    );
    assert_eq!(store.creates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_independent_instances_converge_on_one_profile() {
    let store = MemoryStore::new();
    let instances = 4;
    let barrier = Arc::new(Barrier::new(instances));

    let handles: Vec<_> = (0..instances)
        .map(|_| {
            let bootstrap =
                IdentityBootstrap::new(Arc::new(store.clone()), BootstrapConfig::default());
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                bootstrap.on_auth(&signed_in("u1"))
            })
        })
        .collect();

    let outcomes: Vec<BootstrapOutcome> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created = outcomes
        .iter()
        .filter(|o| **o == BootstrapOutcome::Created)
        .count();
    assert_eq!(created, 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, BootstrapOutcome::Created | BootstrapOutcome::AlreadyExists)));
    assert_eq!(store.write_count(), 1);
}

#[test]
fn test_binding_receives_writes_from_other_threads() {
    let store = MemoryStore::new();
    let manager = SubscriptionManager::new(Arc::new(store.clone()));
    let mut binding: DocBinding<UserProfile> = DocBinding::new(manager);
    binding.set_reference(Some(Reference::document("profiles", "u1")));
    binding.pump();
    assert!(binding.state().data.is_none());

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            let bootstrap =
                IdentityBootstrap::new(Arc::new(store), BootstrapConfig::default());
            bootstrap.on_auth(&signed_in("u1"))
        })
    };

    let mut applied = 0;
    for _ in 0..50 {
        applied += binding.pump_timeout(Duration::from_millis(100));
        if applied > 0 {
            break;
        }
    }
    assert_eq!(writer.join().unwrap(), BootstrapOutcome::Created);
    assert_eq!(applied, 1);
    assert_eq!(binding.state().data.as_ref().unwrap().data.uid, "u1");
}
