//! # Live Bindings
//!
//! Keeps consumer-facing state in sync with a live document store, and
//! provisions a default profile the first time an account signs in.
//!
//! ## Core Concepts
//!
//! - **References**: structural descriptions of a document or a filtered,
//!   ordered collection query, compared by value
//! - **Subscriptions**: exactly one live store watch per opened reference
//! - **Bindings**: `{data, is_loading, error}` state that follows a reference,
//!   resubscribing on identity change and discarding stale deliveries
//! - **Bootstrap**: at-most-once profile creation per account and instance
//!
//! ## Example
//!
//! ```ignore
//! use livebind::{auth, IdentityBootstrap, MemoryStore, ProfileBinding, SubscriptionManager};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let manager = SubscriptionManager::new(store.clone());
//! let mut profile = ProfileBinding::new(manager, &Default::default());
//! let bootstrap = IdentityBootstrap::new(store, Default::default());
//!
//! let (publisher, mut feed) = auth::channel();
//! publisher.sign_in(auth::AccountIdentity::new("u1"));
//!
//! if let Some(state) = feed.poll() {
//!     profile.on_auth(state);
//!     bootstrap.on_auth(state);
//! }
//! profile.pump();
//! ```

pub mod auth;
pub mod binding;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod profile;
pub mod reference;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use auth::{AccountIdentity, AuthFeed, AuthPublisher, AuthState};
pub use binding::{Binding, BindingState, CollectionBinding, DocBinding, Phase, SnapshotData};
pub use bootstrap::{BootstrapOutcome, IdentityBootstrap, ProvisioningGuard, SkipReason};
pub use config::{BindingConfig, BootstrapConfig, Config, GateConfig, ProfileConfig};
pub use error::{BindError, ErrorKind, Result};
pub use gate::{AccessGate, GateDecision, Navigator};
pub use models::{Role, UserProfile};
pub use profile::{profile_reference, set_newsletter_sub, set_role, ProfileBinding};
pub use reference::{Direction, Filter, FilterOp, Memo, OrderBy, Query, Reference};
pub use store::{EventSink, MemoryStore, Operation, RemoteStore, WatchHandle};
pub use subscriptions::{
    Delivery, Event, EventStream, Snapshot, Subscription, SubscriptionManager,
};
pub use types::{to_fields, Fields, Generation, Record, Timestamp, WithId};
