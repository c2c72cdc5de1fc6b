//! Live watch subscriptions.
//!
//! A [`Subscription`] owns exactly one store watch, opened for one
//! [`Reference`](crate::Reference). Events flow out as [`Delivery`] values
//! tagged with the subscription's generation, either into a caller-provided
//! channel (how bindings consume them) or into a standalone [`EventStream`].
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(Arc::new(MemoryStore::new()));
//! let (mut sub, stream) = manager.open(&Reference::document("profiles", "u1"))?;
//!
//! while let Some(event) = stream.recv() {
//!     match event {
//!         Event::Snapshot(Snapshot::Found(record)) => println!("profile: {:?}", record),
//!         Event::Snapshot(_) => {}
//!         Event::Failure { message, .. } => break,
//!     }
//! }
//! sub.close();
//! ```

mod manager;
mod types;

pub use manager::{Subscription, SubscriptionManager};
pub use types::{Delivery, Event, EventStream, Snapshot};
