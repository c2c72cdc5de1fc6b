//! Authentication state as seen by bindings and provisioning.
//!
//! The identity provider itself lives outside this crate; it publishes
//! transitions through an [`AuthPublisher`] and consumers read the latest
//! state from an [`AuthFeed`].

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Raw identity fields supplied by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountIdentity {
    pub account_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl AccountIdentity {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            email: None,
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    /// The provider has not reported yet.
    #[default]
    Resolving,
    SignedOut,
    SignedIn(AccountIdentity),
}

impl AuthState {
    pub fn is_resolving(&self) -> bool {
        matches!(self, AuthState::Resolving)
    }

    pub fn account(&self) -> Option<&AccountIdentity> {
        match self {
            AuthState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account().map(|a| a.account_id.as_str())
    }
}

/// Create a connected publisher/feed pair. The feed starts out `Resolving`.
pub fn channel() -> (AuthPublisher, AuthFeed) {
    let (sender, receiver) = unbounded();
    (
        AuthPublisher { sender },
        AuthFeed {
            receiver,
            current: AuthState::Resolving,
        },
    )
}

/// Provider side of the auth channel.
#[derive(Clone)]
pub struct AuthPublisher {
    sender: Sender<AuthState>,
}

impl AuthPublisher {
    /// Publish a transition. Returns false if the feed is gone.
    pub fn publish(&self, state: AuthState) -> bool {
        self.sender.send(state).is_ok()
    }

    pub fn sign_in(&self, identity: AccountIdentity) -> bool {
        self.publish(AuthState::SignedIn(identity))
    }

    pub fn sign_out(&self) -> bool {
        self.publish(AuthState::SignedOut)
    }
}

/// Consumer side of the auth channel; remembers the latest state.
pub struct AuthFeed {
    receiver: Receiver<AuthState>,
    current: AuthState,
}

impl AuthFeed {
    /// Drain pending transitions. Returns the new state if it changed.
    pub fn poll(&mut self) -> Option<&AuthState> {
        let mut changed = false;
        for state in self.receiver.try_iter() {
            if state != self.current {
                debug!(account = ?state.account_id(), "auth state changed");
                self.current = state;
                changed = true;
            }
        }
        if changed {
            Some(&self.current)
        } else {
            None
        }
    }

    pub fn current(&self) -> &AuthState {
        &self.current
    }
}
