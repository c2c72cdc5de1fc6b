//! Profile binding keyed by the signed-in account.

use crate::auth::AuthState;
use crate::binding::{BindingState, DocBinding, Phase};
use crate::config::{BindingConfig, ProfileConfig};
use crate::error::Result;
use crate::models::{Role, UserProfile};
use crate::reference::{Memo, Reference};
use crate::store::RemoteStore;
use crate::subscriptions::SubscriptionManager;
use crate::types::{to_fields, WithId};
use serde_json::json;
use tracing::info;

/// Reference to an account's profile document, or `None` without an account.
pub fn profile_reference(collection: &str, account_id: Option<&str>) -> Option<Reference> {
    account_id.map(|id| Reference::document(collection, id))
}

/// Live view of the current account's profile.
///
/// Loading while the account is still resolving, idle when signed out.
pub struct ProfileBinding {
    collection: String,
    inner: DocBinding<UserProfile>,
    reference: Memo<Option<String>, Option<Reference>>,
    auth_resolving: bool,
}

impl ProfileBinding {
    pub fn new(manager: SubscriptionManager, config: &ProfileConfig) -> Self {
        Self::with_binding_config(manager, config, &BindingConfig::default())
    }

    pub fn with_binding_config(
        manager: SubscriptionManager,
        config: &ProfileConfig,
        binding: &BindingConfig,
    ) -> Self {
        Self {
            collection: config.collection.clone(),
            inner: DocBinding::with_config(manager, binding),
            reference: Memo::new(),
            auth_resolving: true,
        }
    }

    /// Re-evaluate against the latest auth state.
    pub fn on_auth(&mut self, auth: &AuthState) {
        self.auth_resolving = auth.is_resolving();
        let account_id = auth.account_id().map(str::to_string);
        let collection = &self.collection;
        let reference = self
            .reference
            .get(&account_id, |id| profile_reference(collection, id.as_deref()));
        self.inner.set_reference(reference);
    }

    pub fn pump(&mut self) -> usize {
        self.inner.pump()
    }

    /// Composite state: loading while auth resolves or the profile loads.
    pub fn state(&self) -> BindingState<WithId<UserProfile>> {
        let mut state = self.inner.state().clone();
        state.is_loading = state.is_loading || self.auth_resolving;
        state
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.inner.state().data.as_ref().map(|p| &p.data)
    }

    pub fn is_loading(&self) -> bool {
        self.auth_resolving || self.inner.state().is_loading
    }

    pub fn phase(&self) -> Phase {
        if self.auth_resolving {
            Phase::Pending
        } else {
            self.inner.phase()
        }
    }

    pub fn binding(&self) -> &DocBinding<UserProfile> {
        &self.inner
    }

    pub fn retry(&mut self) {
        self.inner.retry();
    }

    pub fn detach(&mut self) {
        self.inner.detach();
    }
}

/// Change an account's role.
pub fn set_role(store: &dyn RemoteStore, collection: &str, uid: &str, role: Role) -> Result<()> {
    store.merge(
        &Reference::document(collection, uid),
        to_fields(&json!({ "role": role }))?,
    )?;
    info!(uid, %role, "role updated");
    Ok(())
}

/// Change an account's newsletter subscription.
pub fn set_newsletter_sub(
    store: &dyn RemoteStore,
    collection: &str,
    uid: &str,
    subscribed: bool,
) -> Result<()> {
    store.merge(
        &Reference::document(collection, uid),
        to_fields(&json!({ "newsletterSub": subscribed }))?,
    )?;
    info!(uid, subscribed, "newsletter subscription updated");
    Ok(())
}
