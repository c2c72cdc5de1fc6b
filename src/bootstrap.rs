//! First-login profile provisioning.
//!
//! [`IdentityBootstrap::on_auth`] is called every time the owner re-evaluates
//! the auth state. For a signed-in account it reads the profile document and
//! creates it with defaults when absent. A [`ProvisioningGuard`] keeps two
//! attempts from the same bootstrap instance from overlapping; it is local to
//! the instance, so other instances rely on the store's create-if-absent.

use crate::auth::{AccountIdentity, AuthState};
use crate::config::BootstrapConfig;
use crate::error::{BindError, ErrorKind, Result};
use crate::models::UserProfile;
use crate::reference::Reference;
use crate::store::RemoteStore;
use crate::subscriptions::Snapshot;
use crate::types::{to_fields, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The account identity is not known yet.
    Resolving,
    SignedOut,
    /// Another provisioning attempt is still running.
    InFlight,
}

/// What a single evaluation did. Informational only; failures are logged and
/// retried on the next evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Skipped(SkipReason),
    AlreadyExists,
    Created,
    Failed(ErrorKind),
}

/// In-flight flag, held for the duration of one provisioning attempt.
///
/// Released on drop, whatever the attempt's result.
pub struct ProvisioningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProvisioningGuard<'a> {
    /// Take the guard, or `None` if it is already held.
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProvisioningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct IdentityBootstrap {
    store: Arc<dyn RemoteStore>,
    config: BootstrapConfig,
    processing: AtomicBool,
}

impl IdentityBootstrap {
    pub fn new(store: Arc<dyn RemoteStore>, config: BootstrapConfig) -> Self {
        Self {
            store,
            config,
            processing: AtomicBool::new(false),
        }
    }

    /// Whether a provisioning attempt is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Ensure the signed-in account has a profile.
    pub fn on_auth(&self, auth: &AuthState) -> BootstrapOutcome {
        let identity = match auth {
            AuthState::Resolving => return BootstrapOutcome::Skipped(SkipReason::Resolving),
            AuthState::SignedOut => return BootstrapOutcome::Skipped(SkipReason::SignedOut),
            AuthState::SignedIn(identity) => identity,
        };

        let Some(_guard) = ProvisioningGuard::acquire(&self.processing) else {
            debug!(account = %identity.account_id, "provisioning already in flight");
            return BootstrapOutcome::Skipped(SkipReason::InFlight);
        };

        match self.provision(identity) {
            Ok(true) => {
                info!(account = %identity.account_id, "profile created");
                BootstrapOutcome::Created
            }
            Ok(false) => BootstrapOutcome::AlreadyExists,
            Err(e) => {
                warn!(account = %identity.account_id, error = %e, "profile provisioning failed");
                BootstrapOutcome::Failed(e.kind())
            }
        }
    }

    fn provision(&self, identity: &AccountIdentity) -> Result<bool> {
        let reference = Reference::document(&self.config.collection, &identity.account_id);

        match self.store.read_once(&reference)? {
            Snapshot::Found(_) => Ok(false),
            Snapshot::Missing => {
                let fields = to_fields(&self.default_profile(identity))?;
                self.store.create_if_absent(&reference, fields)
            }
            Snapshot::Collection(_) => Err(BindError::InvalidReference(format!(
                "{} did not resolve to a document",
                reference
            ))),
        }
    }

    /// Profile written for an account seen for the first time.
    pub fn default_profile(&self, identity: &AccountIdentity) -> UserProfile {
        UserProfile {
            uid: identity.account_id.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: Some(
                identity
                    .display_name
                    .clone()
                    .unwrap_or_else(|| self.config.anonymous_display_name.clone()),
            ),
            photo_url: identity.photo_url.clone(),
            role: self.config.default_role,
            newsletter_sub: self.config.newsletter_sub,
            mail_admin: self.config.mail_admin,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::{MemoryStore, Operation};
    use serde_json::json;

    fn bootstrap(store: &MemoryStore) -> IdentityBootstrap {
        IdentityBootstrap::new(Arc::new(store.clone()), BootstrapConfig::default())
    }

    fn signed_in(uid: &str) -> AuthState {
        AuthState::SignedIn(AccountIdentity::new(uid).with_email(format!("{}@example.com", uid)))
    }

    #[test]
    fn test_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let guard = ProvisioningGuard::acquire(&flag).unwrap();
        assert!(ProvisioningGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(ProvisioningGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_creates_missing_profile() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);

        assert_eq!(bootstrap.on_auth(&signed_in("u1")), BootstrapOutcome::Created);
        assert!(!bootstrap.is_processing());

        match store.read_once(&Reference::document("profiles", "u1")).unwrap() {
            Snapshot::Found(record) => {
                assert_eq!(record.get("uid"), Some(&json!("u1")));
                assert_eq!(record.get("role"), Some(&json!("user")));
                assert_eq!(record.get("newsletterSub"), Some(&json!(true)));
                assert_eq!(record.get("mailAdmin"), Some(&json!(true)));
                assert_eq!(record.get("displayName"), Some(&json!("Anonymous User")));
                assert!(record.get("createdAt").is_some());
            }
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_existing_profile_is_untouched() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);
        bootstrap.on_auth(&signed_in("u1"));
        crate::profile::set_role(&store, "profiles", "u1", Role::Admin).unwrap();
        let writes = store.write_count();

        assert_eq!(
            bootstrap.on_auth(&signed_in("u1")),
            BootstrapOutcome::AlreadyExists
        );
        assert_eq!(store.write_count(), writes);
        match store.read_once(&Reference::document("profiles", "u1")).unwrap() {
            Snapshot::Found(record) => assert_eq!(record.get("role"), Some(&json!("admin"))),
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_skips_without_account() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);
        assert_eq!(
            bootstrap.on_auth(&AuthState::Resolving),
            BootstrapOutcome::Skipped(SkipReason::Resolving)
        );
        assert_eq!(
            bootstrap.on_auth(&AuthState::SignedOut),
            BootstrapOutcome::Skipped(SkipReason::SignedOut)
        );
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_failure_releases_guard_and_retries() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);

        store.fail_next(Operation::Read);
        assert_eq!(
            bootstrap.on_auth(&signed_in("u1")),
            BootstrapOutcome::Failed(ErrorKind::TransportFailure)
        );
        assert!(!bootstrap.is_processing());

        store.fail_next(Operation::Write);
        assert_eq!(
            bootstrap.on_auth(&signed_in("u1")),
            BootstrapOutcome::Failed(ErrorKind::TransportFailure)
        );
        assert_eq!(store.write_count(), 0);

        assert_eq!(bootstrap.on_auth(&signed_in("u1")), BootstrapOutcome::Created);
    }

    #[test]
    fn test_identity_fields_are_copied() {
        let store = MemoryStore::new();
        let bootstrap = bootstrap(&store);
        let identity = AccountIdentity::new("u9")
            .with_email("nine@example.com")
            .with_display_name("Nine")
            .with_photo_url("https://example.com/9.png");

        let profile = bootstrap.default_profile(&identity);
        assert_eq!(profile.email, "nine@example.com");
        assert_eq!(profile.display_name.as_deref(), Some("Nine"));
        assert_eq!(profile.photo_url.as_deref(), Some("https://example.com/9.png"));
        assert_eq!(profile.role, Role::User);
    }
}
