//! Page-level access gate.

use crate::auth::AuthState;
use crate::binding::BindingState;
use crate::config::GateConfig;
use crate::error::ErrorKind;
use crate::models::UserProfile;
use crate::types::WithId;
use tracing::info;

/// Receives redirects issued by a gate.
pub trait Navigator {
    fn redirect(&mut self, path: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Identity or profile still loading; no decision yet.
    Pending,
    Granted,
    /// Signed in without the required role.
    Denied,
    /// Signed out on a protected page.
    RedirectToLogin,
}

impl GateDecision {
    pub fn is_granted(self) -> bool {
        self == GateDecision::Granted
    }

    /// Error classification of a settled refusal.
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            GateDecision::Denied | GateDecision::RedirectToLogin => Some(ErrorKind::NotAuthorized),
            GateDecision::Pending | GateDecision::Granted => None,
        }
    }
}

/// Decides access for one protected page.
pub struct AccessGate {
    admin_only: bool,
    config: GateConfig,
    /// Set once the login redirect for the current signed-out state was sent.
    redirected: bool,
}

impl AccessGate {
    pub fn new(admin_only: bool, config: GateConfig) -> Self {
        Self {
            admin_only,
            config,
            redirected: false,
        }
    }

    /// Gate for pages any signed-in account may see.
    pub fn signed_in(config: GateConfig) -> Self {
        Self::new(false, config)
    }

    /// Gate for pages restricted to `config.required_role`.
    pub fn admin_only(config: GateConfig) -> Self {
        Self::new(true, config)
    }

    /// Decide access from the current auth and profile states.
    ///
    /// The login redirect is issued at most once per signed-out period and
    /// never while anything is loading.
    pub fn evaluate(
        &mut self,
        auth: &AuthState,
        profile: &BindingState<WithId<UserProfile>>,
        navigator: &mut dyn Navigator,
    ) -> GateDecision {
        if auth.is_resolving() || profile.is_loading {
            return GateDecision::Pending;
        }

        let Some(identity) = auth.account() else {
            if !self.redirected {
                self.redirected = true;
                info!(path = %self.config.login_path, "redirecting to login");
                navigator.redirect(&self.config.login_path);
            }
            return GateDecision::RedirectToLogin;
        };
        self.redirected = false;

        if !self.admin_only {
            return GateDecision::Granted;
        }

        let role = profile.data.as_ref().map(|p| p.data.role);
        if role == Some(self.config.required_role) {
            GateDecision::Granted
        } else {
            info!(account = %identity.account_id, ?role, "access denied");
            GateDecision::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountIdentity;
    use crate::models::Role;
    use crate::types::Timestamp;

    #[derive(Default)]
    struct RecordingNavigator {
        redirects: Vec<String>,
    }

    impl Navigator for RecordingNavigator {
        fn redirect(&mut self, path: &str) {
            self.redirects.push(path.to_string());
        }
    }

    fn profile_state(role: Role) -> BindingState<WithId<UserProfile>> {
        BindingState {
            data: Some(WithId {
                id: "u1".into(),
                data: UserProfile {
                    uid: "u1".into(),
                    email: String::new(),
                    display_name: None,
                    photo_url: None,
                    role,
                    newsletter_sub: false,
                    mail_admin: false,
                    created_at: Timestamp(0),
                },
            }),
            is_loading: false,
            error: None,
        }
    }

    fn signed_in() -> AuthState {
        AuthState::SignedIn(AccountIdentity::new("u1"))
    }

    #[test]
    fn test_pending_while_loading() {
        let mut gate = AccessGate::admin_only(GateConfig::default());
        let mut nav = RecordingNavigator::default();

        assert_eq!(
            gate.evaluate(&AuthState::Resolving, &BindingState::idle(), &mut nav),
            GateDecision::Pending
        );
        assert_eq!(
            gate.evaluate(&signed_in(), &BindingState::pending(), &mut nav),
            GateDecision::Pending
        );
        assert!(nav.redirects.is_empty());
    }

    #[test]
    fn test_admin_role_required() {
        let mut gate = AccessGate::admin_only(GateConfig::default());
        let mut nav = RecordingNavigator::default();

        let granted = gate.evaluate(&signed_in(), &profile_state(Role::Admin), &mut nav);
        assert!(granted.is_granted());

        let denied = gate.evaluate(&signed_in(), &profile_state(Role::User), &mut nav);
        assert_eq!(denied, GateDecision::Denied);
        assert_eq!(denied.error_kind(), Some(ErrorKind::NotAuthorized));

        let missing = gate.evaluate(&signed_in(), &BindingState::idle(), &mut nav);
        assert_eq!(missing, GateDecision::Denied);
    }

    #[test]
    fn test_signed_in_gate_ignores_role() {
        let mut gate = AccessGate::signed_in(GateConfig::default());
        let mut nav = RecordingNavigator::default();
        assert_eq!(
            gate.evaluate(&signed_in(), &profile_state(Role::User), &mut nav),
            GateDecision::Granted
        );
    }

    #[test]
    fn test_redirect_once_per_signed_out_period() {
        let mut gate = AccessGate::signed_in(GateConfig::default());
        let mut nav = RecordingNavigator::default();

        for _ in 0..3 {
            assert_eq!(
                gate.evaluate(&AuthState::SignedOut, &BindingState::idle(), &mut nav),
                GateDecision::RedirectToLogin
            );
        }
        assert_eq!(nav.redirects, vec!["/login".to_string()]);

        gate.evaluate(&signed_in(), &profile_state(Role::User), &mut nav);
        gate.evaluate(&AuthState::SignedOut, &BindingState::idle(), &mut nav);
        assert_eq!(nav.redirects.len(), 2);
    }
}
