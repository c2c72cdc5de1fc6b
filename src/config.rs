//! Configuration for bindings, profile lookup, provisioning and gating.

use crate::error::Result;
use crate::models::Role;
use serde::{Deserialize, Serialize};

/// Collection holding one profile document per account.
pub const DEFAULT_PROFILE_COLLECTION: &str = "profiles";

/// Binding configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Max queued deliveries before the binding is considered too slow.
    /// Default: 1024
    pub inbox_capacity: usize,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub collection: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_PROFILE_COLLECTION.to_string(),
        }
    }
}

/// Defaults written into a freshly provisioned profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub collection: String,
    pub default_role: Role,
    pub newsletter_sub: bool,
    pub mail_admin: bool,
    /// Display name used when the identity provider has none.
    pub anonymous_display_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_PROFILE_COLLECTION.to_string(),
            default_role: Role::User,
            newsletter_sub: true,
            mail_admin: true,
            anonymous_display_name: "Anonymous User".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Where unauthenticated visitors of protected pages are sent.
    pub login_path: String,
    /// Role required by admin-only pages.
    pub required_role: Role,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            required_role: Role::Admin,
        }
    }
}

/// All configuration in one place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub binding: BindingConfig,
    pub profile: ProfileConfig,
    pub bootstrap: BootstrapConfig,
    pub gate: GateConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections and fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{"profile": {"collection": "users"}, "bootstrap": {"newsletter_sub": false}}"#,
        )
        .unwrap();

        assert_eq!(config.profile.collection, "users");
        assert!(!config.bootstrap.newsletter_sub);
        assert_eq!(config.bootstrap.collection, DEFAULT_PROFILE_COLLECTION);
        assert_eq!(config.bootstrap.default_role, Role::User);
        assert_eq!(config.binding.inbox_capacity, 1024);
        assert_eq!(config.gate.login_path, "/login");
    }

    #[test]
    fn test_invalid_json() {
        assert!(Config::from_json_str("{not json").is_err());
    }
}
