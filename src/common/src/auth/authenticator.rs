//! API key validation against the configured key list.

use super::{AdminContext, AuthError};
use crate::config::{AuthConfig, Role};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Resolves bearer tokens to admin identities.
///
/// Keys are indexed by their SHA-256 hash so plaintext keys are not kept
/// beyond construction.
#[derive(Debug)]
pub struct Authenticator {
    enabled: bool,
    /// key_hash -> (key_name, role)
    api_keys: HashMap<String, (String, Role)>,
}

impl Authenticator {
    pub fn new(auth_config: &AuthConfig) -> Self {
        let api_keys = auth_config
            .api_keys
            .iter()
            .enumerate()
            .map(|(index, api_key)| {
                let name = api_key
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("key-{index}"));
                (Self::hash_api_key(&api_key.key), (name, api_key.role))
            })
            .collect();

        if !auth_config.enabled {
            log::warn!("Admin authentication is disabled; every request is treated as admin");
        }

        Self {
            enabled: auth_config.enabled,
            api_keys,
        }
    }

    /// Authenticate a request carrying `api_key` (the bearer token, if any).
    ///
    /// * `Ok(AdminContext)` - key is known and has the admin role
    /// * `Err(401)` - key missing or unknown
    /// * `Err(403)` - key is known but lacks the admin role
    pub fn authenticate(&self, api_key: Option<&str>) -> Result<AdminContext, AuthError> {
        if !self.enabled {
            return Ok(AdminContext::anonymous());
        }

        let api_key = api_key.ok_or_else(|| AuthError::unauthorized("Missing API key"))?;
        let (name, role) = self
            .api_keys
            .get(&Self::hash_api_key(api_key))
            .ok_or_else(|| AuthError::unauthorized("Invalid API key"))?;

        if *role != Role::Admin {
            return Err(AuthError::forbidden(format!(
                "API key '{name}' does not have the admin role"
            )));
        }

        Ok(AdminContext::new(name.clone(), *role))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            enabled: true,
            api_keys: vec![
                ApiKeyConfig {
                    key: "admin-secret".to_string(),
                    name: Some("ops".to_string()),
                    role: Role::Admin,
                },
                ApiKeyConfig {
                    key: "editor-secret".to_string(),
                    name: None,
                    role: Role::Editor,
                },
            ],
        }
    }

    #[test]
    fn test_hash_api_key() {
        let hash = Authenticator::hash_api_key("admin-secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, Authenticator::hash_api_key("admin-secret"));
        assert_ne!(hash, Authenticator::hash_api_key("editor-secret"));
    }

    #[test]
    fn test_admin_key_is_accepted() {
        let authenticator = Authenticator::new(&auth_config());
        let ctx = authenticator.authenticate(Some("admin-secret")).unwrap();
        assert_eq!(ctx, AdminContext::new("ops", Role::Admin));
    }

    #[test]
    fn test_missing_and_unknown_keys() {
        let authenticator = Authenticator::new(&auth_config());

        let err = authenticator.authenticate(None).unwrap_err();
        assert_eq!(err.status_code, 401);

        let err = authenticator.authenticate(Some("guess")).unwrap_err();
        assert_eq!(err.status_code, 401);
    }

    #[test]
    fn test_editor_key_is_forbidden() {
        let authenticator = Authenticator::new(&auth_config());
        let err = authenticator.authenticate(Some("editor-secret")).unwrap_err();
        assert_eq!(err.status_code, 403);
        assert!(err.message.contains("key-1"));
    }

    #[test]
    fn test_disabled_auth_admits_anonymous_admin() {
        let config = AuthConfig {
            enabled: false,
            api_keys: vec![],
        };
        let authenticator = Authenticator::new(&config);
        assert!(!authenticator.is_enabled());
        assert_eq!(
            authenticator.authenticate(None).unwrap(),
            AdminContext::anonymous()
        );
    }
}
