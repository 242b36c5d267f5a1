//! Test configuration builder for creating test setups quickly.

use crate::config::{
    ApiKeyConfig, Configuration, DatabaseConfig, DraftBackendKind, Environment, Role,
    StorageConfig,
};
use std::time::Duration;

/// Builder for creating test configurations.
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_storage_token("rw-token")
///     .with_admin_key("admin-key")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Configure for fully in-memory operation.
    ///
    /// Uses `memory://` storage, an in-memory SQLite database, in-memory
    /// drafts and no batch delay so tests don't sleep.
    pub fn in_memory(mut self) -> Self {
        self.config.storage = StorageConfig {
            dsn: "memory://".to_string(),
            ..self.config.storage
        };
        self.config.database = DatabaseConfig::in_memory();
        self.config.drafts.backend = DraftBackendKind::Memory;
        self.config.blob_cleanup.batch_delay = Duration::ZERO;
        self
    }

    /// Set the storage access credential.
    pub fn with_storage_token(mut self, token: &str) -> Self {
        self.config.storage.token = Some(token.to_string());
        self
    }

    pub fn with_public_url(mut self, public_url: &str) -> Self {
        self.config.storage.public_url = public_url.to_string();
        self
    }

    /// Add an API key with the admin role.
    pub fn with_admin_key(self, key: &str) -> Self {
        self.with_api_key(key, Role::Admin)
    }

    /// Add an API key with the editor role.
    pub fn with_editor_key(self, key: &str) -> Self {
        self.with_api_key(key, Role::Editor)
    }

    fn with_api_key(mut self, key: &str, role: Role) -> Self {
        self.config.auth.enabled = true;
        self.config.auth.api_keys.push(ApiKeyConfig {
            key: key.to_string(),
            name: Some(format!("{key}-name")),
            role,
        });
        self
    }

    /// Admit every request as an anonymous admin.
    pub fn auth_disabled(mut self) -> Self {
        self.config.auth.enabled = false;
        self
    }

    /// Report error details in responses.
    pub fn development(mut self) -> Self {
        self.config.server.environment = Environment::Development;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.blob_cleanup.batch_size = batch_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.blob_cleanup.page_size = page_size;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Configuration {
        self.config
    }
}
