use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Deployment environment. Controls how much error detail leaves the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0"),
            port: 3000,
            environment: Environment::Production,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/isynergies.db"),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Blob storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store DSN (memory://, file:///path, s3://host/bucket)
    pub dsn: String,
    /// Public base URL under which stored blobs are served. Database rows
    /// reference blobs by `{public_url}/{path}`.
    pub public_url: String,
    /// Read/write access credential. Blob maintenance is skipped when unset.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
            public_url: String::from("https://blob.isynergies.local"),
            token: None,
        }
    }
}

impl StorageConfig {
    /// Returns the access credential when one is configured and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_keys: Vec::new(),
        }
    }
}

/// Blob cleanup tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobCleanupConfig {
    /// Number of blobs per bulk delete request
    pub batch_size: usize,
    /// Pause between deletion batches
    #[serde(with = "humantime_serde")]
    pub batch_delay: Duration,
    /// Objects requested per storage listing page
    pub page_size: usize,
    /// Listing cap used when the caller passes no `limit`
    pub default_limit: usize,
    /// Number of orphaned keys returned by the stats endpoint
    pub sample_size: usize,
}

impl Default for BlobCleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
            page_size: 1000,
            default_limit: 1000,
            sample_size: 100,
        }
    }
}

impl BlobCleanupConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be positive, got {}", self.batch_size);
        }

        if self.page_size == 0 {
            anyhow::bail!("page_size must be positive, got {}", self.page_size);
        }

        if self.default_limit == 0 {
            anyhow::bail!(
                "default_limit must be positive, got {}",
                self.default_limit
            );
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default time-to-live for cached responses
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftBackendKind {
    #[default]
    Database,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DraftsConfig {
    /// Quiet period after the last save before a draft is persisted
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    /// Age after which a persisted draft is discarded
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(default)]
    pub backend: DraftBackendKind,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            ttl: Duration::from_secs(24 * 3600),
            backend: DraftBackendKind::Database,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfig,
    /// Content database holding the `images`, `media` and `drafts` tables
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub blob_cleanup: BlobCleanupConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub drafts: DraftsConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file("isynergies.toml"))
            .extract()
            .map_err(Box::new)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(path)).extract().map_err(Box::new)
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed("ISYNERGIES__").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.database.dsn, "sqlite://.data/isynergies.db");
        assert_eq!(config.storage.dsn, "memory://");
        assert!(config.storage.credential().is_none());
        assert!(config.auth.enabled);
        assert_eq!(config.blob_cleanup.batch_size, 50);
        assert_eq!(config.blob_cleanup.sample_size, 100);
        assert_eq!(config.blob_cleanup.batch_delay, Duration::from_millis(100));
        assert_eq!(config.server.environment, Environment::Production);
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.drafts.backend, DraftBackendKind::Database);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "isynergies.toml",
                r#"
                [server]
                bind = "127.0.0.1"
                port = 8080
                environment = "development"

                [storage]
                dsn = "memory://"
                public_url = "https://cdn.example.com"
                token = "rw-token"

                [blob_cleanup]
                batch_size = 10
                batch_delay = "250ms"
                page_size = 200
                default_limit = 500
                sample_size = 20

                [[auth.api_keys]]
                key = "secret"
                name = "ops"
                role = "admin"
                "#,
            )?;
            jail.set_env("ISYNERGIES__DATABASE__DSN", "sqlite://./test.db");
            jail.set_env("ISYNERGIES__CACHE__TTL", "5m");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.server.port, 8080);
            assert!(config.server.environment.is_development());
            assert_eq!(config.storage.credential(), Some("rw-token"));
            assert_eq!(config.blob_cleanup.batch_size, 10);
            assert_eq!(config.blob_cleanup.batch_delay, Duration::from_millis(250));
            assert_eq!(config.auth.api_keys.len(), 1);
            assert_eq!(config.auth.api_keys[0].role, Role::Admin);
            assert_eq!(config.database.dsn, "sqlite://./test.db");
            assert_eq!(config.cache.ttl, Duration::from_secs(300));
            Ok(())
        });
    }

    #[test]
    fn test_blank_token_is_not_a_credential() {
        let storage = StorageConfig {
            token: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(storage.credential().is_none());
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let config = BlobCleanupConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(BlobCleanupConfig::default().validate().is_ok());
    }
}
