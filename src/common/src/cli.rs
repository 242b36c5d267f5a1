use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Overrides for the HTTP listener
#[derive(Parser, Debug, Clone, Default)]
pub struct ServerArgs {
    #[arg(long, env = "ISYNERGIES_BIND", help = "Address to bind the HTTP server to")]
    pub bind: Option<String>,

    #[arg(long, env = "ISYNERGIES_PORT", help = "Port for the HTTP server")]
    pub port: Option<u16>,
}

/// Common subcommands
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    const REDACTED: &str = "<redacted>";

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Apply `--bind` / `--port` overrides.
    pub fn apply_server_args(config: &mut Configuration, args: &ServerArgs) {
        if let Some(bind) = &args.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
    }

    /// Copy of the configuration with secrets masked.
    pub fn redacted(config: &Configuration) -> Configuration {
        let mut config = config.clone();
        if config.storage.token.is_some() {
            config.storage.token = Some(REDACTED.to_string());
        }
        for api_key in &mut config.auth.api_keys {
            api_key.key = REDACTED.to_string();
        }
        config
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        let config = redacted(config);
        if json {
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("iSynergies Configuration:");
            println!("=========================");
            println!(
                "Server: {}:{} ({:?})",
                config.server.bind, config.server.port, config.server.environment
            );
            println!("Database DSN: {}", config.database.dsn);
            println!("Storage DSN: {}", config.storage.dsn);
            println!("Storage public URL: {}", config.storage.public_url);
            println!(
                "Storage credential: {}",
                if config.storage.token.is_some() {
                    "configured"
                } else {
                    "not configured (blob cleanup disabled)"
                }
            );
            println!(
                "Auth: {} ({} API keys)",
                if config.auth.enabled { "enabled" } else { "disabled" },
                config.auth.api_keys.len()
            );
            println!(
                "Blob cleanup: batch size {}, batch delay {:?}, page size {}",
                config.blob_cleanup.batch_size,
                config.blob_cleanup.batch_delay,
                config.blob_cleanup.page_size
            );
            println!("Cache TTL: {:?}", config.cache.ttl);
            println!(
                "Drafts: {:?} backend, debounce {:?}, ttl {:?}",
                config.drafts.backend, config.drafts.debounce, config.drafts.ttl
            );
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.database.dsn.is_empty() {
            anyhow::bail!("Database DSN cannot be empty");
        }

        if config.storage.dsn.is_empty() {
            anyhow::bail!("Storage DSN cannot be empty");
        }

        if config.storage.public_url.trim_end_matches('/').is_empty() {
            anyhow::bail!("Storage public URL cannot be empty");
        }

        config
            .blob_cleanup
            .validate()
            .context("Invalid blob_cleanup configuration")?;

        if config.auth.enabled && config.auth.api_keys.is_empty() {
            log::warn!("Auth is enabled but no API keys are configured; admin endpoints are unreachable");
        }

        if let Some(api_key) = config.auth.api_keys.iter().find(|k| k.key.trim().is_empty()) {
            anyhow::bail!(
                "API key '{}' has an empty key",
                api_key.name.as_deref().unwrap_or("unnamed")
            );
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that don't start the server. Returns `true` when the
    /// command was handled.
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeyConfig, Configuration, Role};

    #[test]
    fn test_common_commands_default() {
        assert!(matches!(CommonCommands::default(), CommonCommands::Start));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_server_args_override() {
        let mut config = Configuration::default();
        let args = ServerArgs {
            bind: Some("127.0.0.1".to_string()),
            port: None,
        };
        let default_port = config.server.port;
        utils::apply_server_args(&mut config, &args);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, default_port);
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Configuration::default();
        config.storage.token = Some("rw-secret".to_string());
        config.auth.api_keys.push(ApiKeyConfig {
            key: "admin-secret".to_string(),
            name: None,
            role: Role::Admin,
        });

        let json = serde_json::to_string(&utils::redacted(&config)).unwrap();
        assert!(!json.contains("rw-secret"));
        assert!(!json.contains("admin-secret"));
    }

    #[test]
    fn test_validate_config() {
        let config = Configuration::default();
        assert!(utils::validate_config(&config).is_ok());

        let mut config = Configuration::default();
        config.blob_cleanup.batch_size = 0;
        assert!(utils::validate_config(&config).is_err());

        let mut config = Configuration::default();
        config.auth.api_keys.push(ApiKeyConfig {
            key: " ".to_string(),
            name: Some("blank".to_string()),
            role: Role::Admin,
        });
        assert!(utils::validate_config(&config).is_err());
    }
}
