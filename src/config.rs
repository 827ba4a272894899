use crate::error::OptionsResult;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Plugin identity. The name doubles as the persistence key for the
/// options blob and as the prefix for token field/action names.
#[derive(Debug, Deserialize, Clone)]
pub struct PluginConfig {
    #[serde(default = "default_plugin_name")]
    pub name: String,
    #[serde(default = "default_plugin_version")]
    pub version: String,
}

fn default_plugin_name() -> String {
    "plugin_options".to_string()
}

fn default_plugin_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            version: default_plugin_version(),
        }
    }
}

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Origin that interactive admin submissions must be referred from,
    /// e.g. `https://example.com/admin`.
    pub admin_origin: String,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Request token settings
#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    /// Secret key material for token issuance. A random key is generated
    /// at startup when left empty, which invalidates tokens on restart.
    #[serde(default)]
    pub secret: String,
    /// How long an issued token stays valid
    #[serde(default = "default_token_lifetime")]
    pub lifetime_secs: u64,
    /// Request field the token is submitted under; empty uses `<plugin>_nonce`
    #[serde(default)]
    pub field: String,
    /// Action tokens are bound to; empty uses `<plugin>_nonce`
    #[serde(default)]
    pub action: String,
}

fn default_token_lifetime() -> u64 {
    86_400
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            lifetime_secs: default_token_lifetime(),
            field: String::new(),
            action: String::new(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub plugin: PluginConfig,
    pub web: WebConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> OptionsResult<Self> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: PLUGIN_OPTIONS_)
            // e.g., PLUGIN_OPTIONS_TOKEN__SECRET, PLUGIN_OPTIONS_WEB__PORT
            .add_source(
                Environment::with_prefix("PLUGIN_OPTIONS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// `--memory` keeps options in process memory only (development)
    pub fn memory_mode<I>(args: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        args.into_iter().any(|arg| arg.as_ref() == "--memory")
    }
}

impl WebConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
