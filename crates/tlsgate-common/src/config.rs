//! Configuration for tlsgate
//!
//! The service configuration is a TOML file. The enforcement policy itself
//! lives in a separate document referenced by `[policy].path` so that it can
//! be reloaded without restarting the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides, e.g. `TLSGATE__API__BIND`
pub const ENV_PREFIX: &str = "TLSGATE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Policy source configuration
    #[serde(default)]
    pub policy: PolicySourceConfig,

    /// TLS certificate and key used by the host's acceptor
    pub tls: Option<TlsConfig>,

    /// Webhook receiver configuration
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the webhook, health and metrics endpoints
    #[serde(default = "default_api_bind")]
    pub bind: String,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1 MB
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Where the enforcement policy is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySourceConfig {
    /// Path to the policy TOML document
    #[serde(default = "default_policy_path")]
    pub path: PathBuf,
}

impl Default for PolicySourceConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
        }
    }
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("/etc/tlsgate/policy.toml")
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file
    pub cert_path: PathBuf,

    /// Path to private key file
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Check that both PEM files exist
    pub fn is_configured(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }
}

/// Webhook receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Enable the webhook endpoint
    #[serde(default = "default_webhook_enabled")]
    pub enabled: bool,

    /// Shared HMAC secret. Without one every request is rejected.
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: default_webhook_enabled(),
            secret: None,
        }
    }
}

fn default_webhook_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from a file with `TLSGATE__*` environment overrides
    pub fn from_file_with_env(path: &Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/tlsgate/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::from_file_with_env(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.hostname, "localhost");
        assert_eq!(config.api.bind, "0.0.0.0:8080");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.policy.path, PathBuf::from("/etc/tlsgate/policy.toml"));
        assert!(config.tls.is_none());
        assert!(config.webhook.enabled);
        assert!(config.webhook.secret.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mx.example.com"

[api]
bind = "127.0.0.1:9000"

[logging]
level = "debug"
format = "text"

[policy]
path = "/srv/tlsgate/policy.toml"

[tls]
cert_path = "/srv/tlsgate/cert.pem"
key_path = "/srv/tlsgate/key.pem"

[webhook]
secret = "s3cret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mx.example.com");
        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.api.max_body_bytes, 1024 * 1024);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.policy.path, PathBuf::from("/srv/tlsgate/policy.toml"));
        assert_eq!(
            config.tls.as_ref().map(|t| t.cert_path.clone()),
            Some(PathBuf::from("/srv/tlsgate/cert.pem"))
        );
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file(Path::new("/nonexistent/tlsgate.toml")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
