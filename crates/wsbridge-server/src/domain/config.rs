//! Broker configuration.
//!
//! Settings come from two places, merged field by field:
//!
//! 1. Command-line flags (and their `WSBRIDGE_*` environment fallbacks).
//! 2. An optional TOML file given with `--config`.
//!
//! Flags win over the file; anything set in neither falls back to a default.
//! The merged [`Settings`] are then validated once into a [`ServerConfig`],
//! which is what the rest of the broker sees.
//!
//! # Example file
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! external_url = "wss://bridge.example.com"
//! api_keys = ["service-a-key", "service-b-key"]
//! webhook_url = "https://devices.example.com/notify"
//! accept_timeout_secs = 60
//!
//! # Setting a key switches the broker to multi-node mode.
//! encryption_key = "base64 of 32 random bytes"
//! local_ip_variable = "LOCAL_IP"
//! ```

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;
use wsbridge_core::token::DEFAULT_TOKEN_SIZE;
use wsbridge_core::EncryptionKey;

use super::node::{resolve_node_uri, DEFAULT_LOCAL_IP_VARIABLE};

/// Listen address when none is configured.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// How long a requester waits for its device when none is configured.
pub const DEFAULT_ACCEPT_TIMEOUT_SECS: u64 = 60;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Display) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.to_string(),
        }
    }
}

// ── Raw settings ──────────────────────────────────────────────────────────────

/// Unvalidated settings, every field optional.
///
/// This is both the TOML file schema and the shape the CLI is converted into,
/// so the two sources can be merged with [`Settings::or`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bind: Option<SocketAddr>,
    /// Base URL devices use to reach the broker (`ws://` or `wss://`).
    pub external_url: Option<String>,
    pub api_keys: Option<Vec<String>>,
    /// Device notification webhook.  Without one, requests are only logged.
    pub webhook_url: Option<String>,
    pub accept_timeout_secs: Option<u64>,
    /// Random token size in bytes (single-node mode).
    pub token_size: Option<usize>,
    /// Base64 256-bit cluster key.  Its presence selects multi-node mode.
    pub encryption_key: Option<String>,
    /// Explicit node URI for multi-node mode.
    pub node_uri: Option<String>,
    /// Environment variable holding this node's IP (multi-node mode).
    pub local_ip_variable: Option<String>,
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Field-by-field merge: values set in `self` win over `base`.
    pub fn or(self, base: Settings) -> Settings {
        Settings {
            bind: self.bind.or(base.bind),
            external_url: self.external_url.or(base.external_url),
            api_keys: self.api_keys.or(base.api_keys),
            webhook_url: self.webhook_url.or(base.webhook_url),
            accept_timeout_secs: self.accept_timeout_secs.or(base.accept_timeout_secs),
            token_size: self.token_size.or(base.token_size),
            encryption_key: self.encryption_key.or(base.encryption_key),
            node_uri: self.node_uri.or(base.node_uri),
            local_ip_variable: self.local_ip_variable.or(base.local_ip_variable),
        }
    }
}

// ── Validated configuration ───────────────────────────────────────────────────

/// Deployment mode, chosen once at startup.
#[derive(Debug, Clone)]
pub enum BridgeMode {
    /// One broker holds every bridge.  Random tokens.
    SingleNode,
    /// Several brokers behind a load balancer.  Routing tokens name the node
    /// holding the requester.
    MultiNode { node_uri: Url, key: EncryptionKey },
}

/// All runtime configuration for the broker.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Base of the accept URL sent to devices.
    pub external_url: Url,
    /// Keys allowed to call `/bridge/connect`.  Empty rejects every caller.
    pub api_keys: Vec<String>,
    pub webhook_url: Option<Url>,
    pub accept_timeout: Duration,
    pub token_size: usize,
    pub mode: BridgeMode,
}

impl ServerConfig {
    /// Validates merged settings.
    ///
    /// `lookup_env` reads an environment variable; it is only consulted for
    /// the local IP variable in multi-node mode.
    pub fn from_settings<F>(settings: Settings, lookup_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = match settings.bind {
            Some(addr) => addr,
            None => DEFAULT_BIND
                .parse()
                .map_err(|e| ConfigError::invalid("bind", e))?,
        };

        let external_url = match settings.external_url.as_deref() {
            Some(text) => parse_ws_url("external_url", text)?,
            None => parse_ws_url(
                "external_url",
                &format!("ws://localhost:{}", bind_addr.port()),
            )?,
        };

        let webhook_url = settings
            .webhook_url
            .as_deref()
            .map(|text| Url::parse(text).map_err(|e| ConfigError::invalid("webhook_url", e)))
            .transpose()?;

        let accept_timeout_secs = settings
            .accept_timeout_secs
            .unwrap_or(DEFAULT_ACCEPT_TIMEOUT_SECS);
        if accept_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "accept_timeout_secs",
                "must be at least 1 second",
            ));
        }

        let token_size = settings.token_size.unwrap_or(DEFAULT_TOKEN_SIZE);
        if token_size == 0 {
            return Err(ConfigError::invalid("token_size", "must be at least 1 byte"));
        }

        let mode = match settings.encryption_key.as_deref() {
            None => BridgeMode::SingleNode,
            Some(encoded) => {
                let key = EncryptionKey::from_base64(encoded)
                    .map_err(|e| ConfigError::invalid("encryption_key", e))?;
                let variable = settings
                    .local_ip_variable
                    .as_deref()
                    .unwrap_or(DEFAULT_LOCAL_IP_VARIABLE);
                let local_ip = lookup_env(variable);
                let node_uri = resolve_node_uri(
                    settings.node_uri.as_deref(),
                    local_ip.as_deref(),
                    bind_addr.port(),
                )?;
                BridgeMode::MultiNode { node_uri, key }
            }
        };

        Ok(Self {
            bind_addr,
            external_url,
            api_keys: settings.api_keys.unwrap_or_default(),
            webhook_url,
            accept_timeout: Duration::from_secs(accept_timeout_secs),
            token_size,
            mode,
        })
    }
}

fn parse_ws_url(field: &'static str, text: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(text.trim_end_matches('/')).map_err(|e| ConfigError::invalid(field, e))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::invalid(
            field,
            format!("scheme must be ws or wss, got '{other}'"),
        )),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_are_single_node_on_8080() {
        // Arrange / Act
        let config = ServerConfig::from_settings(Settings::default(), no_env).unwrap();

        // Assert
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.external_url.as_str(), "ws://localhost:8080/");
        assert_eq!(config.accept_timeout, Duration::from_secs(60));
        assert_eq!(config.token_size, 20);
        assert!(config.api_keys.is_empty());
        assert!(config.webhook_url.is_none());
        assert!(matches!(config.mode, BridgeMode::SingleNode));
    }

    #[test]
    fn test_encryption_key_selects_multi_node() {
        let settings = Settings {
            encryption_key: Some(EncryptionKey::generate().to_base64()),
            bind: Some("0.0.0.0:9100".parse().unwrap()),
            ..Settings::default()
        };

        let config = ServerConfig::from_settings(settings, |name| {
            (name == "LOCAL_IP").then(|| "10.4.0.12".to_string())
        })
        .unwrap();

        match config.mode {
            BridgeMode::MultiNode { node_uri, .. } => {
                assert_eq!(node_uri.as_str(), "ws://10.4.0.12:9100/");
            }
            BridgeMode::SingleNode => panic!("expected multi-node mode"),
        }
    }

    #[test]
    fn test_custom_local_ip_variable_is_consulted() {
        let settings = Settings {
            encryption_key: Some(EncryptionKey::generate().to_base64()),
            local_ip_variable: Some("POD_IP".to_string()),
            ..Settings::default()
        };

        let config = ServerConfig::from_settings(settings, |name| {
            (name == "POD_IP").then(|| "172.16.0.5".to_string())
        })
        .unwrap();

        let BridgeMode::MultiNode { node_uri, .. } = config.mode else {
            panic!("expected multi-node mode");
        };
        assert_eq!(node_uri.host_str(), Some("172.16.0.5"));
    }

    #[test]
    fn test_malformed_key_is_rejected() {
        let settings = Settings {
            encryption_key: Some("too-short".to_string()),
            ..Settings::default()
        };
        let result = ServerConfig::from_settings(settings, no_env);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "encryption_key",
                ..
            })
        ));
    }

    #[test]
    fn test_http_external_url_is_rejected() {
        let settings = Settings {
            external_url: Some("https://bridge.example.com".to_string()),
            ..Settings::default()
        };
        assert!(ServerConfig::from_settings(settings, no_env).is_err());
    }

    #[test]
    fn test_trailing_slash_in_external_url_is_trimmed() {
        let settings = Settings {
            external_url: Some("wss://bridge.example.com/tunnels/".to_string()),
            ..Settings::default()
        };
        let config = ServerConfig::from_settings(settings, no_env).unwrap();
        assert_eq!(config.external_url.path(), "/tunnels");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let settings = Settings {
            accept_timeout_secs: Some(0),
            ..Settings::default()
        };
        assert!(ServerConfig::from_settings(settings, no_env).is_err());
    }

    #[test]
    fn test_cli_values_override_file_values() {
        // Arrange
        let file = Settings::from_toml_str(
            r#"
            bind = "0.0.0.0:7000"
            api_keys = ["from-file"]
            webhook_url = "https://devices.example.com/notify"
            "#,
        )
        .unwrap();
        let cli = Settings {
            api_keys: Some(vec!["from-cli".to_string()]),
            ..Settings::default()
        };

        // Act
        let merged = cli.or(file);

        // Assert
        assert_eq!(merged.api_keys, Some(vec!["from-cli".to_string()]));
        assert_eq!(merged.bind, Some("0.0.0.0:7000".parse().unwrap()));
        assert_eq!(
            merged.webhook_url.as_deref(),
            Some("https://devices.example.com/notify")
        );
    }

    #[test]
    fn test_unknown_toml_field_is_rejected() {
        let result = Settings::from_toml_str("bnid = \"0.0.0.0:1\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Settings::load(Path::new("/nonexistent/wsbridge.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/wsbridge.toml"));
    }
}
