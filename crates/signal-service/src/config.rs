//! Signaling service configuration.
//!
//! Configuration is loaded from environment variables. Sensitive fields are
//! wrapped in `SecretString` and redacted in Debug output.

use common::protocol::RelayServer;
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default SQLite database file path.
pub const DEFAULT_DATABASE_PATH: &str = "data/rooms.db";

/// Default public STUN servers, tried before any TURN relay.
pub const DEFAULT_STUN_URLS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// Default heartbeat (ping) interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;

/// Plain TURN port, rewritten to the TLS port for `turns:` URLs.
const TURN_PORT: &str = ":3478";
const TURNS_PORT: &str = ":5349";

/// Signaling service configuration.
///
/// Loaded from environment variables with sensible defaults. The admin code
/// is the only required value.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// SQLite database file path (default: "data/rooms.db").
    pub database_path: String,

    /// Shared secret for the admin API (`X-Admin-Code` header).
    pub admin_code: SecretString,

    /// STUN server URLs, in priority order.
    pub stun_urls: Vec<String>,

    /// Public TURN server URL, if relaying is available.
    pub turn_url: Option<String>,

    /// TURN username, sent to clients in the relay config.
    pub turn_username: Option<String>,

    /// TURN credential, sent to clients in the relay config.
    pub turn_credential: Option<SecretString>,

    /// Whether to also advertise the TLS (`turns:`) variant of the TURN URL.
    pub turn_tls_enabled: bool,

    /// Heartbeat ping interval (default: 30s).
    pub heartbeat_interval: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_path", &self.database_path)
            .field("admin_code", &"[REDACTED]")
            .field("stun_urls", &self.stun_urls)
            .field("turn_url", &self.turn_url)
            .field("turn_username", &self.turn_username)
            .field("turn_credential", &"[REDACTED]")
            .field("turn_tls_enabled", &self.turn_tls_enabled)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let admin_code = SecretString::from(
            vars.get("ADMIN_CODE")
                .ok_or_else(|| ConfigError::MissingEnvVar("ADMIN_CODE".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_path = vars
            .get("DATABASE_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let stun_urls = match vars.get("STUN_URLS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_STUN_URLS.iter().map(|s| (*s).to_string()).collect(),
        };

        // TURN URL priority: explicit TURN_URL, else constructed from
        // EXTERNAL_IP, else none (relaying unavailable for remote clients).
        let turn_url = vars.get("TURN_URL").cloned().or_else(|| {
            vars.get("EXTERNAL_IP")
                .filter(|ip| !ip.is_empty())
                .map(|ip| format!("turn:{ip}{TURN_PORT}"))
        });
        if turn_url.is_none() {
            tracing::warn!(
                target: "signal.config",
                "No TURN_URL or EXTERNAL_IP set; TURN relay will not be offered to clients"
            );
        }

        let turn_username = vars.get("TURN_USERNAME").cloned();
        let turn_credential = vars.get("TURN_PASSWORD").cloned().map(SecretString::from);

        let turn_tls_enabled = vars
            .get("TURN_TLS_ENABLED")
            .map(|v| v == "true")
            .unwrap_or(false);

        let heartbeat_seconds = match vars.get("HEARTBEAT_INTERVAL_SECONDS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "HEARTBEAT_INTERVAL_SECONDS must be an integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        };
        if heartbeat_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            bind_address,
            database_path,
            admin_code,
            stun_urls,
            turn_url,
            turn_username,
            turn_credential,
            turn_tls_enabled,
            heartbeat_interval: Duration::from_secs(heartbeat_seconds),
        })
    }

    /// Assemble the relay-server list handed to clients at join time.
    ///
    /// STUN entries come first, one per URL; the TURN entry (with its TLS
    /// variant when enabled) is appended last with credentials.
    #[must_use]
    pub fn relay_config(&self) -> Vec<RelayServer> {
        let mut servers: Vec<RelayServer> = self
            .stun_urls
            .iter()
            .map(|url| RelayServer::stun(url.clone()))
            .collect();

        if let Some(turn_url) = &self.turn_url {
            let mut urls = vec![turn_url.clone()];
            if self.turn_tls_enabled {
                urls.push(
                    turn_url
                        .replacen("turn:", "turns:", 1)
                        .replacen(TURN_PORT, TURNS_PORT, 1),
                );
            }
            servers.push(RelayServer {
                urls,
                username: self.turn_username.clone(),
                credential: self
                    .turn_credential
                    .as_ref()
                    .map(|c| c.expose_secret().to_string()),
            });
        }

        servers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("ADMIN_CODE".to_string(), "family-2024".to_string())])
    }

    #[test]
    fn from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);
        assert_eq!(config.stun_urls.len(), DEFAULT_STUN_URLS.len());
        assert!(config.turn_url.is_none());
        assert!(!config.turn_tls_enabled);
        assert_eq!(
            config.heartbeat_interval,
            Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECONDS)
        );
    }

    #[test]
    fn missing_admin_code_is_an_error() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "ADMIN_CODE"));
    }

    #[test]
    fn turn_url_constructed_from_external_ip() {
        let mut vars = base_vars();
        vars.insert("EXTERNAL_IP".to_string(), "203.0.113.7".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        assert_eq!(config.turn_url.as_deref(), Some("turn:203.0.113.7:3478"));
    }

    #[test]
    fn explicit_turn_url_wins_over_external_ip() {
        let mut vars = base_vars();
        vars.insert("EXTERNAL_IP".to_string(), "203.0.113.7".to_string());
        vars.insert("TURN_URL".to_string(), "turn:relay.example.org:3478".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        assert_eq!(
            config.turn_url.as_deref(),
            Some("turn:relay.example.org:3478")
        );
    }

    #[test]
    fn relay_config_without_turn_is_stun_only() {
        let config = Config::from_vars(&base_vars()).expect("config should load");
        let servers = config.relay_config();

        assert_eq!(servers.len(), DEFAULT_STUN_URLS.len());
        assert!(servers.iter().all(|s| s.credential.is_none()));
    }

    #[test]
    fn relay_config_appends_turn_with_credentials() {
        let mut vars = base_vars();
        vars.insert("TURN_URL".to_string(), "turn:relay.example.org:3478".to_string());
        vars.insert("TURN_USERNAME".to_string(), "caller".to_string());
        vars.insert("TURN_PASSWORD".to_string(), "s3cret".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        let servers = config.relay_config();

        let turn = servers.last().expect("turn entry present");
        assert_eq!(turn.urls, vec!["turn:relay.example.org:3478".to_string()]);
        assert_eq!(turn.username.as_deref(), Some("caller"));
        assert_eq!(turn.credential.as_deref(), Some("s3cret"));
    }

    #[test]
    fn relay_config_adds_tls_variant_when_enabled() {
        let mut vars = base_vars();
        vars.insert("TURN_URL".to_string(), "turn:relay.example.org:3478".to_string());
        vars.insert("TURN_TLS_ENABLED".to_string(), "true".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        let servers = config.relay_config();

        let turn = servers.last().expect("turn entry present");
        assert_eq!(
            turn.urls,
            vec![
                "turn:relay.example.org:3478".to_string(),
                "turns:relay.example.org:5349".to_string(),
            ]
        );
    }

    #[test]
    fn zero_heartbeat_interval_is_rejected() {
        let mut vars = base_vars();
        vars.insert("HEARTBEAT_INTERVAL_SECONDS".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert("TURN_PASSWORD".to_string(), "s3cret".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("family-2024"));
        assert!(!debug_output.contains("s3cret"));
    }
}
