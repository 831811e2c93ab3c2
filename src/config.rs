use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CareSync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:5173";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;
pub const DATABASE_FILE: &str = "caresync.db";

/// Outbound mail relay request timeout.
pub const MAIL_RELAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,caresync_lib=debug,tower_http=info"
}

/// Default data directory: ~/CareSync/ (falls back to ./CareSync without a home dir)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub public_url: String,
    pub mail_relay_url: Option<String>,
    pub webhook_secret: Option<String>,
    /// Shared secret for maintenance writes. Unset disables them.
    pub operator_token: Option<String>,
    pub session_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("CARESYNC_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "CARESYNC_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let session_ttl = match get("CARESYNC_SESSION_TTL_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "CARESYNC_SESSION_TTL_SECS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_SESSION_TTL_SECS,
        };

        Ok(Self {
            bind_addr,
            data_dir: get("CARESYNC_DATA_DIR").map(PathBuf::from).unwrap_or_else(app_data_dir),
            public_url: get("CARESYNC_PUBLIC_URL").unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string()),
            mail_relay_url: get("CARESYNC_MAIL_RELAY_URL"),
            webhook_secret: get("CARESYNC_WEBHOOK_SECRET"),
            operator_token: get("CARESYNC_OPERATOR_TOKEN"),
            session_ttl: Duration::from_secs(session_ttl),
        })
    }

    /// Defaults rooted in `data_dir`, bound to an ephemeral port.
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir,
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            mail_relay_url: None,
            webhook_secret: None,
            operator_token: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(cfg.data_dir.ends_with(APP_NAME));
        assert!(cfg.mail_relay_url.is_none());
        assert!(cfg.webhook_secret.is_none());
        assert!(cfg.operator_token.is_none());
        assert_eq!(cfg.session_ttl, Duration::from_secs(DEFAULT_SESSION_TTL_SECS));
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = config(&[
            ("CARESYNC_BIND_ADDR", "0.0.0.0:9000"),
            ("CARESYNC_DATA_DIR", "/var/lib/caresync"),
            ("CARESYNC_WEBHOOK_SECRET", "whsec"),
            ("CARESYNC_OPERATOR_TOKEN", "ops"),
            ("CARESYNC_SESSION_TTL_SECS", "60"),
            ("CARESYNC_MAIL_RELAY_URL", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_path(), PathBuf::from("/var/lib/caresync/caresync.db"));
        assert_eq!(cfg.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(cfg.operator_token.as_deref(), Some("ops"));
        assert_eq!(cfg.session_ttl, Duration::from_secs(60));
        assert!(cfg.mail_relay_url.is_none());
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(config(&[("CARESYNC_BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("CARESYNC_SESSION_TTL_SECS", "soon")]).is_err());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
