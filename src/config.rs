use std::net::SocketAddr;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "MediMind";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Ollama instance.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model used when none is configured and none can be detected.
pub const FALLBACK_MODEL: &str = "medgemma:4b";

/// Default generation timeout (5 minutes, vision models on CPU are slow).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default bind address for the HTTP API (loopback only).
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

const ENV_OLLAMA_URL: &str = "MEDIMIND_OLLAMA_URL";
const ENV_MODEL: &str = "MEDIMIND_MODEL";
const ENV_TIMEOUT_SECS: &str = "MEDIMIND_TIMEOUT_SECS";
const ENV_BIND_ADDR: &str = "MEDIMIND_BIND_ADDR";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medimind_lib=debug,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be a socket address (host:port), got '{value}'")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} must be an http(s) URL, got '{value}'")]
    InvalidUrl { var: &'static str, value: String },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub ollama_url: String,
    /// Explicit model. `None` means pick the best installed one.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Read configuration from `MEDIMIND_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (env in production, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ollama_url = non_empty(ENV_OLLAMA_URL).unwrap_or_else(|| DEFAULT_OLLAMA_URL.into());
        if !(ollama_url.starts_with("http://") || ollama_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                var: ENV_OLLAMA_URL,
                value: ollama_url,
            });
        }

        let timeout_secs = match non_empty(ENV_TIMEOUT_SECS) {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(v) if v > 0 => v,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: ENV_TIMEOUT_SECS,
                        value: raw,
                    })
                }
            },
        };

        let raw_addr = non_empty(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = raw_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddress {
                var: ENV_BIND_ADDR,
                value: raw_addr.clone(),
            })?;

        Ok(Self {
            ollama_url: ollama_url.trim().to_string(),
            model: non_empty(ENV_MODEL).map(|m| m.trim().to_string()),
            timeout_secs,
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, None);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MEDIMIND_OLLAMA_URL", "http://10.0.0.5:11434"),
            ("MEDIMIND_MODEL", "medgemma:4b"),
            ("MEDIMIND_TIMEOUT_SECS", "60"),
            ("MEDIMIND_BIND_ADDR", "0.0.0.0:9000"),
        ]))
        .unwrap();
        assert_eq!(config.ollama_url, "http://10.0.0.5:11434");
        assert_eq!(config.model.as_deref(), Some("medgemma:4b"));
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("MEDIMIND_MODEL", "  ")])).unwrap();
        assert_eq!(config.model, None);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("MEDIMIND_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn bad_bind_address_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("MEDIMIND_BIND_ADDR", "localhost")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn non_http_url_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("MEDIMIND_OLLAMA_URL", "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn app_name_is_medimind() {
        assert_eq!(APP_NAME, "MediMind");
    }
}
