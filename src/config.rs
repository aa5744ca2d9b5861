use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::service::DEFAULT_DEADLINE;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9090;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid TCP_PORT {0:?}")]
    InvalidPort(String),
    #[error("invalid STORE_TIMEOUT_SECS {0:?}")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            store_timeout: DEFAULT_DEADLINE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("TCP_HOST").filter(|h| !h.is_empty()) {
            config.host = host;
        }

        if let Some(port) = lookup("TCP_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let Some(secs) = lookup("STORE_TIMEOUT_SECS") {
            let parsed: u64 = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(secs.clone()))?;
            if parsed == 0 {
                return Err(ConfigError::InvalidTimeout(secs));
            }
            config.store_timeout = Duration::from_secs(parsed);
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.store_timeout, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TCP_HOST", "127.0.0.1"),
            ("TCP_PORT", "7000"),
            ("STORE_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:7000");
        assert_eq!(config.store_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            Config::from_lookup(lookup(&[("TCP_PORT", "99999")])),
            Err(ConfigError::InvalidPort("99999".to_string()))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[("STORE_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidTimeout("0".to_string()))
        );
    }
}
