//! Server settings.
//!
//! | variable | default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `RUST_LOG` | `info` |
//! | `DRAIN_TIMEOUT_SECS` | `10` |
//!
//! Workflow engine settings come from the `SAGA_*` variables read by
//! [`SagaConfig::from_env`].

use std::time::Duration;

use saga::SagaConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// How long shutdown waits for running workflows to finish.
    pub drain_timeout: Duration,
    pub saga: SagaConfig,
}

impl Config {
    /// Reads server and engine settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            saga: SagaConfig::from_env(),
            ..Self::from_lookup(|key| std::env::var(key).ok())
        }
    }

    /// Reads the server settings through `lookup`. Unset or unparsable
    /// values fall back to their defaults; the engine settings stay at
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse().ok());
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            drain_timeout: lookup("DRAIN_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.drain_timeout),
            saga: defaults.saga,
        }
    }

    /// The `host:port` string the listener binds to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            drain_timeout: Duration::from_secs(10),
            saga: SagaConfig::default(),
        }
    }
}
