//! Process configuration.
//!
//! One explicit [`RelayConfig`] value is built at startup (from the environment
//! in the binary, directly in tests) and handed to the constructors that need
//! it. Nothing reads configuration from global state.
//!
//! | Variable                   | Default                   |
//! |----------------------------|---------------------------|
//! | `RELAY_REDIS_URL`          | `redis://127.0.0.1:6379/` |
//! | `RELAY_INBOX`              | `inbox`                   |
//! | `RELAY_POLL_INTERVAL_SECS` | `3`                       |
//! | `RELAY_CHANNEL`            | `__default`               |
//! | `RELAY_WORKER_BACKEND`     | unset                     |
//! | `RELAY_BACKEND_NAMESPACE`  | unset                     |

use std::time::Duration;

use thiserror::Error;

use crate::broker::BrokerConfig;
use crate::subscriptions::Backend;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_INBOX: &str = "inbox";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_CHANNEL: &str = "__default";

/// A deployment is misconfigured. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        ConfigurationError(message.into())
    }
}

/// Everything the relay processes need to know at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Redis server shared by publishers, subscribers and the Broker.
    pub redis_url: String,

    /// Name of the shared inbox list.
    pub inbox: String,

    /// How long one blocking dequeue waits for an event.
    pub poll_interval: Duration,

    /// Channel publishers use when none is given.
    pub channel: String,

    /// Namespacing backend name (`resque` or `sidekiq`).
    pub worker_backend: Option<String>,

    pub backend_namespace: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            inbox: DEFAULT_INBOX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel: DEFAULT_CHANNEL.to_string(),
            worker_backend: None,
            backend_namespace: None,
        }
    }
}

impl RelayConfig {
    /// Reads the configuration from `RELAY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let mut config = RelayConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("RELAY_REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(inbox) = non_empty("RELAY_INBOX") {
            config.inbox = inbox;
        }
        if let Some(secs) = non_empty("RELAY_POLL_INTERVAL_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ConfigurationError::new(format!(
                    "RELAY_POLL_INTERVAL_SECS must be a whole number of seconds, got `{secs}`"
                ))
            })?;
            if secs == 0 {
                return Err(ConfigurationError::new(
                    "RELAY_POLL_INTERVAL_SECS must be at least 1",
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(channel) = non_empty("RELAY_CHANNEL") {
            config.channel = channel;
        }
        config.worker_backend = non_empty("RELAY_WORKER_BACKEND");
        config.backend_namespace = non_empty("RELAY_BACKEND_NAMESPACE");

        Ok(config)
    }

    /// The Broker's slice of the configuration.
    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig::new(self.inbox.clone(), self.poll_interval)
    }

    /// Resolves the configured namespacing backend.
    ///
    /// Returns `Ok(None)` when no backend is configured; adapters built without
    /// one refuse to bind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an unsupported backend name.
    pub fn backend(&self) -> Result<Option<Backend>, ConfigurationError> {
        self.worker_backend
            .as_deref()
            .map(|name| Backend::from_name(name, self.backend_namespace.clone()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379/");
        assert_eq!(config.inbox, "inbox");
        assert_eq!(config.channel, "__default");
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.worker_backend, None);
        assert_eq!(config.backend().unwrap(), None);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("RELAY_REDIS_URL", "redis://cache.internal:6380/2"),
            ("RELAY_INBOX", "events"),
            ("RELAY_POLL_INTERVAL_SECS", "10"),
            ("RELAY_CHANNEL", "com.example.admin"),
            ("RELAY_WORKER_BACKEND", "sidekiq"),
            ("RELAY_BACKEND_NAMESPACE", "app"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache.internal:6380/2");
        assert_eq!(config.inbox, "events");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.channel, "com.example.admin");
        assert_eq!(
            config.backend().unwrap(),
            Some(Backend::Sidekiq {
                namespace: Some("app".into())
            })
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("RELAY_INBOX", "  "),
            ("RELAY_WORKER_BACKEND", ""),
        ]))
        .unwrap();
        assert_eq!(config.inbox, "inbox");
        assert_eq!(config.worker_backend, None);
    }

    #[test]
    fn invalid_poll_interval_is_rejected() {
        for bad in ["soon", "-1", "0"] {
            let err =
                RelayConfig::from_lookup(lookup(&[("RELAY_POLL_INTERVAL_SECS", bad)])).unwrap_err();
            assert!(err.to_string().contains("RELAY_POLL_INTERVAL_SECS"), "{bad}");
        }
    }

    #[test]
    fn unknown_backend_is_a_configuration_error() {
        let config = RelayConfig {
            worker_backend: Some("delayed_job".into()),
            ..RelayConfig::default()
        };
        assert!(config.backend().is_err());
    }

    #[test]
    fn broker_config_derives_from_relay_config() {
        let config = RelayConfig {
            inbox: "events".into(),
            poll_interval: Duration::from_secs(5),
            ..RelayConfig::default()
        };
        let broker = config.broker();
        assert_eq!(broker.inbox(), "events");
        assert_eq!(broker.in_progress_queue(), "events:in_progress");
        assert_eq!(broker.iteration_deadline(), Duration::from_secs(6));
    }
}
