//! Agent startup configuration.
//!
//! Configuration can be built in code, loaded from a JSON file, or read from
//! `CONSOLE_RELAY_*` environment variables.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Destination used by the remote-relay topology when none is configured.
pub const DEFAULT_DESTINATION: &str = "./logs/console.log";

const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2000;

/// Where persistence happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// The agent writes records to the destination itself.
    LocalFile,
    /// The agent relays records to the panel, which writes them.
    #[default]
    RemoteRelay,
}

impl std::str::FromStr for Topology {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_file" | "local" => Ok(Self::LocalFile),
            "remote_relay" | "remote" | "relay" => Ok(Self::RemoteRelay),
            other => Err(ConfigError::InvalidTopology(other.to_string())),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("A destination is required for the local-file topology")]
    MissingDestination,
    #[error("Unknown topology: {0}")]
    InvalidTopology(String),
    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: &'static str, value: String },
    #[error("Invalid number for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Agent startup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Deployment topology.
    #[serde(default)]
    pub topology: Topology,

    /// Destination path. Required for `LocalFile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Start with relaying enabled.
    #[serde(default)]
    pub auto_enable: bool,

    /// How long teardown waits for queued writes.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

const fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            destination: None,
            auto_enable: false,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl AgentConfig {
    /// Local-file topology writing to `destination`.
    #[must_use]
    pub fn local(destination: impl Into<String>) -> Self {
        Self {
            topology: Topology::LocalFile,
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    /// Remote-relay topology with the default destination.
    #[must_use]
    pub fn relay() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    #[must_use]
    pub const fn with_auto_enable(mut self, auto_enable: bool) -> Self {
        self.auto_enable = auto_enable;
        self
    }

    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let ms = timeout.as_millis() as u64;
        self.drain_timeout_ms = ms;
        self
    }

    /// Teardown drain timeout.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// The destination the agent will report and write to.
    ///
    /// # Errors
    /// Returns error if the local-file topology has no destination.
    pub fn resolve_destination(&self) -> Result<String, ConfigError> {
        match (&self.destination, self.topology) {
            (Some(dest), _) if !dest.trim().is_empty() => Ok(dest.clone()),
            (_, Topology::LocalFile) => Err(ConfigError::MissingDestination),
            (_, Topology::RemoteRelay) => Ok(DEFAULT_DESTINATION.to_string()),
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.resolve_destination()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Build configuration from `CONSOLE_RELAY_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns error if a value is malformed or validation fails.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(topology) = lookup("CONSOLE_RELAY_TOPOLOGY") {
            config.topology = topology.parse()?;
        }
        if let Some(destination) = lookup("CONSOLE_RELAY_DESTINATION") {
            config.destination = Some(destination);
        }
        if let Some(value) = lookup("CONSOLE_RELAY_AUTO_ENABLE") {
            config.auto_enable = parse_bool("CONSOLE_RELAY_AUTO_ENABLE", &value)?;
        }
        if let Some(value) = lookup("CONSOLE_RELAY_DRAIN_TIMEOUT_MS") {
            config.drain_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber {
                        name: "CONSOLE_RELAY_DRAIN_TIMEOUT_MS",
                        value,
                    })?;
        }

        config.resolve_destination()?;
        Ok(config)
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_relay_defaults_destination() {
        let config = AgentConfig::relay();
        assert_eq!(config.resolve_destination().unwrap(), DEFAULT_DESTINATION);
        assert!(!config.auto_enable);
    }

    #[test]
    fn test_local_requires_destination() {
        let config = AgentConfig {
            topology: Topology::LocalFile,
            ..AgentConfig::default()
        };
        assert!(matches!(
            config.resolve_destination(),
            Err(ConfigError::MissingDestination)
        ));
        assert_ok!(AgentConfig::local("./logs/app.log").resolve_destination());
    }

    #[test]
    fn test_from_lookup() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("CONSOLE_RELAY_TOPOLOGY", "local-file"),
            ("CONSOLE_RELAY_DESTINATION", "/tmp/app.log"),
            ("CONSOLE_RELAY_AUTO_ENABLE", "yes"),
            ("CONSOLE_RELAY_DRAIN_TIMEOUT_MS", "150"),
        ]))
        .unwrap();

        assert_eq!(config.topology, Topology::LocalFile);
        assert_eq!(config.destination.as_deref(), Some("/tmp/app.log"));
        assert!(config.auto_enable);
        assert_eq!(config.drain_timeout(), Duration::from_millis(150));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert_err!(AgentConfig::from_lookup(lookup(&[(
            "CONSOLE_RELAY_AUTO_ENABLE",
            "maybe"
        )])));
        assert_err!(AgentConfig::from_lookup(lookup(&[(
            "CONSOLE_RELAY_TOPOLOGY",
            "carrier-pigeon"
        )])));
        assert_err!(AgentConfig::from_lookup(lookup(&[(
            "CONSOLE_RELAY_TOPOLOGY",
            "local"
        )])));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        std::fs::write(
            &path,
            r#"{"topology":"local_file","destination":"./logs/app.log","autoEnable":true}"#,
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config, AgentConfig::local("./logs/app.log").with_auto_enable(true));
    }
}
