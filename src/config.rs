//! Channel configuration: the validated shape a channel definition must
//! take before it can be deployed.
//!
//! Unknown configuration keys are rejected rather than silently ignored,
//! the same stance the teacher's `RouterConfig` takes toward out-of-range
//! values — a typo in a channel's properties should fail deploy, not
//! silently behave like the default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::{ChannelId, MetaDataId};
use crate::error::ConfigError;

/// The wire-protocol kind a connector speaks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectorConfig {
    /// MLLP-framed TCP listener/sender (HL7's minimal lower layer protocol).
    Mllp { host: String, port: u16 },
    /// HTTP listener (source) or client (destination).
    Http { url: String },
    /// Local filesystem polling (source) or write (destination).
    File { directory: String },
    /// A raw SQL statement run against a configured JDBC-style target.
    Database { connection_string: String, statement: String },
    /// In-process dispatch to another deployed channel.
    Vm { target_channel: ChannelId },
}

/// One destination slot in a channel's destination chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationConfig {
    pub metadata_id: MetaDataId,
    pub name: String,
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub wait_for_previous: bool,
    #[serde(default)]
    pub skip_on_upstream_error: bool,
    /// Wraps this destination in a reconnect-and-retry loop instead of
    /// reporting a single failed attempt as `Error`.
    #[serde(default)]
    pub queue_enabled: bool,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_reconnect_interval_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

/// The policy controlling what becomes the source connector's response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponsePolicyConfig {
    #[default]
    None,
    AutoBeforeProcessing,
    AutoAfterProcessing,
    SourceTransformed,
    Postprocessor,
    DestinationsCompleted,
}

/// A full channel definition, as loaded from disk or the REST API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_revision")]
    pub revision: u32,
    pub source_connector: ConnectorConfig,
    #[serde(default)]
    pub destination_connectors: Vec<DestinationConfig>,
    #[serde(default)]
    pub response_policy: ResponsePolicyConfig,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_revision() -> u32 {
    1
}

/// Keys recognized in a channel's free-form `properties` map. Anything
/// else is rejected at parse time.
const KNOWN_PROPERTY_KEYS: &[&str] = &["encoding", "timeout_ms", "max_attempts", "truncate_bytes"];

impl ChannelConfig {
    /// Validates this configuration, rejecting unknown property keys and
    /// destinations that target a channel with no configured id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "name".to_string() });
        }
        for key in self.properties.keys() {
            if !KNOWN_PROPERTY_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownKey { key: key.clone() });
            }
        }
        for destination in &self.destination_connectors {
            if let ConnectorConfig::Vm { target_channel } = &destination.connector {
                if *target_channel == self.id {
                    return Err(ConfigError::InvalidValue {
                        field: "destination_connectors".to_string(),
                        reason: "a VM destination cannot target its own channel".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Top-level configuration for the `donkey-engine` binary, loaded from a
/// TOML file at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Address the REST management API binds to, e.g. `"0.0.0.0:8080"`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path to the engine's `SQLite` database file.
    pub database_path: String,
    /// Channels to deploy (and start, if `enabled`) at startup.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl EngineConfig {
    /// Parses a TOML document into a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document doesn't parse, its
    /// `bind_address` isn't a valid socket address, or any channel fails
    /// its own validation.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|error| ConfigError::InvalidValue {
            field: "<document>".to_string(),
            reason: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the address and every configured channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address.parse::<std::net::SocketAddr>().map_err(|_| {
            ConfigError::InvalidValue {
                field: "bind_address".to_string(),
                reason: "must be a valid socket address".to_string(),
            }
        })?;
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> ChannelConfig {
        ChannelConfig {
            id: ChannelId::generate(),
            name: "test-channel".to_string(),
            enabled: true,
            revision: 1,
            source_connector: ConnectorConfig::Http { url: "0.0.0.0:8081".to_string() },
            destination_connectors: Vec::new(),
            response_policy: ResponsePolicyConfig::default(),
            properties: HashMap::new(),
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut config = minimal_config();
        config.name = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn unknown_property_key_is_rejected() {
        let mut config = minimal_config();
        config.properties.insert("bogus_key".to_string(), Value::Bool(true));
        assert!(matches!(config.validate(), Err(ConfigError::UnknownKey { .. })));
    }

    #[test]
    fn a_vm_destination_cannot_target_its_own_channel() {
        let mut config = minimal_config();
        config.destination_connectors.push(DestinationConfig {
            metadata_id: MetaDataId::try_new(1).unwrap(),
            name: "loopback".to_string(),
            connector: ConnectorConfig::Vm { target_channel: config.id },
            wait_for_previous: false,
            skip_on_upstream_error: false,
            queue_enabled: false,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_attempts: default_max_attempts(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn engine_config_parses_a_minimal_toml_document() {
        let toml = r#"
            database_path = "donkey.db"
        "#;
        let config = EngineConfig::parse(toml).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.channels.is_empty());
    }

    #[test]
    fn engine_config_rejects_an_invalid_bind_address() {
        let toml = r#"
            bind_address = "not-an-address"
            database_path = "donkey.db"
        "#;
        assert!(matches!(EngineConfig::parse(toml), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn engine_config_propagates_a_channel_validation_error() {
        let toml = r#"
            database_path = "donkey.db"

            [[channels]]
            id = "11111111-1111-1111-1111-111111111111"
            name = ""

            [channels.source_connector]
            type = "http"
            url = "0.0.0.0:8081"
        "#;
        assert!(matches!(EngineConfig::parse(toml), Err(ConfigError::MissingField { .. })));
    }
}
