//! Crate-wide error taxonomy.
//!
//! Mirrors the five-way classification in the design: transport errors are
//! retried or terminalized per-destination, config errors fail a deploy,
//! script errors are confined to one message, integrity errors are reported
//! by the DAO and handled by the caller, and fatal errors abort only the
//! operation that raised them — never a sibling channel.

use crate::domain_types::ChannelId;
use thiserror::Error;

/// Network, database, or timeout failure. Queued destinations retry these;
/// synchronous destinations terminalize to `ConnectorStatus::Error`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("socket timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid channel configuration, discovered at deploy time. A channel
/// that fails to deploy is never added to the engine's registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("destination '{name}' targets unknown channel {target}")]
    UnknownVmTarget { name: String, target: ChannelId },
}

/// A raised or thrown error from the filter/transform executor. Confined
/// to the single message and destination that triggered it.
#[derive(Debug, Error)]
#[error("script error: {0}")]
pub struct ScriptError(pub String);

/// A storage-layer inconsistency: missing per-channel tables, a foreign
/// key violation, or similar. The caller decides how to degrade (trace
/// returns a placeholder node, the pipeline aborts only that message).
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("channel {0} has no message tables (not deployed)")]
    ChannelNotDeployed(ChannelId),

    #[error("message {message_id} has no parent row")]
    OrphanedConnectorMessage { message_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Engine-level failure. Aborts only the operation (deploy, dispatch) that
/// raised it; the engine process itself keeps running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("channel {0} is not deployed")]
    ChannelNotDeployed(ChannelId),

    #[error("channel {0} is already deployed")]
    AlreadyDeployed(ChannelId),

    #[error("channel {0} is stopped or paused and cannot accept this operation")]
    InvalidState(ChannelId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result alias used throughout the engine/channel/connector layers.
pub type EngineResult<T> = Result<T, EngineError>;
