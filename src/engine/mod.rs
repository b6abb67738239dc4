//! The engine: the registry of deployed channels and the entry point for
//! deploy/undeploy/start/stop lifecycle operations.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, instrument};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::connector::InboundMessage;
use crate::database::DatabaseConnection;
use crate::domain_types::{ChannelId, ServerId};
use crate::error::EngineError;
use crate::storage::{ContentStore, DonkeyDao, SqliteContentStore, SqliteDonkeyDao, SqliteStatisticsStore, StatisticsStore};

/// Registry of currently deployed channels, keyed by id.
///
/// `DashMap` is used (rather than a `Mutex<HashMap>`) since deploy,
/// dispatch, and the REST API's list/detail endpoints all read or write
/// concurrently and none of those operations need a whole-table lock.
pub struct Engine {
    channels: DashMap<ChannelId, Arc<Channel>>,
    connection: DatabaseConnection,
    server_id: ServerId,
}

impl Engine {
    #[must_use]
    pub fn new(connection: DatabaseConnection, server_id: ServerId) -> Self {
        Self { channels: DashMap::new(), connection, server_id }
    }

    /// This engine's identity, stamped onto every message it receives.
    #[must_use]
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Builds a fresh DAO sharing this engine's connection pool, for a
    /// newly constructed channel.
    #[must_use]
    pub fn dao_for_new_channel(&self) -> Arc<dyn DonkeyDao> {
        Arc::new(SqliteDonkeyDao::new(self.connection.clone(), self.server_id))
    }

    /// Builds a fresh content store sharing this engine's connection pool.
    #[must_use]
    pub fn content_store_for_new_channel(&self) -> Arc<dyn ContentStore> {
        Arc::new(SqliteContentStore::new(self.connection.clone()))
    }

    /// Builds a fresh statistics store sharing this engine's connection
    /// pool.
    #[must_use]
    pub fn statistics_store_for_new_channel(&self) -> Arc<dyn StatisticsStore> {
        Arc::new(SqliteStatisticsStore::new(self.connection.clone()))
    }

    /// Registers and deploys a newly constructed channel.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyDeployed`] if a channel with the same
    /// id is already registered, or a storage error if table creation
    /// fails.
    #[instrument(skip(self, channel))]
    pub async fn deploy(&self, channel: Channel) -> Result<(), EngineError> {
        let id = channel.config.id;
        if self.channels.contains_key(&id) {
            return Err(EngineError::AlreadyDeployed(id));
        }
        channel.deploy().await?;
        self.channels.insert(id, Arc::new(channel));
        info!(%id, "channel deployed");
        Ok(())
    }

    /// Starts a deployed channel's source connector. The connector is
    /// handed a handler that runs every accepted message through the
    /// channel's own `process`, so there's no separate inbound queue to
    /// drain. Used by the REST `_start` action.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    #[instrument(skip(self))]
    pub async fn start_and_drive(&self, id: ChannelId) -> Result<(), EngineError> {
        let channel = self.get(id)?;
        channel.start().await?;
        Ok(())
    }

    /// Stops a deployed channel's source connector.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    #[instrument(skip(self))]
    pub async fn stop(&self, id: ChannelId) -> Result<(), EngineError> {
        self.get(id)?.stop().await
    }

    /// Pauses a deployed channel's message intake.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    #[instrument(skip(self))]
    pub async fn pause(&self, id: ChannelId) -> Result<(), EngineError> {
        self.get(id)?.pause().await
    }

    /// Resumes a deployed channel's message intake.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: ChannelId) -> Result<(), EngineError> {
        self.get(id)?.resume().await
    }

    /// Halts a deployed channel immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    #[instrument(skip(self))]
    pub async fn halt(&self, id: ChannelId) -> Result<(), EngineError> {
        self.get(id)?.halt().await
    }

    /// Submits a raw message directly to a deployed channel's pipeline,
    /// bypassing its source connector. Used by the REST `messages`
    /// endpoint and by `VmDestination` deliveries that resolve to a
    /// channel this engine itself owns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered, or any error `Channel::process` returns.
    pub async fn submit(&self, id: ChannelId, message: InboundMessage) -> Result<Vec<u8>, EngineError> {
        self.get(id)?.process(message).await
    }

    /// Removes a channel from the registry, dropping its storage tables.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered, or a storage error if table removal fails.
    #[instrument(skip(self))]
    pub async fn undeploy(&self, id: ChannelId) -> Result<(), EngineError> {
        let (_, channel) = self
            .channels
            .remove(&id)
            .ok_or(EngineError::ChannelNotDeployed(id))?;
        channel.dao.undeploy_tables(id).await?;
        info!(%id, "channel undeployed");
        Ok(())
    }

    /// Looks up a deployed channel.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotDeployed`] if `id` isn't
    /// registered.
    pub fn get(&self, id: ChannelId) -> Result<Arc<Channel>, EngineError> {
        self.channels
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::ChannelNotDeployed(id))
    }

    /// Lists every deployed channel's id and current config.
    #[must_use]
    pub fn list(&self) -> Vec<(ChannelId, ChannelConfig)> {
        self.channels
            .iter()
            .map(|entry| (*entry.key(), entry.value().config.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::domain::channel_state::{ChannelState, ChannelStateCell};
    use crate::executor::PassThroughExecutor;
    use crate::observability::EventBus;
    use crate::storage::{SqliteContentStore, SqliteDonkeyDao, SqliteStatisticsStore};
    use crate::database::{DatabaseConfig, DatabasePath};
    use crate::connector::source::HttpSource;
    use crate::domain_types::ServerId;

    async fn test_channel() -> Channel {
        let dir = tempfile::tempdir().unwrap();
        let path = DatabasePath::new(dir.path().join("engine_test.db")).unwrap();
        let connection = crate::database::DatabaseConnection::initialize(DatabaseConfig::for_testing(path))
            .await
            .unwrap();
        std::mem::forget(dir);
        let server_id = ServerId::generate();
        let config = ChannelConfig {
            id: ChannelId::generate(),
            name: "engine-test".to_string(),
            enabled: true,
            revision: 1,
            source_connector: ConnectorConfig::Http { url: "127.0.0.1:0".to_string() },
            destination_connectors: Vec::new(),
            response_policy: crate::config::ResponsePolicyConfig::None,
            properties: std::collections::HashMap::new(),
        };
        Channel {
            waves: Channel::plan_waves(&config),
            source: Arc::new(HttpSource { bind_address: "127.0.0.1:0".to_string() }),
            destinations: Vec::new(),
            executor: Arc::new(PassThroughExecutor),
            dao: Arc::new(SqliteDonkeyDao::new(connection.clone(), server_id)),
            content_store: Arc::new(SqliteContentStore::new(connection.clone())),
            statistics: Arc::new(SqliteStatisticsStore::new(connection)),
            events: EventBus::new(),
            state: ChannelStateCell::new(ChannelState::Stopped),
            server_id,
            config,
        }
    }

    async fn test_engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let path = DatabasePath::new(dir.path().join("engine_registry_test.db")).unwrap();
        let connection = crate::database::DatabaseConnection::initialize(DatabaseConfig::for_testing(path))
            .await
            .unwrap();
        std::mem::forget(dir);
        Engine::new(connection, ServerId::generate())
    }

    #[tokio::test]
    async fn deploy_registers_the_channel_and_rejects_a_duplicate() {
        let engine = test_engine().await;
        let channel = test_channel().await;
        let id = channel.config.id;
        engine.deploy(channel).await.unwrap();

        let duplicate = test_channel().await;
        let mut duplicate = duplicate;
        duplicate.config.id = id;
        assert!(matches!(engine.deploy(duplicate).await, Err(EngineError::AlreadyDeployed(_))));
    }

    #[tokio::test]
    async fn undeploy_removes_an_unknown_channel_error() {
        let engine = test_engine().await;
        let result = engine.undeploy(ChannelId::generate()).await;
        assert!(matches!(result, Err(EngineError::ChannelNotDeployed(_))));
    }
}
