//! The Donkey DAO: durable storage for messages and connector messages.
//!
//! Mirrors the functional-core/imperative-shell split of the teacher's
//! message storage: SQL text lives in constants built per-channel by
//! [`crate::storage::ddl`], and every I/O method is `#[instrument]`ed so a
//! trace span exists for every row write.

use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

use crate::database::DatabaseConnection;
use crate::domain::message::{ConnectorMessage, Message};
use crate::domain_types::{ChannelId, ConnectorStatus, MessageId, MetaDataId, ServerId};
use crate::error::{IntegrityError, TransportError};
use crate::storage::ddl::ChannelTableNames;

/// Durable storage for a channel's messages and connector messages.
///
/// Implementations are expected to be cheap to clone (an `Arc`-backed
/// connection pool) since one is held per deployed channel.
#[async_trait]
pub trait DonkeyDao: Send + Sync {
    /// Allocates the per-channel tables. Idempotent.
    async fn deploy_tables(&self, channel: ChannelId) -> Result<(), TransportError>;

    /// Drops the per-channel tables and all their rows.
    async fn undeploy_tables(&self, channel: ChannelId) -> Result<(), TransportError>;

    /// Inserts a new message row.
    async fn insert_message(&self, channel: ChannelId, message: &Message) -> Result<(), TransportError>;

    /// Inserts or replaces a connector message row.
    async fn upsert_connector_message(
        &self,
        channel: ChannelId,
        connector_message: &ConnectorMessage,
    ) -> Result<(), TransportError>;

    /// Fetches a message by id.
    async fn get_message(
        &self,
        channel: ChannelId,
        id: MessageId,
    ) -> Result<Option<Message>, TransportError>;

    /// Fetches every connector message recorded for `id`, ordered by
    /// metadata id.
    async fn get_connector_messages(
        &self,
        channel: ChannelId,
        id: MessageId,
    ) -> Result<Vec<ConnectorMessage>, IntegrityError>;

    /// Allocates the next message id for a channel by reading the highest
    /// id currently stored (`MAX(id) + 1`, or `1` for an empty channel) and
    /// reserving it with a placeholder row in the same transaction, so two
    /// concurrent callers can never be handed the same id.
    async fn next_message_id(&self, channel: ChannelId) -> Result<MessageId, TransportError>;

    /// Marks a message's parent row processed, e.g. once recovery has
    /// reconciled every stuck connector message under it.
    async fn mark_processed(&self, channel: ChannelId, id: MessageId) -> Result<(), TransportError>;
}

/// `SQLite`-backed implementation of [`DonkeyDao`].
pub struct SqliteDonkeyDao {
    connection: DatabaseConnection,
    server_id: ServerId,
}

impl SqliteDonkeyDao {
    #[must_use]
    pub fn new(connection: DatabaseConnection, server_id: ServerId) -> Self {
        Self { connection, server_id }
    }
}

#[async_trait]
impl DonkeyDao for SqliteDonkeyDao {
    #[instrument(skip(self))]
    async fn deploy_tables(&self, channel: ChannelId) -> Result<(), TransportError> {
        for statement in crate::storage::ddl::create_statements(channel) {
            sqlx::query(&statement).execute(self.connection.pool()).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn undeploy_tables(&self, channel: ChannelId) -> Result<(), TransportError> {
        for statement in crate::storage::ddl::drop_statements(channel) {
            sqlx::query(&statement).execute(self.connection.pool()).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, message))]
    async fn insert_message(&self, channel: ChannelId, message: &Message) -> Result<(), TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "INSERT OR REPLACE INTO {} (id, server_id, received_date, processed, original_id, import_id)
             VALUES (?, ?, ?, ?, ?, ?)",
            names.messages()
        );
        sqlx::query(&query)
            .bind(message.id.into_inner())
            .bind(message.server_id.to_string())
            .bind(message.received_date.timestamp_millis())
            .bind(message.processed)
            .bind(message.original_id.map(|m| m.into_inner()))
            .bind(message.import_id.clone())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self, connector_message))]
    async fn upsert_connector_message(
        &self,
        channel: ChannelId,
        connector_message: &ConnectorMessage,
    ) -> Result<(), TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "INSERT OR REPLACE INTO {} (
                message_id, metadata_id, connector_name, received_date, send_date,
                response_date, status, send_attempts, error_code
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            names.connector_messages()
        );
        sqlx::query(&query)
            .bind(connector_message.message_id.into_inner())
            .bind(connector_message.metadata_id.into_inner())
            .bind(&connector_message.connector_name)
            .bind(connector_message.received_date.timestamp_millis())
            .bind(connector_message.send_date.map(|d| d.timestamp_millis()))
            .bind(connector_message.response_date.map(|d| d.timestamp_millis()))
            .bind(connector_message.status.code().to_string())
            .bind(connector_message.send_attempts)
            .bind(connector_message.error_code)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_message(
        &self,
        channel: ChannelId,
        id: MessageId,
    ) -> Result<Option<Message>, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT id, server_id, received_date, processed, original_id, import_id FROM {} WHERE id = ?",
            names.messages()
        );
        let row = sqlx::query(&query)
            .bind(id.into_inner())
            .fetch_optional(self.connection.pool())
            .await?;
        let Some(row) = row else { return Ok(None) };

        let server_id: String = row.try_get("server_id")?;
        let received_millis: i64 = row.try_get("received_date")?;
        let original_id: Option<i64> = row.try_get("original_id")?;

        Ok(Some(Message {
            channel_id: channel,
            id,
            server_id: server_id
                .parse::<uuid::Uuid>()
                .map(ServerId::new)
                .unwrap_or(self.server_id),
            received_date: chrono::DateTime::from_timestamp_millis(received_millis)
                .unwrap_or_else(chrono::Utc::now),
            processed: row.try_get("processed")?,
            original_id: original_id.and_then(|v| MessageId::try_new(v).ok()),
            import_id: row.try_get("import_id")?,
        }))
    }

    #[instrument(skip(self))]
    async fn get_connector_messages(
        &self,
        channel: ChannelId,
        id: MessageId,
    ) -> Result<Vec<ConnectorMessage>, IntegrityError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT message_id, metadata_id, connector_name, received_date, send_date,
                    response_date, status, send_attempts, error_code
             FROM {} WHERE message_id = ? ORDER BY metadata_id ASC",
            names.connector_messages()
        );
        let rows = sqlx::query(&query)
            .bind(id.into_inner())
            .fetch_all(self.connection.pool())
            .await?;

        rows.into_iter()
            .map(|row| {
                let metadata_id: i32 = row.try_get("metadata_id")?;
                let status_code: String = row.try_get("status")?;
                let status = ConnectorStatus::from_code(
                    status_code.chars().next().unwrap_or('R'),
                )
                .unwrap_or(ConnectorStatus::Pending);
                let received_millis: i64 = row.try_get("received_date")?;
                let send_millis: Option<i64> = row.try_get("send_date")?;
                let response_millis: Option<i64> = row.try_get("response_date")?;

                Ok(ConnectorMessage {
                    message_id: id,
                    metadata_id: MetaDataId::try_new(metadata_id)
                        .map_err(|_| IntegrityError::OrphanedConnectorMessage { message_id: id.into_inner() })?,
                    connector_name: row.try_get("connector_name")?,
                    received_date: chrono::DateTime::from_timestamp_millis(received_millis)
                        .unwrap_or_else(chrono::Utc::now),
                    send_date: send_millis.and_then(chrono::DateTime::from_timestamp_millis),
                    response_date: response_millis.and_then(chrono::DateTime::from_timestamp_millis),
                    status,
                    send_attempts: row.try_get::<i64, _>("send_attempts")? as u32,
                    error_code: row.try_get("error_code")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn next_message_id(&self, channel: ChannelId) -> Result<MessageId, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let mut conn = self.connection.pool().acquire().await?;

        // BEGIN IMMEDIATE takes the write lock up front, so a concurrent
        // caller blocks here instead of racing the read below (the default
        // deferred BEGIN only locks lazily, on first write).
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let reserved: Result<MessageId, TransportError> = async {
            let query = format!("SELECT COALESCE(MAX(id), 0) AS max_id FROM {}", names.messages());
            let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
            let max_id: i64 = row.try_get("max_id")?;
            let next = MessageId::try_new(max_id + 1).unwrap_or_else(|_| MessageId::first());

            let reserve = format!(
                "INSERT INTO {} (id, server_id, received_date, processed) VALUES (?, '', 0, 0)",
                names.messages()
            );
            sqlx::query(&reserve).bind(next.into_inner()).execute(&mut *conn).await?;
            Ok(next)
        }
        .await;

        match reserved {
            Ok(next) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(next)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    #[instrument(skip(self))]
    async fn mark_processed(&self, channel: ChannelId, id: MessageId) -> Result<(), TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!("UPDATE {} SET processed = 1 WHERE id = ?", names.messages());
        sqlx::query(&query)
            .bind(id.into_inner())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }
}
