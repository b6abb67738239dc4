//! Startup recovery: finds connector messages left mid-flight by an
//! unclean shutdown, terminalizes them to `ConnectorStatus::Error` (the
//! process died before the real outcome could be recorded, so the attempt
//! is treated as failed rather than silently retried), and reconciles the
//! surrounding bookkeeping — a `ProcessingError` content row, the ERROR
//! statistics counter, and the parent message's `processed` flag.
//!
//! A connector message is "in flight" if it was last written with a
//! status that isn't terminal and isn't already `Queued` (which the
//! retry worker owns) — i.e. `Received` or `Transformed`, meaning the
//! process died between picking the destination and recording its
//! outcome.

use tracing::{info, instrument};

use crate::domain::message::{Content, ConnectorMessage};
use crate::domain_types::{ChannelId, ConnectorStatus, ContentType, MessageId, ServerId};
use crate::error::EngineError;
use crate::storage::{ContentStore, DonkeyDao, StatisticsStore};

/// One connector message recovery decided needed attention.
#[derive(Debug, Clone)]
pub struct RecoveredMessage {
    pub channel: ChannelId,
    pub message_id: MessageId,
    pub connector_message: ConnectorMessage,
}

/// Scans a channel's connector messages for a given message id and
/// returns those left in a non-terminal, non-queued state.
///
/// Pure function over already-fetched rows, so it can be unit tested
/// without a database; the imperative shell ([`scan_message`]) does the
/// fetching.
#[must_use]
pub fn find_stuck(
    channel: ChannelId,
    message_id: MessageId,
    connector_messages: &[ConnectorMessage],
) -> Vec<RecoveredMessage> {
    connector_messages
        .iter()
        .filter(|cm| !cm.status.is_terminal() && !cm.status.is_handed_to_queue())
        .map(|cm| RecoveredMessage {
            channel,
            message_id,
            connector_message: cm.clone(),
        })
        .collect()
}

/// Scans every connector message recorded for `message_id` in `channel`,
/// terminalizes any stuck ones to `ConnectorStatus::Error`, and marks the
/// parent message processed once every stuck connector message has been
/// reconciled.
///
/// # Errors
///
/// Returns [`EngineError`] if the connector messages can't be read, or any
/// write-back fails.
#[instrument(skip(dao, content_store, statistics))]
pub async fn scan_message(
    dao: &dyn DonkeyDao,
    content_store: &dyn ContentStore,
    statistics: &dyn StatisticsStore,
    server_id: ServerId,
    channel: ChannelId,
    message_id: MessageId,
) -> Result<Vec<RecoveredMessage>, EngineError> {
    let connector_messages = dao.get_connector_messages(channel, message_id).await?;
    let stuck = find_stuck(channel, message_id, &connector_messages);
    for recovered in &stuck {
        let mut cm = recovered.connector_message.clone();
        cm.transition(ConnectorStatus::Error);
        dao.upsert_connector_message(channel, &cm).await?;

        let error_content = Content::new(
            message_id,
            cm.metadata_id,
            ContentType::ProcessingError,
            b"connector message left in-flight by an unclean shutdown".to_vec(),
        );
        content_store.put(channel, &error_content, 0).await?;

        statistics.increment(channel, cm.metadata_id, server_id, ConnectorStatus::Error).await?;

        info!(
            channel = %channel,
            message_id = ?message_id,
            metadata_id = ?cm.metadata_id,
            "marked stuck connector message as errored during recovery"
        );
    }

    if !stuck.is_empty() {
        dao.mark_processed(channel, message_id).await?;
    }

    Ok(stuck)
}
