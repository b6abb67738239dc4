//! Destination chain execution: runs the wave plan computed by
//! [`crate::domain::destination_chain`] against a channel's live
//! destination connectors, respecting `waitForPrevious` barriers and
//! `skipOnUpstreamError`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::connector::{DestinationConnector, DestinationContext};
use crate::domain::destination_chain::{should_skip, Wave};
use crate::domain_types::{ConnectorStatus, ContentType, MetaDataId};
use crate::executor::{Executor, FilterOutcome, MessageView};

/// One destination's runtime identity within a chain execution.
pub struct ChainMember {
    pub metadata_id: MetaDataId,
    pub connector: Arc<dyn DestinationConnector>,
    pub skip_on_upstream_error: bool,
}

/// The outcome of sending one destination: the status to record, the
/// content actually handed to the connector (after that destination's own
/// filter/transform), and, when the connector captured one, the remote's
/// response.
pub struct DestinationResult {
    pub metadata_id: MetaDataId,
    pub status: ConnectorStatus,
    pub sent_content: Vec<u8>,
    pub response: Option<Vec<u8>>,
}

/// Executes `waves` (as computed at deploy time by
/// [`crate::domain::destination_chain::plan`]) against `members`. Each
/// destination first runs its own filter and transform against `content`
/// (mirroring the source stage), then sends whatever survives. Destinations
/// within a wave run concurrently; a wave does not start until every
/// member of the previous wave has a terminal status.
pub async fn execute(
    waves: &[Wave],
    members: &[ChainMember],
    content: &[u8],
    executor: &Arc<dyn Executor>,
    context: &DestinationContext,
) -> Vec<DestinationResult> {
    let mut by_id: HashMap<MetaDataId, &ChainMember> =
        members.iter().map(|m| (m.metadata_id, m)).collect();

    let mut results: Vec<DestinationResult> = Vec::new();
    let mut earlier_errors: Vec<bool> = Vec::new();

    for wave in waves {
        let sends = wave.members.iter().map(|id| {
            let member = by_id.remove(id).expect("every planned member has a matching connector");
            let skip = should_skip(member.skip_on_upstream_error, earlier_errors.iter().copied());
            let id = *id;
            async move {
                if skip {
                    return DestinationResult {
                        metadata_id: id,
                        status: ConnectorStatus::Filtered,
                        sent_content: Vec::new(),
                        response: None,
                    };
                }

                let view = MessageView {
                    message_id: context.message_id,
                    metadata_id: id,
                    content_type: ContentType::Transformed,
                    content: content.to_vec(),
                    channel_map: serde_json::Map::new(),
                    connector_map: serde_json::Map::new(),
                };

                let outcome = match executor.filter(&view).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return DestinationResult {
                            metadata_id: id,
                            status: ConnectorStatus::Error,
                            sent_content: Vec::new(),
                            response: None,
                        };
                    }
                };
                if matches!(outcome, FilterOutcome::Reject) {
                    return DestinationResult {
                        metadata_id: id,
                        status: ConnectorStatus::Filtered,
                        sent_content: Vec::new(),
                        response: None,
                    };
                }

                let transformed = match executor.transform(view).await {
                    Ok(transformed) => transformed,
                    Err(_) => {
                        return DestinationResult {
                            metadata_id: id,
                            status: ConnectorStatus::Error,
                            sent_content: Vec::new(),
                            response: None,
                        };
                    }
                };

                match member.connector.send(context, &transformed.content).await {
                    Ok(outcome) => DestinationResult {
                        metadata_id: id,
                        status: outcome.status,
                        sent_content: transformed.content,
                        response: outcome.response,
                    },
                    Err(_) => DestinationResult {
                        metadata_id: id,
                        status: ConnectorStatus::Error,
                        sent_content: transformed.content,
                        response: None,
                    },
                }
            }
        });
        let wave_results = join_all(sends).await;
        earlier_errors.extend(
            wave_results
                .iter()
                .map(|result| matches!(result.status, ConnectorStatus::Error)),
        );
        results.extend(wave_results);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::SendOutcome;
    use crate::domain::source_map::SourceMap;
    use crate::domain_types::{ChannelId, MessageId};
    use crate::error::TransportError;
    use crate::executor::PassThroughExecutor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedConnector(ConnectorStatus, Arc<AtomicUsize>);

    #[async_trait]
    impl DestinationConnector for FixedConnector {
        async fn send(
            &self,
            _context: &DestinationContext,
            _content: &[u8],
        ) -> Result<SendOutcome, TransportError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(SendOutcome { status: self.0, response: None })
        }
    }

    fn member(id: i32, status: ConnectorStatus, calls: &Arc<AtomicUsize>, skip: bool) -> ChainMember {
        ChainMember {
            metadata_id: MetaDataId::try_new(id).unwrap(),
            connector: Arc::new(FixedConnector(status, calls.clone())),
            skip_on_upstream_error: skip,
        }
    }

    fn context() -> DestinationContext {
        DestinationContext {
            channel: ChannelId::generate(),
            message_id: MessageId::first(),
            source_map: SourceMap::default(),
        }
    }

    fn pass_through() -> Arc<dyn Executor> {
        Arc::new(PassThroughExecutor)
    }

    #[tokio::test]
    async fn all_members_in_a_single_wave_are_sent_to() {
        let calls = Arc::new(AtomicUsize::new(0));
        let members = vec![
            member(1, ConnectorStatus::Sent, &calls, false),
            member(2, ConnectorStatus::Sent, &calls, false),
        ];
        let waves = vec![Wave {
            members: vec![MetaDataId::try_new(1).unwrap(), MetaDataId::try_new(2).unwrap()],
        }];
        let results = execute(&waves, &members, b"payload", &pass_through(), &context()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_skip_on_upstream_error_member_is_skipped_after_an_earlier_wave_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let members = vec![
            member(1, ConnectorStatus::Error, &calls, false),
            member(2, ConnectorStatus::Sent, &calls, true),
        ];
        let waves = vec![
            Wave { members: vec![MetaDataId::try_new(1).unwrap()] },
            Wave { members: vec![MetaDataId::try_new(2).unwrap()] },
        ];
        let results = execute(&waves, &members, b"payload", &pass_through(), &context()).await;
        assert_eq!(results[1].status, ConnectorStatus::Filtered);
        // The skipped destination's connector was never invoked.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
