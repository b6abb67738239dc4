//! Full provenance trace: finds a message's root ancestor by walking its
//! `SourceMap` chain backward, then walks the channel-dependency graph
//! forward from that root to rebuild every branch the message's
//! descendants took, as a tree.

use std::collections::HashSet;

use futures::future::BoxFuture;
use tracing::instrument;

use crate::config::{ChannelConfig, ConnectorConfig};
use crate::domain::source_map::SourceMap;
use crate::domain_types::{ChannelId, ContentType, MessageId, MetaDataId};
use crate::error::TransportError;
use crate::storage::{ContentStore, DonkeyDao};

/// Hard ceiling on trace depth, guarding against a corrupted or cyclic
/// source map chain walking forever.
pub const MAX_TRACE_DEPTH: usize = 64;

/// One node in a message's provenance tree: the channel and message it
/// identifies, how deep it sits below the root, how long after the root
/// it was received, a snapshot of its raw content (if still on hand),
/// and the children it fanned out to, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceNode {
    pub channel: ChannelId,
    pub message_id: MessageId,
    pub depth: usize,
    pub latency_from_root_ms: i64,
    pub content: Option<Vec<u8>>,
    pub children: Vec<TraceNode>,
}

/// Which channels a channel's VM destinations can forward to, derived
/// from deployed channel configuration. The forward walk in [`trace`]
/// only follows edges this graph knows about, so it can't wander into
/// channels unrelated to the one being traced.
#[derive(Debug, Clone, Default)]
pub struct ChannelDependencyGraph {
    children: std::collections::HashMap<ChannelId, Vec<ChannelId>>,
}

impl ChannelDependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from every deployed channel's configured VM
    /// destinations.
    #[must_use]
    pub fn from_configs(configs: &[ChannelConfig]) -> Self {
        let mut children: std::collections::HashMap<ChannelId, Vec<ChannelId>> =
            std::collections::HashMap::new();
        for config in configs {
            for destination in &config.destination_connectors {
                if let ConnectorConfig::Vm { target_channel } = destination.connector {
                    children.entry(config.id).or_default().push(target_channel);
                }
            }
        }
        Self { children }
    }

    /// The channels `channel` can dispatch VM destinations to, if any.
    #[must_use]
    pub fn children_of(&self, channel: ChannelId) -> &[ChannelId] {
        self.children.get(&channel).map_or(&[], Vec::as_slice)
    }
}

/// Walks the source map chain backward from `(channel, message_id)`,
/// returning the oldest ancestor found. Stops at [`MAX_TRACE_DEPTH`]
/// hops, a missing or unparseable source map, or the first repeated
/// node (a cycle).
async fn backward_root(
    content_store: &dyn ContentStore,
    channel: ChannelId,
    message_id: MessageId,
) -> Result<(ChannelId, MessageId), TransportError> {
    let mut visited = vec![(channel, message_id)];
    let mut current = (channel, message_id);

    while visited.len() < MAX_TRACE_DEPTH {
        let Some(content) = content_store
            .get(current.0, current.1, MetaDataId::default(), ContentType::SourceMap)
            .await?
        else {
            break;
        };
        let Ok(map) = serde_json::from_slice::<SourceMap>(&content.content) else {
            break;
        };
        let Some(parent) = map.immediate_parent() else {
            break;
        };
        if visited.contains(&parent) {
            break;
        }
        visited.push(parent);
        current = parent;
    }

    Ok(current)
}

/// How many milliseconds after `root_received` a node's message was
/// received, or `0` if the node's message row can't be found.
async fn latency_from_root_ms(
    dao: &dyn DonkeyDao,
    channel: ChannelId,
    message_id: MessageId,
    root_received: chrono::DateTime<chrono::Utc>,
) -> Result<i64, TransportError> {
    let message = dao.get_message(channel, message_id).await?;
    Ok(message
        .map(|m| (m.received_date - root_received).num_milliseconds())
        .unwrap_or(0))
}

#[allow(clippy::too_many_arguments)]
fn forward_walk<'a>(
    dao: &'a dyn DonkeyDao,
    content_store: &'a dyn ContentStore,
    graph: &'a ChannelDependencyGraph,
    channel: ChannelId,
    message_id: MessageId,
    root_received: chrono::DateTime<chrono::Utc>,
    depth: usize,
    max_depth: usize,
    visited: HashSet<(ChannelId, MessageId)>,
) -> BoxFuture<'a, Result<TraceNode, TransportError>> {
    Box::pin(async move {
        let latency_from_root_ms = latency_from_root_ms(dao, channel, message_id, root_received).await?;
        let content = content_store
            .get(channel, message_id, MetaDataId::default(), ContentType::Raw)
            .await?
            .map(|c| c.content);

        let mut children = Vec::new();
        if depth < max_depth {
            for &child_channel in graph.children_of(channel) {
                let child_ids = content_store.find_children(child_channel, channel, message_id).await?;
                for child_message_id in child_ids {
                    if visited.contains(&(child_channel, child_message_id)) {
                        continue;
                    }
                    let mut next_visited = visited.clone();
                    next_visited.insert((child_channel, child_message_id));
                    let child = forward_walk(
                        dao,
                        content_store,
                        graph,
                        child_channel,
                        child_message_id,
                        root_received,
                        depth + 1,
                        max_depth,
                        next_visited,
                    )
                    .await?;
                    children.push(child);
                }
            }
        }

        Ok(TraceNode { channel, message_id, depth, latency_from_root_ms, content, children })
    })
}

/// Builds the full provenance tree for `(channel, message_id)`: walks
/// its source map chain back to the root, then walks the channel
/// dependency graph forward from there to rebuild every descendant
/// branch, bounded by `max_depth` hops (and always by
/// [`MAX_TRACE_DEPTH`]).
///
/// # Errors
///
/// Returns [`TransportError`] if reading a message or content row fails.
#[instrument(skip(dao, content_store, graph))]
pub async fn trace(
    dao: &dyn DonkeyDao,
    content_store: &dyn ContentStore,
    graph: &ChannelDependencyGraph,
    channel: ChannelId,
    message_id: MessageId,
    max_depth: usize,
) -> Result<TraceNode, TransportError> {
    let (root_channel, root_message) = backward_root(content_store, channel, message_id).await?;
    let root_received = dao
        .get_message(root_channel, root_message)
        .await?
        .map(|m| m.received_date)
        .unwrap_or_else(chrono::Utc::now);

    let mut visited = HashSet::new();
    visited.insert((root_channel, root_message));

    forward_walk(
        dao,
        content_store,
        graph,
        root_channel,
        root_message,
        root_received,
        0,
        max_depth.min(MAX_TRACE_DEPTH),
        visited,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Content, ConnectorMessage, Message};
    use crate::domain_types::ServerId;
    use crate::error::IntegrityError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeContentStore {
        rows: Mutex<HashMap<(ChannelId, MessageId, MetaDataId, i32), Content>>,
    }

    impl FakeContentStore {
        fn put_source_map(&self, channel: ChannelId, message_id: MessageId, map: &SourceMap) {
            let content = Content::new(
                message_id,
                MetaDataId::default(),
                ContentType::SourceMap,
                serde_json::to_vec(map).unwrap(),
            );
            self.rows.lock().unwrap().insert(
                (channel, message_id, MetaDataId::default(), ContentType::SourceMap.code()),
                content,
            );
        }
    }

    #[async_trait]
    impl ContentStore for FakeContentStore {
        async fn put(&self, _channel: ChannelId, _content: &Content, _max_len: usize) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn get(
            &self,
            channel: ChannelId,
            message_id: MessageId,
            metadata_id: MetaDataId,
            content_type: ContentType,
        ) -> Result<Option<Content>, TransportError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(channel, message_id, metadata_id, content_type.code()))
                .cloned())
        }

        async fn find_children(
            &self,
            channel: ChannelId,
            parent_channel: ChannelId,
            parent_message: MessageId,
        ) -> Result<Vec<MessageId>, TransportError> {
            let rows = self.rows.lock().unwrap();
            let mut children = Vec::new();
            for ((row_channel, row_message, _, code), content) in rows.iter() {
                if *row_channel != channel || *code != ContentType::SourceMap.code() {
                    continue;
                }
                let Ok(map) = serde_json::from_slice::<SourceMap>(&content.content) else { continue };
                if map.immediate_parent() == Some((parent_channel, parent_message)) {
                    children.push(*row_message);
                }
            }
            children.sort_by_key(|id| id.into_inner());
            Ok(children)
        }
    }

    #[derive(Default)]
    struct FakeDonkeyDao {
        messages: Mutex<HashMap<(ChannelId, MessageId), Message>>,
    }

    impl FakeDonkeyDao {
        fn put_message(&self, channel: ChannelId, message: Message) {
            self.messages.lock().unwrap().insert((channel, message.id), message);
        }
    }

    #[async_trait]
    impl DonkeyDao for FakeDonkeyDao {
        async fn deploy_tables(&self, _channel: ChannelId) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn undeploy_tables(&self, _channel: ChannelId) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn insert_message(&self, _channel: ChannelId, _message: &Message) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn upsert_connector_message(
            &self,
            _channel: ChannelId,
            _connector_message: &ConnectorMessage,
        ) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn get_message(&self, channel: ChannelId, id: MessageId) -> Result<Option<Message>, TransportError> {
            Ok(self.messages.lock().unwrap().get(&(channel, id)).cloned())
        }

        async fn get_connector_messages(
            &self,
            _channel: ChannelId,
            _id: MessageId,
        ) -> Result<Vec<ConnectorMessage>, IntegrityError> {
            unimplemented!("not exercised by these tests")
        }

        async fn next_message_id(&self, _channel: ChannelId) -> Result<MessageId, TransportError> {
            unimplemented!("not exercised by these tests")
        }

        async fn mark_processed(&self, _channel: ChannelId, _id: MessageId) -> Result<(), TransportError> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn message_at(id: MessageId, received_date: chrono::DateTime<chrono::Utc>) -> Message {
        Message {
            channel_id: ChannelId::generate(),
            id,
            server_id: ServerId::generate(),
            received_date,
            processed: true,
            original_id: None,
            import_id: None,
        }
    }

    #[tokio::test]
    async fn a_root_message_with_no_source_map_traces_to_a_single_node() {
        let content_store = FakeContentStore::default();
        let dao = FakeDonkeyDao::default();
        let graph = ChannelDependencyGraph::new();
        let channel = ChannelId::generate();
        dao.put_message(channel, message_at(MessageId::first(), chrono::Utc::now()));

        let root = trace(&dao, &content_store, &graph, channel, MessageId::first(), MAX_TRACE_DEPTH)
            .await
            .unwrap();

        assert_eq!(root.channel, channel);
        assert_eq!(root.message_id, MessageId::first());
        assert_eq!(root.depth, 0);
        assert_eq!(root.latency_from_root_ms, 0);
        assert!(root.children.is_empty());
    }

    #[tokio::test]
    async fn a_two_hop_chain_is_traced_back_to_its_root() {
        let content_store = FakeContentStore::default();
        let dao = FakeDonkeyDao::default();
        let graph = ChannelDependencyGraph::new();
        let root_channel = ChannelId::generate();
        let leaf_channel = ChannelId::generate();
        let root_message = MessageId::first();
        let leaf_message = MessageId::first().next().unwrap();

        let map = SourceMap::default().extend_for_hop(root_channel, root_message);
        content_store.put_source_map(leaf_channel, leaf_message, &map);
        dao.put_message(root_channel, message_at(root_message, chrono::Utc::now()));

        let root = trace(&dao, &content_store, &graph, leaf_channel, leaf_message, MAX_TRACE_DEPTH)
            .await
            .unwrap();

        assert_eq!(root.channel, root_channel);
        assert_eq!(root.message_id, root_message);
        assert_eq!(root.depth, 0);
    }

    #[tokio::test]
    async fn a_cyclic_chain_stops_instead_of_looping_forever() {
        let content_store = FakeContentStore::default();
        let dao = FakeDonkeyDao::default();
        let graph = ChannelDependencyGraph::new();
        let a = ChannelId::generate();
        let b = ChannelId::generate();
        let m1 = MessageId::first();
        let m2 = MessageId::first().next().unwrap();

        content_store.put_source_map(a, m1, &SourceMap::default().extend_for_hop(b, m2));
        content_store.put_source_map(b, m2, &SourceMap::default().extend_for_hop(a, m1));
        dao.put_message(b, message_at(m2, chrono::Utc::now()));

        let root = trace(&dao, &content_store, &graph, a, m1, MAX_TRACE_DEPTH).await.unwrap();

        // b -> a -> b is a cycle; the backward walk stops at the first repeat.
        assert_eq!(root.channel, b);
        assert_eq!(root.message_id, m2);
    }

    #[tokio::test]
    async fn a_vm_fan_out_is_rebuilt_as_ordered_children() {
        let content_store = FakeContentStore::default();
        let dao = FakeDonkeyDao::default();
        let root_channel = ChannelId::generate();
        let child_a_channel = ChannelId::generate();
        let child_b_channel = ChannelId::generate();
        let root_message = MessageId::first();
        let child_a_message = MessageId::first().next().unwrap();
        let child_b_message = child_a_message.next().unwrap();

        let config = |id: ChannelId, targets: &[ChannelId]| ChannelConfig {
            id,
            name: "channel".to_string(),
            enabled: true,
            revision: 1,
            source_connector: ConnectorConfig::Http { url: "127.0.0.1:0".to_string() },
            destination_connectors: targets
                .iter()
                .enumerate()
                .map(|(i, target)| crate::config::DestinationConfig {
                    metadata_id: MetaDataId::try_new(i as i32 + 1).unwrap(),
                    name: format!("dest-{i}"),
                    connector: ConnectorConfig::Vm { target_channel: *target },
                    wait_for_previous: false,
                    skip_on_upstream_error: false,
                    queue_enabled: false,
                    reconnect_interval_ms: 5_000,
                    max_attempts: 3,
                })
                .collect(),
            response_policy: crate::config::ResponsePolicyConfig::None,
            properties: HashMap::new(),
        };
        let graph = ChannelDependencyGraph::from_configs(&[
            config(root_channel, &[child_a_channel, child_b_channel]),
            config(child_a_channel, &[]),
            config(child_b_channel, &[]),
        ]);

        let now = chrono::Utc::now();
        dao.put_message(root_channel, message_at(root_message, now));
        dao.put_message(child_a_channel, message_at(child_a_message, now + chrono::Duration::milliseconds(5)));
        dao.put_message(child_b_channel, message_at(child_b_message, now + chrono::Duration::milliseconds(9)));

        content_store.put_source_map(
            child_a_channel,
            child_a_message,
            &SourceMap::default().extend_for_hop(root_channel, root_message),
        );
        content_store.put_source_map(
            child_b_channel,
            child_b_message,
            &SourceMap::default().extend_for_hop(root_channel, root_message),
        );

        let root = trace(&dao, &content_store, &graph, root_channel, root_message, MAX_TRACE_DEPTH)
            .await
            .unwrap();

        assert_eq!(root.children.len(), 2);
        let a = root.children.iter().find(|n| n.channel == child_a_channel).unwrap();
        let b = root.children.iter().find(|n| n.channel == child_b_channel).unwrap();
        assert_eq!(a.depth, 1);
        assert_eq!(a.latency_from_root_ms, 5);
        assert_eq!(b.latency_from_root_ms, 9);
        assert!(a.children.is_empty());
        assert!(b.children.is_empty());
    }
}
