//! The source map: a key/value bag recording a message's provenance
//! across in-process (VM) hops, stored as `ContentType::SourceMap` JSON.
//!
//! Readers must tolerate missing plural keys (fall back to the singular
//! ones) and treat any length mismatch between the two arrays as
//! corruption — the node is then treated as a root.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain_types::{ChannelId, MessageId};

/// The wire format stored in a `SourceMap` content row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_channel_id: Option<ChannelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_channel_ids: Vec<ChannelId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_message_ids: Vec<MessageId>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SourceMap {
    /// The immediate parent `(channel, message)` this map points at, if
    /// any. Falls back to the singular keys when the plural arrays are
    /// absent or mismatched in length (corruption — treat as root).
    #[must_use]
    pub fn immediate_parent(&self) -> Option<(ChannelId, MessageId)> {
        if self.source_channel_ids.len() == self.source_message_ids.len()
            && !self.source_channel_ids.is_empty()
        {
            let idx = self.source_channel_ids.len() - 1;
            return Some((self.source_channel_ids[idx], self.source_message_ids[idx]));
        }
        match (self.source_channel_id, self.source_message_id) {
            (Some(c), Some(m)) => Some((c, m)),
            _ => None,
        }
    }

    /// Whether the plural chain arrays are internally consistent.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.source_channel_ids.len() == self.source_message_ids.len()
    }

    /// Extends this source map for a hop from `(from_channel,
    /// from_message)` to a VM destination, per the router's step 2:
    /// append the current identity to the chain arrays and set the
    /// singular keys to the immediate parent.
    #[must_use]
    pub fn extend_for_hop(&self, from_channel: ChannelId, from_message: MessageId) -> Self {
        let mut next = self.clone();
        if !next.is_well_formed() {
            // Corrupted chain: restart it from this hop rather than
            // propagate garbage further downstream.
            next.source_channel_ids.clear();
            next.source_message_ids.clear();
        }
        next.source_channel_ids.push(from_channel);
        next.source_message_ids.push(from_message);
        next.source_channel_id = Some(from_channel);
        next.source_message_id = Some(from_message);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> (Vec<ChannelId>, Vec<MessageId>) {
        let channels: Vec<_> = (0..n).map(|_| ChannelId::generate()).collect();
        let messages: Vec<_> = (0..n)
            .map(|i| MessageId::try_new(i as i64 + 1).unwrap())
            .collect();
        (channels, messages)
    }

    #[test]
    fn empty_map_has_no_parent() {
        let map = SourceMap::default();
        assert_eq!(map.immediate_parent(), None);
    }

    #[test]
    fn mismatched_arrays_fall_back_to_singular_keys() {
        let (channels, _messages) = ids(2);
        let mut map = SourceMap {
            source_channel_ids: channels,
            source_message_ids: vec![MessageId::first()],
            ..Default::default()
        };
        assert!(!map.is_well_formed());
        assert_eq!(map.immediate_parent(), None);

        map.source_channel_id = Some(ChannelId::generate());
        map.source_message_id = Some(MessageId::first());
        assert!(map.immediate_parent().is_some());
    }

    #[test]
    fn well_formed_chain_reports_last_entry_as_parent() {
        let (channels, messages) = ids(3);
        let map = SourceMap {
            source_channel_ids: channels.clone(),
            source_message_ids: messages.clone(),
            ..Default::default()
        };
        assert_eq!(
            map.immediate_parent(),
            Some((channels[2], messages[2]))
        );
    }

    #[test]
    fn extend_for_hop_appends_and_sets_singular_keys() {
        let map = SourceMap::default();
        let channel = ChannelId::generate();
        let message = MessageId::first();
        let extended = map.extend_for_hop(channel, message);
        assert_eq!(extended.source_channel_ids, vec![channel]);
        assert_eq!(extended.source_message_ids, vec![message]);
        assert_eq!(extended.source_channel_id, Some(channel));
        assert_eq!(extended.source_message_id, Some(message));
    }

    #[test]
    fn round_trip_through_json_preserves_chain() {
        let (channels, messages) = ids(2);
        let map = SourceMap {
            source_channel_ids: channels,
            source_message_ids: messages,
            ..Default::default()
        };
        let json = serde_json::to_string(&map).unwrap();
        let back: SourceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }
}
