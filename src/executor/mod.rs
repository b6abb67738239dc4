//! The filter/transform executor: runs a channel or destination's
//! scripted filter and transform steps against one message.
//!
//! Scripts themselves are out of scope here (the spec's Non-goals exclude
//! a scripting engine); this module defines the seam a concrete script
//! runtime would plug into, plus the pass-through implementation used by
//! channels that configure no filter or transform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain_types::{ContentType, MessageId, MetaDataId};
use crate::error::ScriptError;

/// The content a filter or transform script sees and may rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: MessageId,
    pub metadata_id: MetaDataId,
    pub content_type: ContentType,
    pub content: Vec<u8>,
    pub channel_map: serde_json::Map<String, serde_json::Value>,
    pub connector_map: serde_json::Map<String, serde_json::Value>,
}

/// What a filter step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The message passes and transform/send should proceed.
    Accept,
    /// The message is rejected; the connector transitions to `Filtered`.
    Reject,
}

/// Runs a channel or destination's filter and transform logic against one
/// message.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Applies the filter step.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the filter script raises.
    async fn filter(&self, view: &MessageView) -> Result<FilterOutcome, ScriptError>;

    /// Applies the transform step, returning the rewritten content.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the transform script raises.
    async fn transform(&self, view: MessageView) -> Result<MessageView, ScriptError>;

    /// Applies the response-transform step to the content selected for
    /// reply, after a destination (or the source itself) has been chosen
    /// by the response policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the response-transform script raises.
    async fn transform_response(&self, view: MessageView) -> Result<MessageView, ScriptError>;
}

/// An executor with no configured filter or transform: every message is
/// accepted and passed through unmodified. Used by channels and
/// destinations that configure neither step.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughExecutor;

#[async_trait]
impl Executor for PassThroughExecutor {
    async fn filter(&self, _view: &MessageView) -> Result<FilterOutcome, ScriptError> {
        Ok(FilterOutcome::Accept)
    }

    async fn transform(&self, view: MessageView) -> Result<MessageView, ScriptError> {
        Ok(view)
    }

    async fn transform_response(&self, view: MessageView) -> Result<MessageView, ScriptError> {
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> MessageView {
        MessageView {
            message_id: MessageId::first(),
            metadata_id: MetaDataId::try_new(0).unwrap(),
            content_type: ContentType::Raw,
            content: b"hello".to_vec(),
            channel_map: serde_json::Map::new(),
            connector_map: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn pass_through_always_accepts() {
        let executor = PassThroughExecutor;
        assert_eq!(executor.filter(&view()).await.unwrap(), FilterOutcome::Accept);
    }

    #[tokio::test]
    async fn pass_through_transform_is_the_identity() {
        let executor = PassThroughExecutor;
        let original = view();
        let transformed = executor.transform(original.clone()).await.unwrap();
        assert_eq!(transformed.content, original.content);
    }
}
