//! Selects which connector message supplies the response returned to the
//! originating source connector.
//!
//! Pure function over the candidate connector messages for one message;
//! the policy decides which candidates are even eligible, and ties among
//! eligible candidates are broken by status precedence, then by the
//! lowest metadata id.

use serde::{Deserialize, Serialize};

use crate::domain::message::ConnectorMessage;
use crate::domain_types::MetaDataId;

/// When the response is captured, per the channel's `responseVariable`
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePolicy {
    /// No response capture; the source connector gets no reply body.
    None,
    /// The source connector's own transformed message, before any
    /// destination has run.
    AutoBeforeProcessing,
    /// The source connector's message, after its own transform but before
    /// destinations.
    AutoAfterProcessing,
    /// The source connector's post-transform content, verbatim.
    SourceTransformed,
    /// The channel's postprocessor script result.
    Postprocessor,
    /// The response among all destinations once the whole chain settles.
    DestinationsCompleted,
}

/// Selects the connector message whose content should become the
/// source's response, among `candidates`, under `policy`.
///
/// For `DestinationsCompleted` the candidates are the destination
/// connector messages; ties in status precedence are broken by the
/// lowest metadata id. Returns `None` when the policy yields no content
/// (`None`) or there are no candidates to choose from.
#[must_use]
pub fn select<'a>(
    policy: ResponsePolicy,
    source: Option<&'a ConnectorMessage>,
    destinations: &'a [ConnectorMessage],
) -> Option<&'a ConnectorMessage> {
    match policy {
        ResponsePolicy::None => None,
        ResponsePolicy::AutoBeforeProcessing
        | ResponsePolicy::AutoAfterProcessing
        | ResponsePolicy::SourceTransformed
        | ResponsePolicy::Postprocessor => source,
        ResponsePolicy::DestinationsCompleted => select_by_precedence(destinations),
    }
}

fn select_by_precedence(candidates: &[ConnectorMessage]) -> Option<&ConnectorMessage> {
    candidates.iter().min_by_key(|candidate| {
        (
            std::cmp::Reverse(candidate.status.response_precedence()),
            candidate.metadata_id,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::ConnectorStatus;

    fn connector_message(metadata_id: i32, status: ConnectorStatus) -> ConnectorMessage {
        let mut cm = ConnectorMessage::new(
            crate::domain_types::MessageId::first(),
            MetaDataId::try_new(metadata_id).unwrap(),
            "dest",
        );
        cm.transition(status);
        cm
    }

    #[test]
    fn none_policy_yields_no_response() {
        let source = connector_message(0, ConnectorStatus::Sent);
        assert!(select(ResponsePolicy::None, Some(&source), &[]).is_none());
    }

    #[test]
    fn auto_policies_select_the_source_connector_message() {
        let source = connector_message(0, ConnectorStatus::Received);
        let selected = select(ResponsePolicy::AutoBeforeProcessing, Some(&source), &[]).unwrap();
        assert_eq!(selected.metadata_id, source.metadata_id);
    }

    #[test]
    fn destinations_completed_prefers_sent_over_queued_over_filtered_over_error() {
        let destinations = vec![
            connector_message(1, ConnectorStatus::Error),
            connector_message(2, ConnectorStatus::Queued),
            connector_message(3, ConnectorStatus::Sent),
        ];
        let selected = select(ResponsePolicy::DestinationsCompleted, None, &destinations).unwrap();
        assert_eq!(selected.metadata_id, MetaDataId::try_new(3).unwrap());
    }

    #[test]
    fn ties_in_precedence_are_broken_by_lowest_metadata_id() {
        let destinations = vec![
            connector_message(5, ConnectorStatus::Sent),
            connector_message(2, ConnectorStatus::Sent),
        ];
        let selected = select(ResponsePolicy::DestinationsCompleted, None, &destinations).unwrap();
        assert_eq!(selected.metadata_id, MetaDataId::try_new(2).unwrap());
    }

    #[test]
    fn destinations_completed_with_no_destinations_yields_none() {
        assert!(select(ResponsePolicy::DestinationsCompleted, None, &[]).is_none());
    }
}
