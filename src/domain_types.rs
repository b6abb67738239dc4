//! Domain newtypes shared across the channel runtime.
//!
//! These exist to prevent primitive obsession at the boundaries between
//! storage, connectors, and the pipeline: a raw `i64` message id and a raw
//! `i32` metadata id are easy to transpose by accident, so each gets its
//! own validated type.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a deployed channel.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, TryFrom, Into
))]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Generates a new random channel id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Table-name suffix: the id with hyphens replaced by underscores.
    #[must_use]
    pub fn table_suffix(&self) -> String {
        self.into_inner().to_string().replace('-', "_")
    }
}

/// Identity of the server process that received a message, used to scope
/// recovery to this instance in a cluster.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, TryFrom, Into
))]
pub struct ServerId(Uuid);

impl ServerId {
    /// Generates a new random server id (one per process lifetime).
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Channel-unique, monotonically increasing message identifier.
#[nutype(
    validate(greater = 0),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
        TryFrom, Into
    )
)]
pub struct MessageId(i64);

impl MessageId {
    /// The first message id a channel ever assigns.
    #[must_use]
    pub fn first() -> Self {
        Self::try_new(1).expect("1 is always a valid MessageId")
    }

    /// Returns the next id in sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if incrementing would overflow `i64`.
    pub fn next(&self) -> Result<Self, MessageIdError> {
        Self::try_new(self.into_inner() + 1)
    }
}

/// Connector slot within a channel: `0` is always the source; `1..N` are
/// destinations in configured order.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
        TryFrom, Into, Default
    ),
    default = 0
)]
pub struct MetaDataId(i32);

impl MetaDataId {
    /// The metadata id reserved for the source connector.
    pub const SOURCE: i32 = 0;

    /// Whether this slot is the source connector.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.into_inner() == Self::SOURCE
    }
}

/// SQLite connection pool size, shared by the engine-wide pool and every
/// per-channel pool.
#[nutype(
    validate(greater = 0, less_or_equal = 100),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default),
    default = 10
)]
pub struct ConnectionPoolSize(usize);

impl ConnectionPoolSize {
    /// Returns the pool size as a plain `usize`, for handing to `sqlx`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Content kinds stored per `(message_id, metadata_id, content_type)`, per
/// the fourteen kinds enumerated in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Raw = 1,
    ProcessedRaw = 2,
    Transformed = 3,
    Encoded = 4,
    Sent = 5,
    Response = 6,
    ResponseTransformed = 7,
    ProcessedResponse = 8,
    ConnectorMap = 9,
    ChannelMap = 10,
    ResponseMap = 11,
    ProcessingError = 12,
    PostprocessorError = 13,
    ResponseError = 14,
    SourceMap = 15,
}

impl ContentType {
    /// Wire/storage representation used as the `content_type` column value.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses a stored code back into a `ContentType`.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Raw,
            2 => Self::ProcessedRaw,
            3 => Self::Transformed,
            4 => Self::Encoded,
            5 => Self::Sent,
            6 => Self::Response,
            7 => Self::ResponseTransformed,
            8 => Self::ProcessedResponse,
            9 => Self::ConnectorMap,
            10 => Self::ChannelMap,
            11 => Self::ResponseMap,
            12 => Self::ProcessingError,
            13 => Self::PostprocessorError,
            14 => Self::ResponseError,
            15 => Self::SourceMap,
            _ => return None,
        })
    }

    /// Whether this content kind is one of the serialized key/value maps
    /// used by routing and scripts (content types 9-11, 15).
    #[must_use]
    pub fn is_map_kind(self) -> bool {
        matches!(
            self,
            Self::ConnectorMap | Self::ChannelMap | Self::ResponseMap | Self::SourceMap
        )
    }
}

/// Terminal and non-terminal status a `ConnectorMessage` can hold.
///
/// Transitions are strictly ordered `R -> T -> (Q | S | F | E)` within a
/// single destination; `F` can also be reached directly from `R` when the
/// filter rejects before any transform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorStatus {
    /// Received: connector work has started.
    Received,
    /// Filtered: the filter rejected the message.
    Filtered,
    /// Transformed: filter accepted and the transformer ran.
    Transformed,
    /// Sent: the destination accepted the message.
    Sent,
    /// Queued: send failed and the message was handed to the retry queue.
    Queued,
    /// Error: an unrecoverable failure occurred for this destination.
    Error,
    /// Pending: recovery found this connector message mid-flight.
    Pending,
}

impl ConnectorStatus {
    /// The single-character code used in storage and in the spec's wire
    /// format (`R F T S Q E P`).
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Received => 'R',
            Self::Filtered => 'F',
            Self::Transformed => 'T',
            Self::Sent => 'S',
            Self::Queued => 'Q',
            Self::Error => 'E',
            Self::Pending => 'P',
        }
    }

    /// Parses a stored status code back into a `ConnectorStatus`.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'R' => Self::Received,
            'F' => Self::Filtered,
            'T' => Self::Transformed,
            'S' => Self::Sent,
            'Q' => Self::Queued,
            'E' => Self::Error,
            'P' => Self::Pending,
            _ => return None,
        })
    }

    /// Whether this status is terminal for the purposes of "Message is
    /// processed" (S, F, or E — Q counts separately, see
    /// [`ConnectorStatus::is_handed_to_queue`]).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Filtered | Self::Error)
    }

    /// Whether this status represents having been handed to the retry
    /// queue (counts toward "processed" without being terminal itself).
    #[must_use]
    pub fn is_handed_to_queue(self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Precedence used by the response selector's `DESTINATIONS_COMPLETED`
    /// policy: `SENT > QUEUED > FILTERED > ERROR > other`. Higher wins.
    #[must_use]
    pub fn response_precedence(self) -> u8 {
        match self {
            Self::Sent => 4,
            Self::Queued => 3,
            Self::Filtered => 2,
            Self::Error => 1,
            Self::Received | Self::Transformed | Self::Pending => 0,
        }
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trips_through_its_code() {
        for ct in [
            ContentType::Raw,
            ContentType::ProcessedRaw,
            ContentType::Transformed,
            ContentType::Encoded,
            ContentType::Sent,
            ContentType::Response,
            ContentType::ResponseTransformed,
            ContentType::ProcessedResponse,
            ContentType::ConnectorMap,
            ContentType::ChannelMap,
            ContentType::ResponseMap,
            ContentType::ProcessingError,
            ContentType::PostprocessorError,
            ContentType::ResponseError,
            ContentType::SourceMap,
        ] {
            assert_eq!(ContentType::from_code(ct.code()), Some(ct));
        }
    }

    #[test]
    fn connector_status_round_trips_through_its_code() {
        for status in [
            ConnectorStatus::Received,
            ConnectorStatus::Filtered,
            ConnectorStatus::Transformed,
            ConnectorStatus::Sent,
            ConnectorStatus::Queued,
            ConnectorStatus::Error,
            ConnectorStatus::Pending,
        ] {
            assert_eq!(ConnectorStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn response_precedence_orders_sent_above_queued_above_filtered_above_error() {
        assert!(
            ConnectorStatus::Sent.response_precedence()
                > ConnectorStatus::Queued.response_precedence()
        );
        assert!(
            ConnectorStatus::Queued.response_precedence()
                > ConnectorStatus::Filtered.response_precedence()
        );
        assert!(
            ConnectorStatus::Filtered.response_precedence()
                > ConnectorStatus::Error.response_precedence()
        );
    }

    #[test]
    fn message_id_sequence_starts_at_one_and_increments() {
        let first = MessageId::first();
        assert_eq!(first.into_inner(), 1);
        let second = first.next().expect("increment should succeed");
        assert_eq!(second.into_inner(), 2);
    }

    #[test]
    fn channel_id_table_suffix_replaces_hyphens_with_underscores() {
        let id = ChannelId::generate();
        let suffix = id.table_suffix();
        assert!(!suffix.contains('-'));
        assert_eq!(suffix.len(), id.into_inner().to_string().len());
    }
}
