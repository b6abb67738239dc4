#![allow(missing_docs, dead_code)]

pub mod channel_state;
pub mod destination_chain;
pub mod message;
pub mod response_selector;
pub mod source_map;

pub use channel_state::{ChannelState, ChannelStateCell, StateTransitionError};
pub use destination_chain::{should_skip, DestinationPlanInput, Wave};
pub use message::{AttachmentSegment, ConnectorMessage, Content, Message, StatisticsCounters};
pub use response_selector::{select as select_response, ResponsePolicy};
pub use source_map::SourceMap;
