//! Durable storage for a deployed channel's messages, content, attachments
//! and statistics.
//!
//! # Architecture
//!
//! Follows the functional core / imperative shell pattern used throughout
//! the engine: pure DDL/segmentation/truncation logic lives in
//! `ddl`/`content`/`attachment`, and I/O is isolated to the `Sqlite*`
//! structs behind each trait.
//!
//! # Submodules
//!
//! - `ddl` - per-channel table name and `CREATE`/`DROP TABLE` generation
//! - `dao` - the Donkey DAO: message and connector message persistence
//! - `content` - content blob storage with truncation
//! - `attachment` - attachment segmentation and storage
//! - `statistics` - per-destination counters

pub mod attachment;
pub mod content;
pub mod dao;
pub mod ddl;
pub mod statistics;

pub use attachment::{AttachmentStore, SqliteAttachmentStore};
pub use content::{ContentStore, SqliteContentStore};
pub use dao::{DonkeyDao, SqliteDonkeyDao};
pub use statistics::{SqliteStatisticsStore, StatisticsStore};
