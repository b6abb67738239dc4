//! # Donkey - Channel-Based Message Routing Engine
//!
//! Donkey is a foundational platform service for integration engineering,
//! providing channel-based message routing between heterogeneous systems
//! (HL7/MLLP, HTTP, files, databases) with comprehensive observability
//! through structured logging.
//!
//! ## Architecture
//!
//! Donkey follows a "functional core, imperative shell" architecture:
//! pure domain logic (wave planning, response selection, state machines)
//! is separated from the async I/O that drives it (connectors, storage,
//! the engine).
//!
//! ```rust,no_run
//! use donkey::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
//! use donkey::domain_types::ServerId;
//! use donkey::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let path = DatabasePath::new("donkey.db")?;
//!     let connection = DatabaseConnection::initialize(DatabaseConfig::new(path)).await?;
//!     let engine = Engine::new(connection, ServerId::generate());
//!     // deploy channels and start them; each source connector hands
//!     // accepted messages straight to the channel's own pipeline...
//!     let _ = engine;
//!     Ok(())
//! }
//! ```

// Re-export the crate's core types at the root for ergonomic access.
pub use crate::config::*;
pub use crate::domain_types::*;
pub use crate::error::*;
pub use crate::observability::*;

// Core modules
pub mod channel;
pub mod chain;
pub mod config;
pub mod connector;
pub mod database;
pub mod domain;
pub mod domain_types;
pub mod engine;
pub mod error;
pub mod executor;
pub mod observability;
pub mod recovery;
pub mod rest_api;
pub mod server;
pub mod storage;
pub mod trace;
pub mod utils;
pub mod vm_router;

// Common imports
pub use ::tracing::{debug, error, info, instrument, warn};
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use std::collections::HashMap;
pub use std::time::Duration;
pub use thiserror::Error;
pub use tokio::time::timeout;
pub use uuid::Uuid;
