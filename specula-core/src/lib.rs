//! # specula-core
//!
//! Core library for specula — a real-time observer for AI coding
//! assistant activity.
//!
//! This library provides:
//! - Incremental, position-tracked tailing of JSONL session transcripts
//! - Heuristic normalization of raw records into a canonical event shape
//! - A bounded in-memory event store with monotonic ids
//! - Idle-heuristic tracking of background-task output files
//! - Non-blocking fan-out of events and task updates to subscribers
//!
//! ## Architecture
//!
//! Data flows one way: filesystem change → tailer reads the appended
//! delta → normalizer classifies each line → store appends (evicting the
//! oldest beyond capacity) → hub pushes to subscribers. The task watcher
//! runs a structurally identical pipeline over a second directory and
//! publishes through the same hub.
//!
//! Nothing is persisted: a restart re-seeds state from the tails of the
//! transcript files (backfill) and starts over.
//!
//! ## Example
//!
//! ```rust,no_run
//! use specula_core::{Config, Monitor};
//!
//! # async fn run() -> specula_core::Result<()> {
//! let config = Config::load()?;
//! let monitor = Monitor::new(config);
//! monitor.start().await?;
//!
//! let (_id, mut rx) = monitor.subscribe();
//! while let Some(message) = rx.recv().await {
//!     println!("{}", serde_json::to_string(&message)?);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use broadcast::{BroadcastHub, EventSink, SubscriberId};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{AgentMap, SessionTailer};
pub use monitor::{Monitor, MonitorStats};
pub use store::EventStore;
pub use tasks::TaskWatcher;
pub use types::*;

// Public modules
pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod tasks;
pub mod types;
