//! Ingestion layer for session transcripts
//!
//! This module turns raw JSONL transcript files into canonical events in
//! the store, and pushes each live event through the broadcast port.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌────────────┐
//! │  *.jsonl files   │ ──► │ SessionTailer │ ──► │ EventStore │
//! │ (sessions dir)   │     │ (byte offsets)│     │ (ring)     │
//! └──────────────────┘     └───────┬───────┘     └────────────┘
//!                                  │
//!                     ┌────────────┼────────────┐
//!                     ▼            ▼            ▼
//!               normalize      backfill      EventSink
//!               (classify)   (cold start)    (publish)
//! ```
//!
//! Two trigger sources — filesystem change notifications and a periodic
//! poll — both converge on the tailer's idempotent read step; the
//! per-file byte offset is the correctness mechanism, not the trigger.
//! The backfiller runs once at startup and populates the store without
//! publishing, so viewers that connect later see history without anyone
//! replaying it.

mod backfill;
mod enrich;
mod normalize;
mod tailer;

pub use enrich::AgentMap;
pub use normalize::{normalize_line, SOURCE_APP};
pub use tailer::SessionTailer;
