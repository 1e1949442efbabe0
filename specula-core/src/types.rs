//! Core domain types for specula
//!
//! These types form the canonical data model that every raw transcript
//! record and task file observation is normalized into.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | The canonical, taxonomy-conformant form of one raw transcript record |
//! | **Session** | One conversation transcript; identified by the producer's session id |
//! | **Agent** | A named worker the producer attributes a session to (enrichment, optional) |
//! | **BackgroundTask** | The derived state of one `.output` file written by an external task runner |
//! | **Subscriber** | A connected viewer receiving the push surface via the broadcast hub |
//!
//! The event taxonomy is deliberately open: the well-known kinds are
//! `user`, `assistant`, `tool_use`, `tool_result`, `progress` and
//! `system`, but unrecognized record types pass through verbatim so that
//! new producer record shapes surface immediately instead of vanishing.

use serde::{Deserialize, Serialize};

// ============================================
// Events
// ============================================

/// A canonical event, immutable once appended to the store.
///
/// `payload` is a normalized, truncated projection of the raw record —
/// never the raw record verbatim. Previews are bounded (200 chars for
/// text, 100 per aggregated sub-item) to keep fan-out cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Process-local monotonically increasing id, assigned by the store
    /// at append time. Never reused within one run, even after eviction.
    pub id: u64,
    /// Producer identifier (e.g. "claude-code")
    pub source_app: String,
    /// Conversation identifier from the transcript
    pub session_id: String,
    /// Agent display name, resolved via enrichment; `None` means unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Taxonomy kind, or a passthrough of an unrecognized raw type
    pub event_type: String,
    /// Tool name, present only for tool events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool input, present only for `tool_use` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    /// Type-dependent normalized projection of the raw record
    pub payload: serde_json::Value,
    /// Milliseconds since epoch; the record's own timestamp when
    /// parseable, otherwise ingestion time
    pub timestamp: i64,
    /// Backing model, when the record carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

/// A classified record that has not been appended yet — an [`Event`]
/// minus its id. The store assigns ids; the normalizer never does.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub source_app: String,
    pub session_id: String,
    pub agent_name: Option<String>,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub tool_input: Option<serde_json::Value>,
    pub payload: serde_json::Value,
    pub timestamp: i64,
    pub model_name: Option<String>,
}

impl NormalizedRecord {
    /// Promote to a full [`Event`] under the given id.
    pub fn into_event(self, id: u64) -> Event {
        Event {
            id,
            source_app: self.source_app,
            session_id: self.session_id,
            agent_name: self.agent_name,
            event_type: self.event_type,
            tool_name: self.tool_name,
            tool_input: self.tool_input,
            payload: self.payload,
            timestamp: self.timestamp,
            model_name: self.model_name,
        }
    }
}

/// Distinct facet values observed across all live events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub source_apps: Vec<String>,
    pub session_ids: Vec<String>,
    pub event_types: Vec<String>,
}

// ============================================
// Background tasks
// ============================================

/// Lifecycle of a background task, inferred from its output file.
///
/// `Failed` is part of the model but is never produced by the idle
/// heuristic — it is reserved for a positive completion signal that the
/// current pipeline has no source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Shape of a task output file, detected once from its first non-blank
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFormat {
    Jsonl,
    Text,
}

impl TaskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFormat::Jsonl => "jsonl",
            TaskFormat::Text => "text",
        }
    }
}

/// Derived state of one background-task output file.
///
/// Field casing follows the producer-facing wire shape (`startedAt`,
/// `updatedAt`, `outputPreview`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    /// Output filename minus its `.output` suffix — stable per task
    pub id: String,
    /// Inferred once from content; first classification wins
    pub description: String,
    /// Recency-derived status, not an authoritative signal
    pub status: TaskStatus,
    /// File creation time in epoch ms; first-seen wins
    pub started_at: i64,
    /// File modification time in epoch ms, refreshed every observation
    pub updated_at: i64,
    /// Bounded trailing slice of the file content
    pub output_preview: String,
    /// Detected once from the first non-blank line
    pub format: TaskFormat,
}

// ============================================
// Push surface
// ============================================

/// A message on the push surface, delivered to every live subscriber in
/// arrival order.
///
/// Serializes as a `{"type": ..., "data": ...}` envelope:
/// `initial` exactly once per new subscriber (before any live push),
/// then `event` / `task_update` as the pipelines produce them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Snapshot of recent events, sent once on subscribe
    Initial(Vec<Event>),
    /// One newly classified live event
    Event(Event),
    /// One task whose status or timestamp changed
    TaskUpdate(BackgroundTask),
}
