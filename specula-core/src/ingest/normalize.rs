//! Record normalizer
//!
//! Turns one raw transcript line into a [`NormalizedRecord`], or nothing.
//! Classification is structural, not exhaustive: the record's declared
//! `type` decides the branch, and for `assistant`/`user` records the
//! nested content blocks are scanned to reclassify into `tool_use` /
//! `tool_result`. The first matching block wins — a record carrying both
//! a tool call and prose text is reported only as the tool event.
//!
//! # Error Handling
//!
//! Normalization never raises to its caller. Malformed JSON, missing
//! fields, unexpected shapes — all of it yields a skip (`None`). Free
//! text is truncated to fixed preview lengths (200 chars for text, 100
//! per aggregated sub-item) before it reaches the payload; the payload
//! is a projection, never the raw record.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::enrich::AgentMap;
use crate::types::NormalizedRecord;

/// Producer identifier stamped on every event.
pub const SOURCE_APP: &str = "claude-code";

const TEXT_PREVIEW_CHARS: usize = 200;
const ITEM_PREVIEW_CHARS: usize = 100;

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// One line of a session transcript.
///
/// Uses `#[serde(default)]` liberally so missing fields never fail the
/// whole record.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    session_id: Option<String>,
    timestamp: Option<String>,
    message: Option<RawMessage>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    model: Option<String>,
    stop_reason: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

/// Classify one raw line into a [`NormalizedRecord`], or skip it.
pub fn normalize_line(line: &str, agents: &AgentMap) -> Option<NormalizedRecord> {
    let record: RawRecord = serde_json::from_str(line).ok()?;
    let record_type = record.record_type.as_deref().unwrap_or("unknown");

    // Internal bookkeeping records never become events
    if record_type == "file-history-snapshot" || record_type == "queue-operation" {
        return None;
    }

    let session_id = record
        .session_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let timestamp = record
        .timestamp
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    let mut event_type = record_type.to_string();
    let mut tool_name: Option<String> = None;
    let mut tool_input: Option<Value> = None;
    let mut payload = serde_json::Map::new();
    let mut model_name: Option<String> = None;

    match record_type {
        "assistant" => {
            let msg = record.message.unwrap_or_default();
            model_name = msg.model.clone();
            let blocks = content_blocks(msg.content);

            // First tool_use block wins; remaining blocks are ignored
            for block in &blocks {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    event_type = "tool_use".to_string();
                    tool_name = Some(name.clone());
                    tool_input = Some(input.clone());
                    payload = object(json!({
                        "tool_use_id": id,
                        "name": name,
                        "input_preview": truncate_input(input),
                    }));
                    break;
                }
            }

            // No tool use: a text response, unless a tool_result block
            // reclassifies it
            if event_type == "assistant" {
                let text = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                payload.insert(
                    "text_preview".to_string(),
                    Value::String(truncate_chars(&text, TEXT_PREVIEW_CHARS)),
                );
                if let Some(stop_reason) = &msg.stop_reason {
                    payload.insert("stop_reason".to_string(), Value::String(stop_reason.clone()));
                }

                for block in &blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        tool_name: block_tool,
                        is_error,
                        ..
                    } = block
                    {
                        event_type = "tool_result".to_string();
                        tool_name = block_tool.clone();
                        payload = object(json!({
                            "tool_use_id": tool_use_id,
                            "status": if *is_error { "error" } else { "success" },
                        }));
                        break;
                    }
                }
            }
        }
        "user" => {
            let msg = record.message.unwrap_or_default();
            let blocks = content_blocks(msg.content);

            // User messages may carry tool results; the first one wins.
            // A text block only sets the preview and does not stop the
            // scan (the last text block's preview survives).
            for block in &blocks {
                match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        tool_name: block_tool,
                        content,
                        is_error,
                    } => {
                        event_type = "tool_result".to_string();
                        tool_name = Some(
                            block_tool
                                .clone()
                                .unwrap_or_else(|| "unknown".to_string()),
                        );
                        payload = object(json!({
                            "tool_use_id": tool_use_id,
                            "is_error": is_error,
                            "result_preview": result_preview(content),
                        }));
                        break;
                    }
                    ContentBlock::Text { text } => {
                        payload = object(json!({
                            "text_preview": truncate_chars(text, TEXT_PREVIEW_CHARS),
                        }));
                    }
                    _ => {}
                }
            }
        }
        "progress" => {
            let data = record.data.unwrap_or(Value::Null);
            event_type = data
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("progress")
                .to_string();
            for key in ["hookEvent", "hookName", "command"] {
                if let Some(value) = data.get(key) {
                    payload.insert(key.to_string(), value.clone());
                }
            }
        }
        "system" => {
            if let Some(Value::Object(data)) = record.data {
                payload = data;
            }
        }
        // Unrecognized types pass through with an empty payload
        _ => {}
    }

    let agent_name = agents.resolve(&session_id, SOURCE_APP);

    Some(NormalizedRecord {
        source_app: SOURCE_APP.to_string(),
        session_id,
        agent_name,
        event_type,
        tool_name,
        tool_input,
        payload: Value::Object(payload),
        timestamp,
        model_name,
    })
}

/// Flatten optional message content into a uniform block list.
fn content_blocks(content: Option<RawContent>) -> Vec<ContentBlock> {
    match content {
        None => vec![],
        Some(RawContent::Text(text)) => vec![ContentBlock::Text { text }],
        Some(RawContent::Blocks(blocks)) => blocks,
    }
}

/// Bounded preview of a tool_result's content, which may be a block
/// array, a bare string, or anything else.
fn result_preview(content: &Value) -> String {
    match content {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                truncate_chars(
                    item.get("text").and_then(Value::as_str).unwrap_or(""),
                    ITEM_PREVIEW_CHARS,
                )
            })
            .collect::<Vec<_>>()
            .join(" "),
        Value::String(s) => truncate_chars(s, TEXT_PREVIEW_CHARS),
        Value::Null => String::new(),
        other => truncate_chars(&other.to_string(), TEXT_PREVIEW_CHARS),
    }
}

/// Bounded copy of a tool input map: string values over the preview
/// limit are cut and marked; everything else passes through.
fn truncate_input(input: &Value) -> Value {
    let Value::Object(map) = input else {
        return Value::Object(serde_json::Map::new());
    };

    let mut out = serde_json::Map::new();
    for (key, value) in map {
        match value {
            Value::String(s) if s.chars().count() > TEXT_PREVIEW_CHARS => {
                out.insert(
                    key.clone(),
                    Value::String(format!("{}...", truncate_chars(s, TEXT_PREVIEW_CHARS))),
                );
            }
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    Value::Object(out)
}

/// Truncate on char boundaries (byte slicing would split UTF-8).
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
