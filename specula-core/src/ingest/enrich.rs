//! Agent-name enrichment
//!
//! A small JSON side table maps session ids to agent display names. The
//! table is optional: a missing or malformed file is not an error, only
//! a lost opportunity, and the previous mapping is retained. Reloads
//! replace the whole table — entries are never merged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Session-id → agent-name table, hot-reloaded from a backing file.
pub struct AgentMap {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl AgentMap {
    /// Create an empty table backed by the given file. Call
    /// [`AgentMap::reload`] to populate it.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Path of the backing file (watched for changes by the tailer).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the table with the backing file's current content.
    ///
    /// A missing file or unparseable content leaves the previous mapping
    /// in place.
    pub fn reload(&self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return,
        };

        match serde_json::from_str::<HashMap<String, String>>(&content) {
            Ok(parsed) => {
                let count = parsed.len();
                *self.entries.write() = parsed;
                tracing::debug!(count, path = %self.path.display(), "Agent map reloaded");
            }
            Err(e) => {
                tracing::debug!(error = %e, path = %self.path.display(), "Ignoring malformed agent map");
            }
        }
    }

    /// Resolve an agent display name.
    ///
    /// The session-id table wins; otherwise a fixed set of known
    /// producer identifiers maps to capitalized display names; otherwise
    /// the agent is unknown.
    pub fn resolve(&self, session_id: &str, source_app: &str) -> Option<String> {
        if let Some(name) = self.entries.read().get(session_id) {
            return Some(name.clone());
        }
        builtin_agent_name(source_app).map(str::to_string)
    }

    /// Number of mapped sessions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Display names for well-known producer identifiers.
fn builtin_agent_name(source_app: &str) -> Option<&'static str> {
    match source_app.to_ascii_lowercase().as_str() {
        "engineer" => Some("Engineer"),
        "architect" => Some("Architect"),
        "researcher" => Some("Researcher"),
        "designer" => Some("Designer"),
        "pentester" => Some("Pentester"),
        "intern" => Some("Intern"),
        "explorer" => Some("Explorer"),
        "planner" => Some("Planner"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map_with_content(content: &str) -> (tempfile::TempDir, AgentMap) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent-sessions.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        let map = AgentMap::new(path);
        map.reload();
        (dir, map)
    }

    #[test]
    fn test_resolve_from_table() {
        let (_dir, map) = map_with_content(r#"{"s-1": "Scout"}"#);
        assert_eq!(map.resolve("s-1", "claude-code"), Some("Scout".to_string()));
        assert_eq!(map.resolve("s-2", "claude-code"), None);
    }

    #[test]
    fn test_builtin_fallback_is_case_insensitive() {
        let (_dir, map) = map_with_content("{}");
        assert_eq!(
            map.resolve("unmapped", "engineer"),
            Some("Engineer".to_string())
        );
        assert_eq!(
            map.resolve("unmapped", "ARCHITECT"),
            Some("Architect".to_string())
        );
        assert_eq!(map.resolve("unmapped", "claude-code"), None);
    }

    #[test]
    fn test_reload_replaces_instead_of_merging() {
        let (dir, map) = map_with_content(r#"{"s-1": "Scout"}"#);
        assert_eq!(map.len(), 1);

        std::fs::write(
            dir.path().join("agent-sessions.json"),
            r#"{"s-2": "Pilot"}"#,
        )
        .unwrap();
        map.reload();

        assert_eq!(map.resolve("s-1", "claude-code"), None);
        assert_eq!(map.resolve("s-2", "claude-code"), Some("Pilot".to_string()));
    }

    #[test]
    fn test_malformed_reload_retains_previous_mapping() {
        let (dir, map) = map_with_content(r#"{"s-1": "Scout"}"#);

        std::fs::write(dir.path().join("agent-sessions.json"), "{not json").unwrap();
        map.reload();

        assert_eq!(map.resolve("s-1", "claude-code"), Some("Scout".to_string()));
    }

    #[test]
    fn test_missing_file_retains_previous_mapping() {
        let (dir, map) = map_with_content(r#"{"s-1": "Scout"}"#);

        std::fs::remove_file(dir.path().join("agent-sessions.json")).unwrap();
        map.reload();

        assert_eq!(map.resolve("s-1", "claude-code"), Some("Scout".to_string()));
    }
}
