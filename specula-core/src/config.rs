//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/specula/config.toml`.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/specula/` (~/.config/specula/)
//! - State/Logs: `$XDG_STATE_HOME/specula/` (~/.local/state/specula/)
//!
//! Every tunable has a safe default, so a missing config file is not an
//! error. The default watch directories mirror where the producer writes
//! its data: session transcripts under `~/.claude/projects/<encoded>/`
//! and task output files under `/tmp/claude/<encoded>/tasks/`, where
//! `<encoded>` is the producer's dash-encoding of `~/.claude`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Encode a filesystem path the way the producer encodes project
/// directories: every non-alphanumeric character becomes a dash, so
/// `/home/u/.claude` turns into `-home-u--claude`.
fn dash_encode(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    /// Transcript ingestion tunables
    pub ingest: IngestConfig,

    /// Background-task watcher tunables
    pub tasks: TasksConfig,

    /// Broadcast hub tunables
    pub broadcast: BroadcastConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Transcript ingestion configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory of `*.jsonl` session transcripts. Defaults to the
    /// producer's encoded project directory under `~/.claude/projects/`.
    pub sessions_dir: Option<PathBuf>,

    /// JSON file mapping session ids to agent names (optional enrichment)
    pub agent_map_path: Option<PathBuf>,

    /// Event store capacity; oldest events are evicted beyond this
    pub max_events: usize,

    /// Maximum events to keep from the startup backfill
    pub backfill_count: usize,

    /// Trailing window read from each file during backfill
    pub tail_bytes: u64,

    /// Number of most-recently-modified files tracked at startup
    pub watch_limit: usize,

    /// Number of most-recent files checked for newcomers each poll
    pub rescan_limit: usize,

    /// Backup poll interval for re-reading tracked files
    pub poll_interval_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sessions_dir: None,
            agent_map_path: None,
            max_events: default_max_events(),
            backfill_count: default_backfill_count(),
            tail_bytes: default_tail_bytes(),
            watch_limit: default_watch_limit(),
            rescan_limit: default_rescan_limit(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_max_events() -> usize {
    1000
}

fn default_backfill_count() -> usize {
    200
}

fn default_tail_bytes() -> u64 {
    100 * 1024
}

fn default_watch_limit() -> usize {
    20
}

fn default_rescan_limit() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    2000
}

/// Background-task watcher configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TasksConfig {
    /// Directory of `*.output` task files. Defaults to the producer's
    /// encoded task directory under `/tmp/claude/`.
    pub tasks_dir: Option<PathBuf>,

    /// Idle time after which a task is presumed completed
    pub idle_threshold_ms: i64,

    /// Poll interval for running tasks and directory re-scans
    pub poll_interval_ms: u64,

    /// Retry interval while the tasks directory does not exist yet
    pub dir_retry_ms: u64,

    /// Trailing characters of output kept in the task record
    pub preview_chars: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            tasks_dir: None,
            idle_threshold_ms: default_idle_threshold_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            dir_retry_ms: default_dir_retry_ms(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_idle_threshold_ms() -> i64 {
    30_000
}

fn default_dir_retry_ms() -> u64 {
    5000
}

fn default_preview_chars() -> usize {
    500
}

/// Broadcast hub configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events included in the `initial` snapshot for new subscribers
    pub snapshot_count: usize,

    /// Per-subscriber channel capacity; a subscriber whose channel fills
    /// is dropped rather than awaited
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            snapshot_count: default_snapshot_count(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_snapshot_count() -> usize {
    50
}

fn default_channel_capacity() -> usize {
    256
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/specula/config.toml` (~/.config/specula/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("specula").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/specula/` (~/.local/state/specula/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("specula")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("specula.log")
    }

    /// Resolved session transcript directory.
    pub fn sessions_dir(&self) -> PathBuf {
        self.ingest.sessions_dir.clone().unwrap_or_else(|| {
            let encoded = dash_encode(&home_dir().join(".claude"));
            home_dir().join(".claude").join("projects").join(encoded)
        })
    }

    /// Resolved agent-session mapping file path.
    pub fn agent_map_path(&self) -> PathBuf {
        self.ingest.agent_map_path.clone().unwrap_or_else(|| {
            home_dir()
                .join(".claude")
                .join("MEMORY")
                .join("STATE")
                .join("agent-sessions.json")
        })
    }

    /// Resolved background-task output directory.
    pub fn tasks_dir(&self) -> PathBuf {
        self.tasks.tasks_dir.clone().unwrap_or_else(|| {
            let encoded = dash_encode(&home_dir().join(".claude"));
            PathBuf::from("/tmp").join("claude").join(encoded).join("tasks")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.max_events, 1000);
        assert_eq!(config.ingest.backfill_count, 200);
        assert_eq!(config.ingest.tail_bytes, 100 * 1024);
        assert_eq!(config.ingest.watch_limit, 20);
        assert_eq!(config.tasks.idle_threshold_ms, 30_000);
        assert_eq!(config.broadcast.snapshot_count, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[ingest]
sessions_dir = "/data/transcripts"
max_events = 500
backfill_count = 50

[tasks]
idle_threshold_ms = 10000

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.sessions_dir(), PathBuf::from("/data/transcripts"));
        assert_eq!(config.ingest.max_events, 500);
        assert_eq!(config.ingest.backfill_count, 50);
        // Unset fields keep their defaults
        assert_eq!(config.ingest.poll_interval_ms, 2000);
        assert_eq!(config.tasks.idle_threshold_ms, 10_000);
        assert_eq!(config.tasks.preview_chars, 500);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_dash_encode() {
        assert_eq!(
            dash_encode(Path::new("/home/u/.claude")),
            "-home-u--claude"
        );
        assert_eq!(dash_encode(Path::new("/tmp/a_b")), "-tmp-a-b");
    }

    #[test]
    fn test_resolved_paths_use_overrides() {
        let toml = r#"
[ingest]
sessions_dir = "/var/sessions"
agent_map_path = "/var/agents.json"

[tasks]
tasks_dir = "/var/tasks"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sessions_dir(), PathBuf::from("/var/sessions"));
        assert_eq!(config.agent_map_path(), PathBuf::from("/var/agents.json"));
        assert_eq!(config.tasks_dir(), PathBuf::from("/var/tasks"));
    }
}
