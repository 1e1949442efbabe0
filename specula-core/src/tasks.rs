//! Background-task watcher
//!
//! Tracks `*.output` files written by an external task runner. Nothing in
//! those files says whether the task is alive, so status is a liveness
//! heuristic: a file still being written to is `running`, a file idle
//! past the threshold is presumed `completed`. `failed` exists in the
//! model but no heuristic here produces it.
//!
//! Every observation is idempotent; an update is only published when the
//! status or modification timestamp actually changed, so unconditional
//! re-observation (poll cycles, redundant notifications) never floods
//! subscribers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use parking_lot::RwLock;
use regex::Regex;
use tokio::sync::mpsc;

use crate::broadcast::EventSink;
use crate::config::TasksConfig;
use crate::error::{Error, Result};
use crate::types::{BackgroundTask, StreamMessage, TaskFormat, TaskStatus};

/// Per-file state machine over background-task output files.
pub struct TaskWatcher {
    dir: PathBuf,
    tasks: RwLock<HashMap<String, BackgroundTask>>,
    sink: Arc<dyn EventSink>,
    config: TasksConfig,
}

impl TaskWatcher {
    pub fn new(dir: PathBuf, sink: Arc<dyn EventSink>, config: TasksConfig) -> Arc<Self> {
        Arc::new(Self {
            dir,
            tasks: RwLock::new(HashMap::new()),
            sink,
            config,
        })
    }

    /// Observe one task file: refresh its derived state and publish an
    /// update if the status or modification time changed.
    ///
    /// A file that cannot be statted or read (mid-write, locked) is left
    /// for the next trigger.
    pub fn observe_file(&self, path: &Path) {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let Some(task_id) = file_name.strip_suffix(".output") else {
            return;
        };

        let Ok(meta) = std::fs::metadata(path) else {
            return;
        };
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };

        let mtime_ms = meta
            .modified()
            .ok()
            .map(system_time_ms)
            .unwrap_or_else(now_ms);
        let created_ms = meta.created().ok().map(system_time_ms).unwrap_or(mtime_ms);
        let status = status_for(now_ms(), mtime_ms, self.config.idle_threshold_ms);

        let mut tasks = self.tasks.write();
        let existing = tasks.get(task_id);

        let task = BackgroundTask {
            id: task_id.to_string(),
            // First classification wins for description and format
            description: existing
                .map(|t| t.description.clone())
                .unwrap_or_else(|| infer_description(&content, file_name)),
            status,
            started_at: existing.map(|t| t.started_at).unwrap_or(created_ms),
            updated_at: mtime_ms,
            output_preview: tail_chars(&content, self.config.preview_chars),
            format: existing
                .map(|t| t.format)
                .unwrap_or_else(|| detect_format(&content)),
        };

        let changed = existing
            .map(|t| t.status != task.status || t.updated_at != task.updated_at)
            .unwrap_or(true);

        tasks.insert(task_id.to_string(), task.clone());
        drop(tasks);

        if changed {
            tracing::debug!(
                task = %task.id,
                status = task.status.as_str(),
                "Task state changed"
            );
            self.sink.publish(StreamMessage::TaskUpdate(task));
        }
    }

    /// Observe every task file currently in the directory.
    pub fn scan(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut count = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("output") {
                self.observe_file(&path);
                count += 1;
            }
        }
        tracing::debug!(count, "Scanned task files");
    }

    /// One poll cycle: pick up task files we have not seen, then
    /// re-check every task currently running (its idle clock may have
    /// expired without any file change).
    pub fn poll_pass(&self) {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("output") {
                    continue;
                }
                let known = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|id| self.tasks.read().contains_key(id))
                    .unwrap_or(false);
                if !known {
                    self.observe_file(&path);
                }
            }
        }

        let running: Vec<String> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.id.clone())
            .collect();
        for id in running {
            self.observe_file(&self.dir.join(format!("{id}.output")));
        }
    }

    /// All known tasks, in no particular order.
    pub fn tasks(&self) -> Vec<BackgroundTask> {
        self.tasks.read().values().cloned().collect()
    }

    /// One task by id.
    pub fn task(&self, id: &str) -> Option<BackgroundTask> {
        self.tasks.read().get(id).cloned()
    }

    /// The full current output of a task — re-read from disk on demand,
    /// not the bounded preview held in the task record.
    pub fn task_output(&self, id: &str) -> Result<String> {
        if !self.tasks.read().contains_key(id) {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        Ok(std::fs::read_to_string(
            self.dir.join(format!("{id}.output")),
        )?)
    }

    /// Start watching. If the directory does not exist yet, retry at a
    /// coarse interval until it does instead of failing startup.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.dir.exists() {
            return self.init_watch().await;
        }

        tracing::info!(
            dir = %self.dir.display(),
            "Tasks directory not found, waiting for it to appear"
        );
        let watcher = self.clone();
        let retry = Duration::from_millis(self.config.dir_retry_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(retry);
            interval.tick().await;
            loop {
                interval.tick().await;
                if watcher.dir.exists() {
                    tracing::info!(dir = %watcher.dir.display(), "Tasks directory appeared");
                    if let Err(e) = watcher.clone().init_watch().await {
                        tracing::warn!(error = %e, "Failed to start task watch");
                    }
                    break;
                }
            }
        });
        Ok(())
    }

    async fn init_watch(self: Arc<Self>) -> Result<()> {
        // Known state first, so the first poll is already suppressed
        let watcher = self.clone();
        let _ = tokio::task::spawn_blocking(move || watcher.scan()).await;

        let (tx, mut rx) = mpsc::channel::<PathBuf>(100);
        let tx_events = tx.clone();
        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            move |res: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| {
                if let Ok(events) = res {
                    for event in events {
                        if event.kind == DebouncedEventKind::Any {
                            let _ = tx_events.blocking_send(event.path);
                        }
                    }
                }
            },
        )?;
        debouncer
            .watcher()
            .watch(&self.dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %self.dir.display(), "Watching task output files");

        let watcher = self.clone();
        tokio::spawn(async move {
            let _debouncer = debouncer;

            while let Some(path) = rx.recv().await {
                if path.extension().and_then(|e| e.to_str()) != Some("output") {
                    continue;
                }
                let watcher = watcher.clone();
                let _ = tokio::task::spawn_blocking(move || watcher.observe_file(&path)).await;
            }
        });

        let watcher = self.clone();
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let watcher = watcher.clone();
                let _ = tokio::task::spawn_blocking(move || watcher.poll_pass()).await;
            }
        });

        Ok(())
    }
}

/// The idle heuristic, kept pure so the boundary is pinnable: a task is
/// completed iff strictly more than `threshold_ms` elapsed since its
/// last modification.
fn status_for(now_ms: i64, mtime_ms: i64, threshold_ms: i64) -> TaskStatus {
    if now_ms - mtime_ms > threshold_ms {
        TaskStatus::Completed
    } else {
        TaskStatus::Running
    }
}

/// `jsonl` iff the first non-blank line parses as JSON.
fn detect_format(content: &str) -> TaskFormat {
    let Some(first_line) = content.lines().find(|l| !l.trim().is_empty()) else {
        return TaskFormat::Text;
    };
    if serde_json::from_str::<serde_json::Value>(first_line).is_ok() {
        TaskFormat::Jsonl
    } else {
        TaskFormat::Text
    }
}

/// Ordered command-signature table; first match wins, so changing the
/// order is a behavior change.
fn signature_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)npm (run |install|start|test)", "npm operation"),
            (r"(?i)bun (run |install|test)", "bun operation"),
            (r"(?i)git (push|pull|commit|clone|checkout)", "git operation"),
            (r"(?i)docker (build|run|compose|push)", "docker operation"),
            (r"(?i)curl|fetch|http", "HTTP request"),
            (r"(?i)test|jest|vitest|pytest", "running tests"),
            (r"(?i)build|compile|tsc", "building project"),
            (r"(?i)deploy|vercel|cloudflare", "deployment"),
            (r"(?i)grep|rg|find|search", "searching files"),
            (r"(?i)server|listen|serve", "running server"),
        ]
        .into_iter()
        .map(|(pattern, desc)| (Regex::new(pattern).expect("static pattern"), desc))
        .collect()
    })
}

/// Infer a human-readable description from the file content: known
/// command signature, else the first non-blank line (60 chars), else a
/// name derived from the filename.
fn infer_description(content: &str, filename: &str) -> String {
    for (pattern, description) in signature_patterns() {
        if pattern.is_match(content) {
            return description.to_string();
        }
    }

    if let Some(first_line) = content.lines().find(|l| !l.trim().is_empty()) {
        return first_line.chars().take(60).collect();
    }

    format!("Task {filename}")
}

/// Trailing `max_chars` characters of a string, on char boundaries.
fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        s.chars().skip(count - max_chars).collect()
    }
}

fn system_time_ms(t: std::time::SystemTime) -> i64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct TestSink(Mutex<Vec<StreamMessage>>);

    impl TestSink {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn task_updates(&self) -> Vec<BackgroundTask> {
            self.0
                .lock()
                .iter()
                .filter_map(|m| match m {
                    StreamMessage::TaskUpdate(task) => Some(task.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for TestSink {
        fn publish(&self, message: StreamMessage) {
            self.0.lock().push(message);
        }
    }

    fn watcher_in(dir: &Path, config: TasksConfig) -> (Arc<TaskWatcher>, Arc<TestSink>) {
        let sink = TestSink::new();
        let watcher = TaskWatcher::new(
            dir.to_path_buf(),
            sink.clone() as Arc<dyn EventSink>,
            config,
        );
        (watcher, sink)
    }

    #[test]
    fn test_idle_transition_exactness() {
        let threshold = 30_000;
        let mtime = 1_000_000;
        assert_eq!(
            status_for(mtime + 29_999, mtime, threshold),
            TaskStatus::Running
        );
        assert_eq!(
            status_for(mtime + 30_000, mtime, threshold),
            TaskStatus::Running
        );
        assert_eq!(
            status_for(mtime + 30_001, mtime, threshold),
            TaskStatus::Completed
        );
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(""), TaskFormat::Text);
        assert_eq!(detect_format("\n\n"), TaskFormat::Text);
        assert_eq!(
            detect_format("{\"event\":\"start\"}\nplain tail"),
            TaskFormat::Jsonl
        );
        assert_eq!(detect_format("Running npm install..."), TaskFormat::Text);
        assert_eq!(detect_format("\n{\"a\":1}"), TaskFormat::Jsonl);
    }

    #[test]
    fn test_infer_description_signature_order() {
        assert_eq!(infer_description("$ npm run dev", "t.output"), "npm operation");
        assert_eq!(
            infer_description("git push origin main", "t.output"),
            "git operation"
        );
        assert_eq!(
            infer_description("curl https://example.com", "t.output"),
            "HTTP request"
        );
        // "docker build" hits the docker signature before the build one
        assert_eq!(
            infer_description("docker build -t app .", "t.output"),
            "docker operation"
        );
        assert_eq!(
            infer_description("cargo build --release", "t.output"),
            "building project"
        );
    }

    #[test]
    fn test_infer_description_fallbacks() {
        assert_eq!(
            infer_description("\nsome opaque output here", "t.output"),
            "some opaque output here"
        );
        let long = "z".repeat(100);
        assert_eq!(infer_description(&long, "t.output").chars().count(), 60);
        assert_eq!(infer_description("", "t.output"), "Task t.output");
        assert_eq!(infer_description("   \n  ", "t.output"), "Task t.output");
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("hello world", 5), "world");
        assert_eq!(tail_chars("héllo", 2), "lo");
    }

    #[test]
    fn test_observe_publishes_once_until_change() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TasksConfig {
            idle_threshold_ms: i64::MAX / 2, // never idles out in this test
            ..TasksConfig::default()
        };
        let (watcher, sink) = watcher_in(dir.path(), config);

        let path = dir.path().join("build-1.output");
        std::fs::write(&path, "npm run build\n").unwrap();

        watcher.observe_file(&path);
        watcher.observe_file(&path);
        watcher.observe_file(&path);

        // Same mtime, same status: suppressed after the first
        let updates = sink.task_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, "build-1");
        assert_eq!(updates[0].status, TaskStatus::Running);
        assert_eq!(updates[0].description, "npm operation");

        // A real modification publishes again
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&path, "npm run build\ndone\n").unwrap();
        watcher.observe_file(&path);
        assert_eq!(sink.task_updates().len(), 2);
    }

    #[test]
    fn test_idle_file_is_completed() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TasksConfig {
            idle_threshold_ms: 0,
            ..TasksConfig::default()
        };
        let (watcher, sink) = watcher_in(dir.path(), config);

        let path = dir.path().join("old.output");
        std::fs::write(&path, "finished long ago\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        watcher.observe_file(&path);
        let updates = sink.task_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, TaskStatus::Completed);
    }

    #[test]
    fn test_description_and_format_are_sticky() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TasksConfig {
            idle_threshold_ms: i64::MAX / 2,
            ..TasksConfig::default()
        };
        let (watcher, _sink) = watcher_in(dir.path(), config);

        let path = dir.path().join("t.output");
        std::fs::write(&path, "{\"step\":\"clone\"}\n").unwrap();
        watcher.observe_file(&path);

        let first = watcher.task("t").unwrap();
        assert_eq!(first.format, TaskFormat::Jsonl);

        // Later content would classify differently; the first wins
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&path, "npm install\n").unwrap();
        watcher.observe_file(&path);

        let second = watcher.task("t").unwrap();
        assert_eq!(second.description, first.description);
        assert_eq!(second.format, TaskFormat::Jsonl);
        assert_eq!(second.started_at, first.started_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_preview_is_bounded_but_output_is_full() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TasksConfig {
            preview_chars: 10,
            ..TasksConfig::default()
        };
        let (watcher, _sink) = watcher_in(dir.path(), config);

        let path = dir.path().join("big.output");
        let content = "0123456789abcdefghij";
        std::fs::write(&path, content).unwrap();
        watcher.observe_file(&path);

        let task = watcher.task("big").unwrap();
        assert_eq!(task.output_preview, "abcdefghij");
        assert_eq!(watcher.task_output("big").unwrap(), content);
    }

    #[test]
    fn test_task_output_unknown_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let (watcher, _sink) = watcher_in(dir.path(), TasksConfig::default());
        assert!(matches!(
            watcher.task_output("nope"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_poll_pass_discovers_new_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TasksConfig {
            idle_threshold_ms: i64::MAX / 2,
            ..TasksConfig::default()
        };
        let (watcher, sink) = watcher_in(dir.path(), config);

        std::fs::write(dir.path().join("a.output"), "one\n").unwrap();
        std::fs::write(dir.path().join("b.output"), "two\n").unwrap();
        std::fs::write(dir.path().join("ignored.log"), "not a task\n").unwrap();

        watcher.poll_pass();
        assert_eq!(watcher.tasks().len(), 2);
        assert_eq!(sink.task_updates().len(), 2);

        // A second pass with nothing new publishes nothing new
        watcher.poll_pass();
        assert_eq!(sink.task_updates().len(), 2);
    }
}
