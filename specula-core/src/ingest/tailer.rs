//! Session transcript tailer
//!
//! Tracks a byte offset per watched transcript and, on every trigger,
//! reads only the bytes appended since the last successful read. Two
//! independent producers drive re-reads — debounced filesystem change
//! notifications and a fixed-interval poll — and both funnel into the
//! same idempotent [`SessionTailer::process_file`] step. The offset
//! check, not the trigger source, is what makes duplicate or concurrent
//! triggers safe.
//!
//! Files already present at startup begin at end-of-file (their history
//! goes through the backfiller); files first observed later begin at
//! offset 0 and have their whole content ingested as live events. A file
//! whose size shrank is treated as rotated and reset to offset 0.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::backfill;
use super::enrich::AgentMap;
use super::normalize::normalize_line;
use crate::broadcast::EventSink;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::store::EventStore;
use crate::types::StreamMessage;

/// Incremental reader over a directory of `*.jsonl` transcripts.
pub struct SessionTailer {
    dir: PathBuf,
    /// Last-read byte offset per file. One lock; held for the whole of a
    /// file's read step so concurrent triggers cannot double-count.
    positions: Mutex<HashMap<PathBuf, u64>>,
    store: Arc<RwLock<EventStore>>,
    agents: Arc<AgentMap>,
    sink: Arc<dyn EventSink>,
    config: IngestConfig,
}

impl SessionTailer {
    pub fn new(
        dir: PathBuf,
        store: Arc<RwLock<EventStore>>,
        agents: Arc<AgentMap>,
        sink: Arc<dyn EventSink>,
        config: IngestConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            dir,
            positions: Mutex::new(HashMap::new()),
            store,
            agents,
            sink,
            config,
        })
    }

    /// The `limit` most-recently-modified transcripts in the directory.
    pub fn discover_recent(&self, limit: usize) -> Vec<PathBuf> {
        let pattern = self.dir.join("*.jsonl");
        let entries = match glob::glob(&pattern.to_string_lossy()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid transcript glob pattern");
                return vec![];
            }
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
            .flatten()
            .filter_map(|path| {
                let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .collect();

        files.sort_by(|a, b| b.1.cmp(&a.1));
        files.truncate(limit);
        files.into_iter().map(|(path, _)| path).collect()
    }

    /// One-time startup step: backfill recent history into the store
    /// (without broadcasting) and start tracking the discovered files at
    /// end-of-file.
    ///
    /// Returns the number of backfilled events.
    pub fn bootstrap(&self) -> usize {
        if !self.dir.exists() {
            tracing::warn!(dir = %self.dir.display(), "Sessions directory not found");
            return 0;
        }

        let files = self.discover_recent(self.config.watch_limit);

        let backfilled = if self.config.backfill_count > 0 {
            let records = backfill::collect_recent(
                &files,
                self.config.tail_bytes,
                self.config.backfill_count,
                &self.agents,
            );
            let count = records.len();
            let mut store = self.store.write();
            for record in records {
                store.append(record);
            }
            count
        } else {
            0
        };

        let mut positions = self.positions.lock();
        for path in &files {
            if let Ok(meta) = std::fs::metadata(path) {
                positions.insert(path.clone(), meta.len());
                tracing::debug!(
                    path = %path.display(),
                    size = meta.len(),
                    "Tracking transcript from end-of-file"
                );
            }
        }
        drop(positions);

        tracing::info!(
            files = files.len(),
            backfilled,
            dir = %self.dir.display(),
            "Transcript tailer bootstrapped"
        );
        backfilled
    }

    /// The idempotent read step: classify and publish exactly the bytes
    /// appended since the last successful read of this file.
    ///
    /// Returns the number of classified events. A read failure leaves
    /// the offset untouched so the next trigger retries the same range.
    pub fn process_file(&self, path: &Path) -> Result<usize> {
        let size = std::fs::metadata(path)?.len();

        let mut positions = self.positions.lock();
        let offset = positions.entry(path.to_path_buf()).or_insert(0);

        if size < *offset {
            tracing::debug!(
                path = %path.display(),
                offset = *offset,
                size,
                "Transcript shrank, treating as rotation"
            );
            *offset = 0;
        }
        if size <= *offset {
            return Ok(0);
        }

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(*offset))?;
        let mut buf = Vec::with_capacity((size - *offset) as usize);
        let read = file.take(size - *offset).read_to_end(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        let mut classified = 0;
        for line in text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(record) = normalize_line(line, &self.agents) {
                let event = self.store.write().append(record);
                self.sink.publish(StreamMessage::Event(event));
                classified += 1;
            }
        }

        // The bytes are consumed even when every line was skipped
        *offset += read as u64;
        Ok(classified)
    }

    /// One poll cycle: re-read every tracked file, then check the most
    /// recent directory entries for transcripts we are not tracking yet.
    pub fn poll_pass(&self) {
        let tracked: Vec<PathBuf> = self.positions.lock().keys().cloned().collect();
        for path in tracked {
            if let Err(e) = self.process_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Re-read failed, will retry");
            }
        }

        for path in self.discover_recent(self.config.rescan_limit) {
            let known = self.positions.lock().contains_key(&path);
            if !known {
                tracing::info!(path = %path.display(), "New session transcript");
                if let Err(e) = self.process_file(&path) {
                    tracing::debug!(path = %path.display(), error = %e, "Initial read failed, will retry");
                }
            }
        }
    }

    /// React to one filesystem change notification.
    fn handle_change(&self, path: &Path) {
        if path == self.agents.path() {
            self.agents.reload();
            return;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            return;
        }

        let known = self.positions.lock().contains_key(path);
        if !known {
            tracing::info!(path = %path.display(), "New session transcript");
        }
        if let Err(e) = self.process_file(path) {
            tracing::debug!(path = %path.display(), error = %e, "Change read failed, will retry");
        }
    }

    /// Start the live drivers: a debounced filesystem watch and a backup
    /// poll. Call [`SessionTailer::bootstrap`] first.
    pub async fn start(self: Arc<Self>) -> Result<()> {
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

        if self.dir.exists() {
            debouncer
                .watcher()
                .watch(&self.dir, RecursiveMode::NonRecursive)?;
            tracing::info!(dir = %self.dir.display(), "Watching session transcripts");
        } else {
            tracing::warn!(
                dir = %self.dir.display(),
                "Sessions directory not found, relying on polling"
            );
        }

        let map_path = self.agents.path().to_path_buf();
        if map_path.exists() {
            if let Err(e) = debouncer
                .watcher()
                .watch(&map_path, RecursiveMode::NonRecursive)
            {
                tracing::warn!(path = %map_path.display(), error = %e, "Failed to watch agent map");
            }
        }

        // Change-notification consumer
        let tailer = self.clone();
        tokio::spawn(async move {
            // Keeps the watcher alive for the life of the task
            let _debouncer = debouncer;

            while let Some(path) = rx.recv().await {
                let tailer = tailer.clone();
                let _ = tokio::task::spawn_blocking(move || tailer.handle_change(&path)).await;
            }
        });

        // Backup poll: change notifications are not guaranteed reliable
        // under load, and the poll also discovers new transcripts
        let tailer = self.clone();
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let tailer = tailer.clone();
                let _ = tokio::task::spawn_blocking(move || tailer.poll_pass()).await;
            }
        });

        Ok(())
    }
}
