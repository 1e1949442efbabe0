//! Monitor facade
//!
//! The composition root: owns the store, hub, enrichment table, tailer
//! and task watcher, and exposes the two external surfaces — the
//! synchronous read-only query surface and the subscription-based push
//! surface. Components are wired through the [`EventSink`] port here and
//! nowhere else; nothing inside the pipelines knows the hub's identity.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::broadcast::{BroadcastHub, EventSink, SubscriberId};
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{AgentMap, SessionTailer};
use crate::store::EventStore;
use crate::tasks::TaskWatcher;
use crate::types::{BackgroundTask, Event, FilterOptions, StreamMessage};

/// In-memory projection of process health.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub subscribers: usize,
    pub events: usize,
    pub next_event_id: u64,
    pub tasks: usize,
}

/// Owns the whole pipeline and exposes its query and push surfaces.
pub struct Monitor {
    config: Config,
    store: Arc<RwLock<EventStore>>,
    hub: Arc<BroadcastHub>,
    agents: Arc<AgentMap>,
    tailer: Arc<SessionTailer>,
    tasks: Arc<TaskWatcher>,
}

impl Monitor {
    /// Wire up the pipeline from configuration. Nothing starts running
    /// until [`Monitor::start`].
    pub fn new(config: Config) -> Self {
        let store = Arc::new(RwLock::new(EventStore::new(config.ingest.max_events)));
        let hub = BroadcastHub::new(config.broadcast.channel_capacity);
        let agents = Arc::new(AgentMap::new(config.agent_map_path()));

        let sink: Arc<dyn EventSink> = hub.clone();
        let tailer = SessionTailer::new(
            config.sessions_dir(),
            store.clone(),
            agents.clone(),
            sink.clone(),
            config.ingest.clone(),
        );
        let tasks = TaskWatcher::new(config.tasks_dir(), sink, config.tasks.clone());

        Self {
            config,
            store,
            hub,
            agents,
            tailer,
            tasks,
        }
    }

    /// Load enrichment, backfill history, then start the live drivers.
    pub async fn start(&self) -> Result<()> {
        self.agents.reload();
        self.tailer.bootstrap();
        self.tailer.clone().start().await?;
        self.tasks.clone().start().await?;
        Ok(())
    }

    // ========== Query surface ==========

    /// The most recent `count` events, oldest first.
    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.store.read().recent(count)
    }

    /// Every live event, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.store.read().all()
    }

    /// All events attributed to the given agent (case-insensitive).
    pub fn events_by_agent(&self, agent_name: &str) -> Vec<Event> {
        self.store.read().by_agent(agent_name)
    }

    /// Distinct filter facets seen so far.
    pub fn filter_options(&self) -> FilterOptions {
        self.store.read().filter_options()
    }

    /// All known background tasks.
    pub fn background_tasks(&self) -> Vec<BackgroundTask> {
        self.tasks.tasks()
    }

    /// One background task by id.
    pub fn background_task(&self, id: &str) -> Option<BackgroundTask> {
        self.tasks.task(id)
    }

    /// Full current output for a task, re-read from disk.
    pub fn task_output(&self, id: &str) -> Result<String> {
        self.tasks.task_output(id)
    }

    /// Process health counters.
    pub fn stats(&self) -> MonitorStats {
        let store = self.store.read();
        MonitorStats {
            subscribers: self.hub.subscriber_count(),
            events: store.len(),
            next_event_id: store.next_id(),
            tasks: self.tasks.tasks().len(),
        }
    }

    // ========== Push surface ==========

    /// Register a subscriber. The receiver's first message is always the
    /// `initial` snapshot of recent events.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<StreamMessage>) {
        let snapshot = self
            .store
            .read()
            .recent(self.config.broadcast.snapshot_count);
        self.hub.subscribe(snapshot)
    }

    /// Drop a subscriber explicitly.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestConfig, TasksConfig};

    fn monitor_in(dir: &std::path::Path) -> Monitor {
        let config = Config {
            ingest: IngestConfig {
                sessions_dir: Some(dir.join("sessions")),
                agent_map_path: Some(dir.join("agent-sessions.json")),
                ..IngestConfig::default()
            },
            tasks: TasksConfig {
                tasks_dir: Some(dir.join("tasks")),
                ..TasksConfig::default()
            },
            ..Config::default()
        };
        Monitor::new(config)
    }

    #[test]
    fn test_fresh_monitor_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let monitor = monitor_in(dir.path());

        assert!(monitor.events().is_empty());
        assert!(monitor.background_tasks().is_empty());
        assert_eq!(monitor.filter_options(), FilterOptions::default());

        let stats = monitor.stats();
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.events, 0);
        assert_eq!(stats.next_event_id, 1);
    }

    #[test]
    fn test_subscribe_receives_snapshot_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let monitor = monitor_in(dir.path());

        let (id, mut rx) = monitor.subscribe();
        assert_eq!(monitor.stats().subscribers, 1);

        match rx.try_recv().unwrap() {
            StreamMessage::Initial(events) => assert!(events.is_empty()),
            other => panic!("expected initial snapshot, got {:?}", other),
        }

        monitor.unsubscribe(id);
        assert_eq!(monitor.stats().subscribers, 0);
    }
}
