//! Bounded in-memory event store
//!
//! The store is the only component that assigns event ids. Ids are
//! strictly increasing for the lifetime of the store and are never
//! reused, even after eviction; a process restart resets the counter (no
//! durability is promised). Capacity overflow evicts from the front —
//! plain FIFO, no access-frequency weighting.

use std::collections::VecDeque;

use crate::types::{Event, FilterOptions, NormalizedRecord};

/// Ring of canonical events with FIFO eviction and monotonic ids.
pub struct EventStore {
    events: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
}

impl EventStore {
    /// Create an empty store with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 1,
        }
    }

    /// Append a classified record, assigning it the next id.
    ///
    /// Returns the stored event. Evicts the oldest events when the
    /// capacity is exceeded.
    pub fn append(&mut self, record: NormalizedRecord) -> Event {
        let event = record.into_event(self.next_id);
        self.next_id += 1;

        self.events.push_back(event.clone());
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }

        event
    }

    /// The most recent `count` events, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Event> {
        let skip = self.events.len().saturating_sub(count);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Every live event, oldest first.
    pub fn all(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Events attributed to the given agent, compared case-insensitively.
    pub fn by_agent(&self, agent_name: &str) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| {
                e.agent_name
                    .as_deref()
                    .map(|a| a.eq_ignore_ascii_case(agent_name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Distinct facet values across live events, in first-sighting order.
    pub fn filter_options(&self) -> FilterOptions {
        let mut options = FilterOptions::default();

        for event in &self.events {
            if !options.source_apps.contains(&event.source_app) {
                options.source_apps.push(event.source_app.clone());
            }
            if !options.session_ids.contains(&event.session_id) {
                options.session_ids.push(event.session_id.clone());
            }
            if !options.event_types.contains(&event.event_type) {
                options.event_types.push(event.event_type.clone());
            }
        }

        options
    }

    /// Number of live (non-evicted) events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The id the next appended event will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}
