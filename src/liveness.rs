//! Heartbeat tracking per integer identity.
//!
//! A [`LivenessRegistry`] answers "is this identity currently alive": each
//! entry remembers when it was last seen and how long it may stay silent
//! before it is considered stale.
//!
//! Registration and refresh are deliberately split. [`LivenessRegistry::register`]
//! defines the timeout and creates the entry; [`LivenessRegistry::touch`] only
//! refreshes an existing entry and is a no-op for unknown ids, so heartbeat
//! senders must register first.
//!
//! # Example
//!
//! ```
//! use pulsekit::liveness::LivenessRegistry;
//! use std::time::Duration;
//!
//! let registry = LivenessRegistry::new();
//! registry.register(7, Duration::from_secs(5));
//! assert!(registry.is_alive(7));
//! assert!(!registry.is_alive(8));
//! ```

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::{config::LivenessConfig, timestamp::Timestamp};

/// Copy of a registered heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessEntry {
    pub id: i64,
    pub last_seen: Timestamp,
    pub timeout: Duration,
}

impl LivenessEntry {
    fn alive_at(&self, now: Timestamp) -> bool {
        now.saturating_duration_since(self.last_seen) < self.timeout
    }
}

/// Point-in-time view of one entry, for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessReport {
    pub id: i64,
    pub alive: bool,
    pub last_seen: Timestamp,
    #[serde(with = "crate::config::duration_ms")]
    pub timeout: Duration,
}

/// Concurrent table of heartbeats keyed by integer id.
///
/// Backed by a sharded map: lookups on different ids rarely contend, and
/// `last_seen` and `timeout` of one entry are always read and written
/// together under that entry's shard lock.
#[derive(Debug, Default)]
pub struct LivenessRegistry {
    entries: DashMap<i64, LivenessEntry>,
    config: LivenessConfig,
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LivenessConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Creates or replaces the entry for `id`, marking it seen now.
    pub fn register(&self, id: i64, timeout: Duration) {
        let entry = LivenessEntry {
            id,
            last_seen: Timestamp::now(),
            timeout,
        };
        if self.entries.insert(id, entry).is_some() {
            debug!(id, ?timeout, "liveness entry re-registered");
        } else {
            debug!(id, ?timeout, "liveness entry registered");
        }
    }

    /// Registers `id` with the configured default timeout.
    pub fn register_default(&self, id: i64) {
        self.register(id, self.config.default_timeout);
    }

    /// `false` for unknown ids, otherwise whether the last heartbeat is
    /// younger than the entry's timeout.
    pub fn is_alive(&self, id: i64) -> bool {
        self.entries
            .get(&id)
            .map(|entry| entry.alive_at(Timestamp::now()))
            .unwrap_or(false)
    }

    /// Sets `last_seen` of an existing entry to `at`.
    ///
    /// Unknown ids are ignored. Earlier timestamps are stored as given; the
    /// registry does not enforce monotonic heartbeats.
    pub fn touch(&self, id: i64, at: Timestamp) {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                trace!(id, %at, "liveness touch");
                entry.last_seen = at;
            }
            None => trace!(id, "touch ignored for unregistered id"),
        }
    }

    pub fn heartbeat(&self, id: i64) {
        self.touch(id, Timestamp::now());
    }

    /// Whether the last heartbeat of `id` is younger than `window`,
    /// independent of the entry's own timeout.
    pub fn last_in(&self, id: i64, window: Duration) -> bool {
        self.entries
            .get(&id)
            .map(|entry| entry.last_seen.elapsed() < window)
            .unwrap_or(false)
    }

    pub fn entry(&self, id: i64) -> Option<LivenessEntry> {
        self.entries.get(&id).map(|entry| *entry)
    }

    /// Drops the entry for `id`. Returns whether it existed.
    pub fn remove(&self, id: i64) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            debug!(id, "liveness entry removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates every entry against a single `now`, sorted by id.
    pub fn report(&self) -> Vec<LivenessReport> {
        let now = Timestamp::now();
        let mut reports: Vec<LivenessReport> = self
            .entries
            .iter()
            .map(|entry| LivenessReport {
                id: entry.id,
                alive: entry.alive_at(now),
                last_seen: entry.last_seen,
                timeout: entry.timeout,
            })
            .collect();
        reports.sort_by_key(|report| report.id);
        reports
    }
}
