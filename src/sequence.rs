//! Monotonic named counters.
//!
//! [`SequenceRegistry::next`] creates unknown names on demand, starting from
//! zero, so the first value minted for any name is `1`.

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

/// Immutable snapshot of one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    name: String,
    last: i64,
}

impl Sequence {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last value issued (or set) for this name.
    pub fn last(&self) -> i64 {
        self.last
    }
}

/// Concurrent table of named counters.
///
/// `next` holds the shard write guard of its name for the whole
/// lookup-create-increment step, so calls for one name are totally ordered
/// and never observe the same value twice.
#[derive(Debug, Default)]
pub struct SequenceRegistry {
    sequences: DashMap<String, i64>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the counter for `name`.
    ///
    /// Wraps from `i64::MAX` to `i64::MIN` instead of panicking.
    pub fn next(&self, name: &str) -> i64 {
        let mut last = match self.sequences.get_mut(name) {
            Some(entry) => entry,
            None => {
                debug!(name, "sequence created on first use");
                self.sequences.entry(name.to_string()).or_insert(0)
            }
        };
        let value = last.wrapping_add(1);
        *last = value;
        trace!(name, value, "sequence advanced");
        value
    }

    /// Replaces the counter for `name`; the next call to `next` returns `value + 1`.
    pub fn set(&self, name: &str, value: i64) {
        debug!(name, value, "sequence set");
        self.sequences.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Sequence> {
        self.sequences.get(name).map(|last| Sequence {
            name: name.to_string(),
            last: *last,
        })
    }

    /// Known names in lexical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sequences
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
