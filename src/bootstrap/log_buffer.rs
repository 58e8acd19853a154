//! Bounded FIFO log ring kept inside the bootstrap state.

use std::collections::vec_deque;
use std::collections::VecDeque;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::types::LogEntry;

/// Maximum number of log entries retained
pub const MAX_LOG_ENTRIES: usize = 500;

/// Ring buffer of the most recent log entries, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(MAX_LOG_ENTRIES)),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }
}

impl Serialize for LogBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

impl<'de> Deserialize<'de> for LogBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<LogEntry>::deserialize(deserializer)?;
        let mut buffer = LogBuffer::default();
        for entry in entries {
            buffer.push(entry);
        }
        Ok(buffer)
    }
}
