use std::collections::VecDeque;

use crate::protocol::Envelope;

/// Default maximum number of envelopes retained before oldest are evicted.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Bounded, ordered history of classified channel traffic for one agent.
///
/// This is the only history kept on the operator side: there is no replay
/// from the agent on reconnect, so a fresh session starts empty.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<Envelope>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a log with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append an envelope. Evicts the oldest entry if at capacity.
    pub fn append(&mut self, env: Envelope) {
        self.entries.push_back(env);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// All retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate retained entries, oldest first.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, Envelope> {
        self.entries.iter()
    }

    /// The most recently appended entry.
    pub fn newest(&self) -> Option<&Envelope> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
