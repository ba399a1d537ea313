//! Bounded pattern history
//!
//! Keeps the most recent closed-window patterns for trend comparison and for
//! the listeners that chart recent behavior.

use crate::behavior::types::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of closed windows retained
pub const DEFAULT_HISTORY_CAP: usize = 10;

/// FIFO of patterns, oldest first, capped at `cap` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHistory {
    patterns: VecDeque<Pattern>,
    cap: usize,
}

impl Default for PatternHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl PatternHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            patterns: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Rebuild from stored patterns (oldest first), keeping the newest `cap`
    pub fn from_patterns(patterns: Vec<Pattern>, cap: usize) -> Self {
        let mut history = Self::new(cap);
        for pattern in patterns {
            history.push(pattern);
        }
        history
    }

    /// Append a pattern, dropping the oldest once over capacity
    pub fn push(&mut self, pattern: Pattern) {
        self.patterns.push_back(pattern);
        while self.patterns.len() > self.cap {
            self.patterns.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Pattern> {
        self.patterns.back()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    /// Oldest-first copy, the shape persisted under the `patterns` key
    pub fn to_vec(&self) -> Vec<Pattern> {
        self.patterns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
