//! Transparency timeline
//!
//! Human-readable record of what the agent looked at and did, bounded to the
//! most recent entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_TIMELINE_CAPACITY: usize = 1000;

/// Kind of timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    ConsentRequested,
    ConsentGranted,
    ConsentRevoked,
    PatternsMined,
    ActionExecuted,
    ActionRolledBack,
    ActionRejected,
}

impl TimelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineKind::ConsentRequested => "consent_requested",
            TimelineKind::ConsentGranted => "consent_granted",
            TimelineKind::ConsentRevoked => "consent_revoked",
            TimelineKind::PatternsMined => "patterns_mined",
            TimelineKind::ActionExecuted => "action_executed",
            TimelineKind::ActionRolledBack => "action_rolled_back",
            TimelineKind::ActionRejected => "action_rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: TimelineKind,
    pub description: String,
    pub data_accessed: Vec<String>,
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransparencyTimeline {
    entries: VecDeque<TimelineEntry>,
    capacity: usize,
}

impl TransparencyTimeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_TIMELINE_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(
        &mut self,
        kind: TimelineKind,
        description: String,
        data_accessed: Vec<String>,
        action_taken: Option<String>,
    ) {
        self.entries.push_back(TimelineEntry {
            timestamp: Utc::now(),
            kind,
            description,
            data_accessed,
            action_taken,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Last `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<TimelineEntry> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransparencyTimeline {
    fn default() -> Self {
        Self::new(DEFAULT_TIMELINE_CAPACITY)
    }
}
