//! Pattern types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Repeated sequence of app transitions
    WorkflowSequence,
    /// Sustained run of fast focus switches
    ContextSwitching,
    /// Repeated error copying in one app
    DebuggingLoop,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::WorkflowSequence => "workflow_sequence",
            PatternKind::ContextSwitching => "context_switching",
            PatternKind::DebuggingLoop => "debugging_loop",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One occurrence of a pattern, as positions in the mined event slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start_index: usize,
    pub end_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable id derived from kind and signature, e.g. `workflow:Teams>Gmail`
    pub id: String,
    pub kind: PatternKind,
    pub signature: Vec<String>,
    pub member_ids: Vec<Uuid>,
    pub occurrences: Vec<Occurrence>,
    pub frequency: usize,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    /// Build a pattern from its occurrences; confidence is filled in by the scorer
    pub(crate) fn from_occurrences(
        kind: PatternKind,
        signature: Vec<String>,
        member_ids: Vec<Uuid>,
        occurrences: Vec<Occurrence>,
    ) -> Option<Self> {
        let first_seen = occurrences.first()?.start;
        let last_seen = occurrences.last()?.end;
        let id = match kind {
            PatternKind::WorkflowSequence => format!("workflow:{}", signature.join(">")),
            PatternKind::ContextSwitching => "context_switching".to_string(),
            PatternKind::DebuggingLoop => format!("debugging_loop:{}", signature.join(",")),
        };
        Some(Self {
            id,
            kind,
            frequency: occurrences.len(),
            signature,
            member_ids,
            occurrences,
            confidence: 0.0,
            first_seen,
            last_seen,
        })
    }

    /// Human summary used in candidate rationales
    pub fn describe(&self) -> String {
        match self.kind {
            PatternKind::WorkflowSequence => format!(
                "You switch {} {} times",
                self.signature.join(" → "),
                self.frequency
            ),
            PatternKind::ContextSwitching => format!(
                "Rapid context switching between {} ({} bursts)",
                self.signature.join(", "),
                self.frequency
            ),
            PatternKind::DebuggingLoop => format!(
                "Repeated error copying in {} ({} times)",
                self.signature.join(", "),
                self.frequency
            ),
        }
    }
}

/// Directional association between two patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalRelationship {
    pub cause_pattern: String,
    pub effect_pattern: String,
    /// Decay-weighted share of cause occurrences followed by the effect
    pub strength: f64,
    /// Raw count of cause occurrences followed by the effect
    pub support: usize,
    pub confidence: f64,
}
