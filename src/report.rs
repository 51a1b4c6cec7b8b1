//! User-facing transparency report
//!
//! Everything the agent knows and did, in one serializable value: consent
//! state and audit trail, what was mined, what was proposed or executed, and
//! what the learners currently believe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use crate::agent::RankedCandidate;
use crate::error::Result;
use crate::observer::ObserverStatsSnapshot;
use crate::pattern::{CausalRelationship, Pattern};
use crate::policy::{PolicyStatistics, PolicyWeights};
use crate::privacy::{Capability, ConsentRecord, TimelineEntry};
use crate::synthesizer::{ExecutedActionView, Proposal};

#[derive(Debug, Clone, Serialize)]
pub struct ConsentStatus {
    pub capability: Capability,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub generated_at: DateTime<Utc>,
    pub consent: Vec<ConsentStatus>,
    pub audit_trail: Vec<ConsentRecord>,
    pub timeline: Vec<TimelineEntry>,
    pub observer: ObserverStatsSnapshot,
    pub patterns: Vec<Pattern>,
    pub causal: Vec<CausalRelationship>,
    pub ranked: Vec<RankedCandidate>,
    pub proposals: Vec<Proposal>,
    pub history: Vec<ExecutedActionView>,
    pub policy_weights: PolicyWeights,
    pub reinforcement: PolicyStatistics,
}

impl AgentReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Short plain-text rendering for terminals
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Report generated {}", self.generated_at.to_rfc3339());

        let granted: Vec<&str> = self
            .consent
            .iter()
            .filter(|c| c.granted)
            .map(|c| c.capability.as_str())
            .collect();
        let _ = writeln!(
            out,
            "Consent: {}",
            if granted.is_empty() { "none".to_string() } else { granted.join(", ") }
        );
        let _ = writeln!(
            out,
            "Events: {} buffered, {} recorded, {} rejected",
            self.observer.buffered, self.observer.recorded, self.observer.rejected
        );

        let _ = writeln!(out, "Patterns ({}):", self.patterns.len());
        for p in &self.patterns {
            let _ = writeln!(out, "  - {}", p.describe());
        }
        for rel in &self.causal {
            let _ = writeln!(
                out,
                "  * {} -> {} (strength {:.2}, support {})",
                rel.cause_pattern, rel.effect_pattern, rel.strength, rel.support
            );
        }

        let _ = writeln!(out, "Proposals ({}):", self.proposals.len());
        for p in &self.proposals {
            let _ = writeln!(
                out,
                "  - [{}] {} (EV {:.2})",
                p.state.as_str(),
                p.candidate.description,
                p.expected_value
            );
        }
        let _ = writeln!(out, "Executed actions: {}", self.history.len());
        let _ = writeln!(
            out,
            "Policy weights: confidence {:.3}, risk {:.3}, time {:.3}",
            self.policy_weights.confidence, self.policy_weights.risk, self.policy_weights.time
        );
        out
    }
}
