//! Candidate generation from mined patterns
//!
//! The reinforcement policy picks which kind of action to offer for each
//! pattern; the rest (resources, estimated time saved) follows from the
//! pattern itself.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pattern::{CausalRelationship, Pattern, PatternKind};
use crate::policy::{ActionSource, ActionType, CandidateAction, ReinforcementPolicy};

/// Param carrying the RL state a candidate was chosen in
pub const STATE_PARAM: &str = "state";
/// Param identifying "the same suggestion" across mining runs
pub const KEY_PARAM: &str = "key";

/// External context provider (vector search, docs). Only consulted when
/// cloud reasoning is granted.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn related(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Action types worth offering for a pattern kind, preferred first
pub fn options_for(kind: PatternKind) -> &'static [ActionType] {
    match kind {
        PatternKind::WorkflowSequence => &[ActionType::AutomationMacro, ActionType::MicroNudge],
        PatternKind::ContextSwitching => &[
            ActionType::FocusMode,
            ActionType::MicroNudge,
            ActionType::ScheduleChange,
        ],
        PatternKind::DebuggingLoop => &[ActionType::PreemptiveDebugAssistant, ActionType::MicroNudge],
    }
}

fn estimated_minutes(pattern: &Pattern) -> f64 {
    match pattern.kind {
        PatternKind::WorkflowSequence => {
            pattern.frequency as f64 * pattern.signature.len().saturating_sub(1) as f64 * 0.5
        }
        PatternKind::ContextSwitching => pattern.member_ids.len() as f64 * 0.25,
        PatternKind::DebuggingLoop => pattern.frequency as f64 * 2.0,
    }
}

pub fn from_pattern(pattern: &Pattern, rl: &ReinforcementPolicy) -> Option<CandidateAction> {
    let state = pattern.kind.as_str();
    let action_type = rl.select_action(state, options_for(pattern.kind))?;
    let subject = pattern.signature.join(" → ");

    let (description, resource) = match action_type {
        ActionType::AutomationMacro => (
            format!("Create a one-click macro for {}", subject),
            format!("macro:{}", pattern.signature.join(">")),
        ),
        ActionType::MicroNudge => (
            format!("Nudge when {} starts", subject),
            "nudges".to_string(),
        ),
        ActionType::FocusMode => (
            "Enable focus mode and hold notifications during switching bursts".to_string(),
            "notifications".to_string(),
        ),
        ActionType::ScheduleChange => (
            format!("Block focus time to reduce switching between {}", subject),
            "calendar".to_string(),
        ),
        ActionType::PreemptiveDebugAssistant => (
            format!("Open the debugging assistant when errors repeat in {}", subject),
            format!("assistant:{}", subject),
        ),
        ActionType::SystemHygiene => (
            "Clean up idle windows".to_string(),
            "windows".to_string(),
        ),
    };

    let candidate = CandidateAction::new(action_type, &description, pattern.confidence)
        .with_time_saved(estimated_minutes(pattern))
        .with_resource(&resource)
        .with_rationale(&pattern.describe())
        .with_param(STATE_PARAM, state)
        .with_param(KEY_PARAM, &format!("{}|{}", action_type, pattern.id))
        .with_param("value", &format!("enabled:{}", pattern.id))
        .derived_from(ActionSource::Pattern {
            pattern_id: pattern.id.clone(),
        });
    debug!("Candidate {} from {}", action_type, pattern.id);
    Some(candidate)
}

pub fn from_causal(rel: &CausalRelationship) -> CandidateAction {
    CandidateAction::new(
        ActionType::MicroNudge,
        &format!("Prepare for {} when {} happens", rel.effect_pattern, rel.cause_pattern),
        rel.confidence,
    )
    .with_time_saved(rel.support as f64 * 0.5)
    .with_resource("nudges")
    .with_rationale(&format!(
        "{} was followed by {} in {:.0}% of cases",
        rel.cause_pattern,
        rel.effect_pattern,
        rel.strength * 100.0
    ))
    .with_param(STATE_PARAM, "causal")
    .with_param(
        KEY_PARAM,
        &format!("causal|{}|{}", rel.cause_pattern, rel.effect_pattern),
    )
    .with_param("value", &format!("nudge:{}", rel.effect_pattern))
    .derived_from(ActionSource::Causal {
        cause: rel.cause_pattern.clone(),
        effect: rel.effect_pattern.clone(),
    })
}

/// Append retrieved context to the rationale; failures leave it unchanged
pub async fn enrich(candidate: &mut CandidateAction, retrieval: &dyn RetrievalService) {
    match retrieval.related(&candidate.description, 3).await {
        Ok(snippets) if !snippets.is_empty() => {
            candidate.rationale = format!("{} | context: {}", candidate.rationale, snippets.join("; "));
        }
        Ok(_) => {}
        Err(e) => warn!("Retrieval failed for {}: {}", candidate.id, e),
    }
}
