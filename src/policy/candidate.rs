//! Candidate actions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind of action the agent can propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Replay a recurring app sequence in one step
    AutomationMacro,
    /// Short suggestion surfaced at the right moment
    MicroNudge,
    /// Move or batch calendar/notification slots
    ScheduleChange,
    /// Silence distractions for a focus block
    FocusMode,
    /// Open debugging help when an error loop starts
    PreemptiveDebugAssistant,
    /// Clean up stale windows, tabs, temp files
    SystemHygiene,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::AutomationMacro,
        ActionType::MicroNudge,
        ActionType::ScheduleChange,
        ActionType::FocusMode,
        ActionType::PreemptiveDebugAssistant,
        ActionType::SystemHygiene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AutomationMacro => "automation_macro",
            ActionType::MicroNudge => "micro_nudge",
            ActionType::ScheduleChange => "schedule_change",
            ActionType::FocusMode => "focus_mode",
            ActionType::PreemptiveDebugAssistant => "preemptive_debug_assistant",
            ActionType::SystemHygiene => "system_hygiene",
        }
    }

    /// Baseline risk when nothing else is known
    pub fn default_risk(&self) -> RiskCategory {
        match self {
            ActionType::MicroNudge | ActionType::FocusMode => RiskCategory::Low,
            ActionType::AutomationMacro | ActionType::PreemptiveDebugAssistant => {
                RiskCategory::Medium
            }
            ActionType::ScheduleChange => RiskCategory::High,
            ActionType::SystemHygiene => RiskCategory::Critical,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk tier, ordered from safest to most dangerous
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskCategory {
    /// Inverse-risk feature used by the scorer
    pub fn risk_factor(&self) -> f64 {
        match self {
            RiskCategory::Low => 1.0,
            RiskCategory::Medium => 0.7,
            RiskCategory::High => 0.3,
            RiskCategory::Critical => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
            RiskCategory::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(RiskCategory::Low),
            "medium" => Some(RiskCategory::Medium),
            "high" => Some(RiskCategory::High),
            "critical" => Some(RiskCategory::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only back-reference to what produced a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ActionSource {
    Pattern { pattern_id: String },
    Causal { cause: String, effect: String },
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub id: Uuid,
    pub action_type: ActionType,
    pub description: String,
    pub rationale: String,
    pub confidence: f64,
    pub risk_category: RiskCategory,
    pub estimated_time_saved_min: f64,
    /// Resource ids the action touches
    pub resources: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub derived_from: ActionSource,
}

impl CandidateAction {
    pub fn new(action_type: ActionType, description: &str, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            description: description.to_string(),
            rationale: String::new(),
            confidence: unit_interval(confidence),
            risk_category: action_type.default_risk(),
            estimated_time_saved_min: 0.0,
            resources: Vec::new(),
            params: BTreeMap::new(),
            derived_from: ActionSource::Manual,
        }
    }

    pub fn with_risk(mut self, risk: RiskCategory) -> Self {
        self.risk_category = risk;
        self
    }

    pub fn with_time_saved(mut self, minutes: f64) -> Self {
        self.estimated_time_saved_min = minutes.max(0.0);
        self
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        if !self.resources.iter().any(|r| r == resource) {
            self.resources.push(resource.to_string());
        }
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = rationale.to_string();
        self
    }

    pub fn derived_from(mut self, source: ActionSource) -> Self {
        self.derived_from = source;
        self
    }

    /// Resources sorted and deduplicated (lock acquisition order)
    pub fn sorted_resources(&self) -> Vec<String> {
        let mut resources = self.resources.clone();
        resources.sort();
        resources.dedup();
        resources
    }

    pub fn overlaps(&self, other: &CandidateAction) -> bool {
        self.resources.iter().any(|r| other.resources.contains(r))
    }
}

/// Clamp to [0, 1]; NaN and infinities count as no confidence
fn unit_interval(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
