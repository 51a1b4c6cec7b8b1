//! Decision Policy
//!
//! - **Candidates**: typed actions with confidence, risk tier and resources
//! - **Scorer**: weighted expected value with online weight training
//! - **Reinforcement**: epsilon-greedy action-type selection

mod candidate;
mod reinforcement;
mod scorer;

pub use candidate::{ActionSource, ActionType, CandidateAction, RiskCategory};
pub use reinforcement::{PolicyStatistics, ReinforcementPolicy, Reward};
pub use scorer::{ActionOutcome, DecisionPolicy, PolicyObservation, PolicyWeights};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub initial_weights: PolicyWeights,
    /// Minutes saved that count as full value
    pub time_scale_min: f64,
    /// Step size for weight training
    pub learning_rate: f64,
    /// Exploration rate for action-type selection
    pub epsilon: f64,
    pub rl_learning_rate: f64,
    /// Fixed RNG seed; entropy-seeded when unset
    pub rl_seed: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            initial_weights: PolicyWeights::default(),
            time_scale_min: 60.0,
            learning_rate: 0.1,
            epsilon: 0.1,
            rl_learning_rate: 0.1,
            rl_seed: None,
        }
    }
}
