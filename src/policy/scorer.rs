//! Expected-value scoring and ranking

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::candidate::{CandidateAction, RiskCategory};
use super::PolicyConfig;

/// What actually happened after a suggestion or execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub accepted: bool,
    pub ignored: bool,
    pub time_saved_min: Option<f64>,
    /// Negative means fewer errors afterwards
    pub error_rate_change: Option<f64>,
}

impl ActionOutcome {
    pub fn accepted(time_saved_min: f64) -> Self {
        Self {
            accepted: true,
            time_saved_min: Some(time_saved_min),
            ..Default::default()
        }
    }

    pub fn ignored() -> Self {
        Self {
            ignored: true,
            ..Default::default()
        }
    }
}

/// One training example: the features the policy scored plus the outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyObservation {
    pub confidence: f64,
    pub risk_category: RiskCategory,
    pub estimated_time_saved_min: f64,
    pub outcome: ActionOutcome,
}

impl PolicyObservation {
    pub fn new(candidate: &CandidateAction, outcome: ActionOutcome) -> Self {
        Self {
            confidence: candidate.confidence,
            risk_category: candidate.risk_category,
            estimated_time_saved_min: candidate.estimated_time_saved_min,
            outcome,
        }
    }
}

/// Weights over (confidence, inverse risk, time saved); always sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub confidence: f64,
    pub risk: f64,
    pub time: f64,
}

impl PolicyWeights {
    fn normalized(self) -> Self {
        let confidence = self.confidence.max(0.0);
        let risk = self.risk.max(0.0);
        let time = self.time.max(0.0);
        let sum = confidence + risk + time;
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            confidence: confidence / sum,
            risk: risk / sum,
            time: time / sum,
        }
    }
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            risk: 0.3,
            time: 0.3,
        }
    }
}

pub struct DecisionPolicy {
    config: PolicyConfig,
    weights: RwLock<PolicyWeights>,
}

impl DecisionPolicy {
    pub fn new() -> Self {
        Self::with_config(PolicyConfig::default())
    }

    pub fn with_config(config: PolicyConfig) -> Self {
        let weights = config.initial_weights.normalized();
        Self {
            config,
            weights: RwLock::new(weights),
        }
    }

    pub fn weights(&self) -> PolicyWeights {
        *self.weights.read()
    }

    fn time_norm(&self, minutes: f64) -> f64 {
        let scale = self.config.time_scale_min.max(f64::EPSILON);
        (minutes.max(0.0) / scale).min(1.0)
    }

    fn features(&self, confidence: f64, risk: RiskCategory, time_saved: f64) -> [f64; 3] {
        [
            confidence.clamp(0.0, 1.0),
            risk.risk_factor(),
            self.time_norm(time_saved),
        ]
    }

    /// Expected value in [0, 1]
    pub fn score(&self, candidate: &CandidateAction) -> f64 {
        let w = self.weights();
        let x = self.features(
            candidate.confidence,
            candidate.risk_category,
            candidate.estimated_time_saved_min,
        );
        w.confidence * x[0] + w.risk * x[1] + w.time * x[2]
    }

    /// Online gradient step per observation towards the realized value.
    /// Accepted outcomes realize `0.5 + 0.5 * time_norm(measured)`, rejected
    /// or ignored ones realize 0.
    pub fn train(&self, observations: &[PolicyObservation]) -> PolicyWeights {
        let lr = self.config.learning_rate.clamp(0.0, 1.0);
        let mut weights = self.weights.write();

        for obs in observations {
            let x = self.features(obs.confidence, obs.risk_category, obs.estimated_time_saved_min);
            let predicted = weights.confidence * x[0] + weights.risk * x[1] + weights.time * x[2];
            let realized = if obs.outcome.accepted {
                0.5 + 0.5 * self.time_norm(obs.outcome.time_saved_min.unwrap_or(0.0))
            } else {
                0.0
            };
            let error = realized - predicted;

            *weights = PolicyWeights {
                confidence: weights.confidence + lr * error * x[0],
                risk: weights.risk + lr * error * x[1],
                time: weights.time + lr * error * x[2],
            }
            .normalized();

            debug!(
                "Policy step: predicted {:.3}, realized {:.3}, weights {:?}",
                predicted, realized, *weights
            );
        }

        if !observations.is_empty() {
            info!(
                "Policy trained on {} observations (conf {:.3}, risk {:.3}, time {:.3})",
                observations.len(),
                weights.confidence,
                weights.risk,
                weights.time
            );
        }
        *weights
    }

    /// Sort by expected value desc, then confidence desc, then risk asc
    pub fn rank(&self, candidates: Vec<CandidateAction>) -> Vec<(CandidateAction, f64)> {
        let mut scored: Vec<(CandidateAction, f64)> = candidates
            .into_iter()
            .map(|c| {
                let ev = self.score(&c);
                (c, ev)
            })
            .collect();

        scored.sort_by(|(a, ev_a), (b, ev_b)| {
            ev_b.total_cmp(ev_a)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.risk_category.cmp(&b.risk_category))
        });
        scored
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionType;

    fn candidate(conf: f64, risk: RiskCategory, minutes: f64) -> CandidateAction {
        CandidateAction::new(ActionType::AutomationMacro, "test", conf)
            .with_risk(risk)
            .with_time_saved(minutes)
    }

    #[test]
    fn test_score_formula() {
        let policy = DecisionPolicy::new();
        let ev = policy.score(&candidate(0.5, RiskCategory::Medium, 30.0));
        // 0.4*0.5 + 0.3*0.7 + 0.3*0.5
        assert!((ev - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_critical_penalized_most() {
        let policy = DecisionPolicy::new();
        let low = policy.score(&candidate(0.9, RiskCategory::Low, 10.0));
        let critical = policy.score(&candidate(0.9, RiskCategory::Critical, 10.0));
        assert!(low > critical);
    }

    #[test]
    fn test_rank_tie_breaks() {
        let policy = DecisionPolicy::with_config(PolicyConfig {
            initial_weights: PolicyWeights {
                confidence: 0.0,
                risk: 0.0,
                time: 1.0,
            },
            ..PolicyConfig::default()
        });
        let a = candidate(0.5, RiskCategory::High, 60.0);
        let b = candidate(0.9, RiskCategory::High, 60.0);
        let c = candidate(0.9, RiskCategory::Low, 60.0);
        let d = candidate(1.0, RiskCategory::Low, 10.0);
        let ranked = policy.rank(vec![a.clone(), b.clone(), c.clone(), d.clone()]);
        let ids: Vec<_> = ranked.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id, d.id]);
    }

    #[test]
    fn test_train_moves_towards_outperformers() {
        let policy = DecisionPolicy::new();
        let c = candidate(0.1, RiskCategory::High, 60.0);
        let w = policy.train(&[PolicyObservation::new(&c, ActionOutcome::accepted(60.0))]);
        assert!(w.time > 0.33);
        assert!(w.confidence < 0.4);
        assert!((w.confidence + w.risk + w.time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_train_moves_away_from_underperformers() {
        let policy = DecisionPolicy::new();
        let c = candidate(1.0, RiskCategory::Critical, 0.0);
        let before = policy.weights();
        let after = policy.train(&[PolicyObservation::new(&c, ActionOutcome::ignored())]);
        assert!(after.confidence < before.confidence);
        assert!(after.risk > before.risk);
    }

    #[test]
    fn test_weights_stay_non_negative() {
        let policy = DecisionPolicy::with_config(PolicyConfig {
            learning_rate: 1.0,
            ..PolicyConfig::default()
        });
        let c = candidate(1.0, RiskCategory::Low, 60.0);
        let obs: Vec<_> = (0..50)
            .map(|_| PolicyObservation::new(&c, ActionOutcome::ignored()))
            .collect();
        let w = policy.train(&obs);
        assert!(w.confidence >= 0.0 && w.risk >= 0.0 && w.time >= 0.0);
        assert!((w.confidence + w.risk + w.time - 1.0).abs() < 1e-9);
    }
}
