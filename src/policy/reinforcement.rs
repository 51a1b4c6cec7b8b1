//! Epsilon-greedy action selection over a tabular value estimate.
//!
//! This is the only component allowed to use randomness; the RNG and ε are
//! injected so tests can pin them.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::candidate::ActionType;
use super::scorer::ActionOutcome;

/// Scalar reward derived from an outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// Accepted +10, ignored -2, +0.5 per minute saved, +5 when errors dropped
    pub fn from_outcome(outcome: &ActionOutcome) -> Self {
        let mut reward = 0.0;
        if outcome.accepted {
            reward += 10.0;
        } else if outcome.ignored {
            reward -= 2.0;
        }
        if let Some(minutes) = outcome.time_saved_min {
            reward += minutes * 0.5;
        }
        if matches!(outcome.error_rate_change, Some(change) if change < 0.0) {
            reward += 5.0;
        }
        Self(reward)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ValueEntry {
    q: f64,
    visits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStatistics {
    pub total_entries: usize,
    pub total_states: usize,
    pub avg_q_value: f64,
    pub learning_rate: f64,
    pub epsilon: f64,
    pub explorations: u64,
    pub exploitations: u64,
}

struct Inner<R> {
    rng: R,
    table: HashMap<(String, ActionType), ValueEntry>,
    explorations: u64,
    exploitations: u64,
}

pub struct ReinforcementPolicy<R = StdRng> {
    epsilon: f64,
    learning_rate: f64,
    inner: Mutex<Inner<R>>,
}

impl ReinforcementPolicy<StdRng> {
    /// Entropy-seeded policy
    pub fn new(epsilon: f64, learning_rate: f64) -> Self {
        Self::with_rng(epsilon, learning_rate, StdRng::from_entropy())
    }

    /// Deterministic policy for a given seed
    pub fn seeded(epsilon: f64, learning_rate: f64, seed: u64) -> Self {
        Self::with_rng(epsilon, learning_rate, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ReinforcementPolicy<R> {
    /// ε is clamped to [0, 1]; the learning rate to (0, 1]
    pub fn with_rng(epsilon: f64, learning_rate: f64, rng: R) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            learning_rate: learning_rate.clamp(f64::EPSILON, 1.0),
            inner: Mutex::new(Inner {
                rng,
                table: HashMap::new(),
                explorations: 0,
                exploitations: 0,
            }),
        }
    }

    /// Explore a uniformly random action with probability ε, otherwise the
    /// best known action for `state` (first in `available` on ties).
    pub fn select_action(&self, state: &str, available: &[ActionType]) -> Option<ActionType> {
        if available.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock();

        if inner.rng.gen::<f64>() < self.epsilon {
            inner.explorations += 1;
            let idx = inner.rng.gen_range(0..available.len());
            debug!("RL explore in '{}': {}", state, available[idx]);
            return Some(available[idx]);
        }

        inner.exploitations += 1;
        let mut best = available[0];
        let mut best_q = f64::NEG_INFINITY;
        for &action in available {
            let q = inner
                .table
                .get(&(state.to_string(), action))
                .map(|e| e.q)
                .unwrap_or(0.0);
            if q > best_q {
                best = action;
                best_q = q;
            }
        }
        Some(best)
    }

    /// `Q(s, a) += α (r - Q(s, a))`
    pub fn update_from_outcome(&self, state: &str, action: ActionType, reward: Reward) -> f64 {
        let mut inner = self.inner.lock();
        let entry = inner.table.entry((state.to_string(), action)).or_default();
        entry.q += self.learning_rate * (reward.value() - entry.q);
        entry.visits += 1;
        debug!(
            "RL update '{}' / {}: reward {:.2}, q {:.3} (visits {})",
            state, action, reward.value(), entry.q, entry.visits
        );
        entry.q
    }

    pub fn q_value(&self, state: &str, action: ActionType) -> f64 {
        self.inner
            .lock()
            .table
            .get(&(state.to_string(), action))
            .map(|e| e.q)
            .unwrap_or(0.0)
    }

    pub fn statistics(&self) -> PolicyStatistics {
        let inner = self.inner.lock();
        let total_entries = inner.table.len();
        let mut states: Vec<&str> = inner.table.keys().map(|(s, _)| s.as_str()).collect();
        states.sort_unstable();
        states.dedup();
        let avg_q_value = if total_entries > 0 {
            inner.table.values().map(|e| e.q).sum::<f64>() / total_entries as f64
        } else {
            0.0
        };
        PolicyStatistics {
            total_entries,
            total_states: states.len(),
            avg_q_value,
            learning_rate: self.learning_rate,
            epsilon: self.epsilon,
            explorations: inner.explorations,
            exploitations: inner.exploitations,
        }
    }
}
