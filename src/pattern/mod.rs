//! Pattern Miner
//!
//! Derives recurring behavior from an ordered event snapshot:
//! - **Workflow sequences**: repeated app transition sequences
//! - **Context switching**: sustained bursts of fast focus changes
//! - **Debugging loops**: repeated error copying
//! - **Causal relationships**: which pattern tends to follow which
//!
//! Mining is deterministic: the same events and thresholds always produce
//! the same output, in the same order.

mod causal;
mod miner;
mod types;

pub use causal::infer_causal_relationships;
pub use miner::{ConfidenceScorer, FrequencyScorer, PatternMiner};
pub use types::{CausalRelationship, Occurrence, Pattern, PatternKind};

use serde::{Deserialize, Serialize};

/// Mining thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Transition tokens scanned for workflow sequences
    pub window_size: usize,
    /// Minimum non-overlapping repetitions to emit a pattern
    pub min_repetitions: usize,
    pub max_sequence_len: usize,
    /// Focus switches closer than this count towards a burst
    pub switch_interval_ms: u64,
    /// Minimum switches in one burst
    pub min_switch_run: usize,
    /// Max gap between a cause occurrence and its effect
    pub causal_lookback_secs: u64,
    pub min_causal_strength: f64,
    /// Half-life for weighting old occurrences; None disables decay
    pub decay_half_life_secs: Option<u64>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            window_size: 200,
            min_repetitions: 3,
            max_sequence_len: 5,
            switch_interval_ms: 10_000,
            min_switch_run: 5,
            causal_lookback_secs: 30 * 60,
            min_causal_strength: 0.3,
            decay_half_life_secs: Some(7 * 24 * 3600),
        }
    }
}
