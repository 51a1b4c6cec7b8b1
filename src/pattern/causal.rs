//! Causal inference between patterns
//!
//! For an ordered pair (A, B), strength is the share of A occurrences whose
//! immediately following pattern occurrence is a B occurrence starting
//! within the lookback window. Occurrences are weighted by an exponential
//! half-life measured from the newest pattern occurrence, so relationships
//! fade unless new events keep confirming them.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::types::{CausalRelationship, Occurrence, Pattern};
use super::MinerConfig;

pub fn infer_causal_relationships(
    patterns: &[Pattern],
    config: &MinerConfig,
) -> Vec<CausalRelationship> {
    let Some(reference) = patterns.iter().map(|p| p.last_seen).max() else {
        return Vec::new();
    };
    let lookback = Duration::seconds(config.causal_lookback_secs as i64);

    // (pattern index, occurrence), ordered by start position
    let mut all: Vec<(usize, &Occurrence)> = patterns
        .iter()
        .enumerate()
        .flat_map(|(i, p)| p.occurrences.iter().map(move |o| (i, o)))
        .collect();
    all.sort_by_key(|(i, o)| (o.start_index, *i));

    let mut relationships = Vec::new();
    for (a, cause) in patterns.iter().enumerate() {
        let mut total_weight = 0.0;
        // effect index -> (weighted hits, raw hits)
        let mut hits: BTreeMap<usize, (f64, usize)> = BTreeMap::new();

        for occ in &cause.occurrences {
            let weight = decay_weight(reference, occ.end, config.decay_half_life_secs);
            total_weight += weight;

            let following: Vec<&(usize, &Occurrence)> = all
                .iter()
                .filter(|(p, o)| {
                    *p != a && o.start_index >= occ.end_index && o.start_index > occ.start_index
                })
                .collect();
            let Some(next_start) = following.first().map(|(_, o)| o.start_index) else {
                continue;
            };

            let mut counted: Vec<usize> = Vec::new();
            for (b, o) in following.iter().take_while(|(_, o)| o.start_index == next_start) {
                if o.start.signed_duration_since(occ.end) > lookback || counted.contains(b) {
                    continue;
                }
                counted.push(*b);
                let entry = hits.entry(*b).or_insert((0.0, 0));
                entry.0 += weight;
                entry.1 += 1;
            }
        }

        if total_weight <= 0.0 {
            continue;
        }

        for (b, (weighted, support)) in hits {
            let strength = (weighted / total_weight).clamp(0.0, 1.0);
            if strength < config.min_causal_strength {
                debug!(
                    "Dropping {} -> {} (strength {:.2})",
                    cause.id, patterns[b].id, strength
                );
                continue;
            }
            let evidence = support as f64 / config.min_repetitions.max(1) as f64;
            relationships.push(CausalRelationship {
                cause_pattern: cause.id.clone(),
                effect_pattern: patterns[b].id.clone(),
                strength,
                support,
                confidence: strength * evidence.min(1.0),
            });
        }
    }

    relationships.sort_by(|x, y| {
        y.strength
            .total_cmp(&x.strength)
            .then(x.cause_pattern.cmp(&y.cause_pattern))
            .then(x.effect_pattern.cmp(&y.effect_pattern))
    });
    relationships
}

/// `0.5 ^ (age / half_life)`, 1.0 when decay is disabled
fn decay_weight(reference: DateTime<Utc>, at: DateTime<Utc>, half_life_secs: Option<u64>) -> f64 {
    match half_life_secs {
        Some(half_life) if half_life > 0 => {
            let age = reference.signed_duration_since(at).num_seconds().max(0) as f64;
            0.5_f64.powf(age / half_life as f64)
        }
        _ => 1.0,
    }
}
