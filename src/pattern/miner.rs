//! Sequence, context-switch and debugging-loop detection

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::causal;
use super::types::{CausalRelationship, Occurrence, Pattern, PatternKind};
use super::MinerConfig;
use crate::observer::ObservedEvent;

/// Pluggable confidence provider for mined patterns
pub trait ConfidenceScorer: Send + Sync {
    /// Confidence in [0, 1] for `pattern` mined from `window_len` items
    fn score(&self, pattern: &Pattern, window_len: usize) -> f64;
}

/// Frequency normalized against window size.
///
/// Workflow and debugging patterns score `frequency * signature_len / window_len`;
/// context switching scores the share of window events inside bursts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyScorer;

impl ConfidenceScorer for FrequencyScorer {
    fn score(&self, pattern: &Pattern, window_len: usize) -> f64 {
        if window_len == 0 {
            return 0.0;
        }
        let covered = match pattern.kind {
            PatternKind::ContextSwitching => pattern.member_ids.len(),
            _ => pattern.frequency * pattern.signature.len().max(1),
        };
        (covered as f64 / window_len as f64).clamp(0.0, 1.0)
    }
}

/// App transition with the index of the event that produced it
#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    index: usize,
    app: &'a str,
}

pub struct PatternMiner {
    config: MinerConfig,
    scorer: Arc<dyn ConfidenceScorer>,
}

impl PatternMiner {
    pub fn new(config: MinerConfig) -> Self {
        Self::with_scorer(config, Arc::new(FrequencyScorer))
    }

    pub fn with_scorer(config: MinerConfig, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Detect all patterns in an ordered event snapshot
    pub fn detect_patterns(&self, events: &[ObservedEvent]) -> Vec<Pattern> {
        let mut patterns = self.workflow_sequences(events);
        patterns.extend(self.context_switching(events));
        patterns.extend(self.debugging_loops(events));

        patterns.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(b.frequency.cmp(&a.frequency))
                .then(a.id.cmp(&b.id))
        });

        info!("Mined {} patterns from {} events", patterns.len(), events.len());
        patterns
    }

    pub fn infer_causal_relationships(&self, patterns: &[Pattern]) -> Vec<CausalRelationship> {
        causal::infer_causal_relationships(patterns, &self.config)
    }

    fn workflow_sequences(&self, events: &[ObservedEvent]) -> Vec<Pattern> {
        let tokens = transition_tokens(events, self.config.window_size);
        let min_reps = self.config.min_repetitions.max(1);
        let max_len = self.config.max_sequence_len.max(2).min(tokens.len());

        let mut candidates: Vec<Pattern> = Vec::new();
        for len in 2..=max_len {
            let mut seen: BTreeSet<Vec<&str>> = BTreeSet::new();
            for start in 0..=(tokens.len() - len) {
                let signature: Vec<&str> = tokens[start..start + len].iter().map(|t| t.app).collect();
                if !seen.insert(signature.clone()) {
                    continue;
                }

                let spans = non_overlapping_matches(&tokens, &signature);
                if spans.len() < min_reps {
                    continue;
                }

                let mut member_ids = Vec::with_capacity(spans.len() * len);
                let occurrences = spans
                    .iter()
                    .map(|&s| {
                        let first = tokens[s].index;
                        let last = tokens[s + len - 1].index;
                        member_ids.extend(tokens[s..s + len].iter().map(|t| events[t.index].id));
                        Occurrence {
                            start_index: first,
                            end_index: last,
                            start: events[first].timestamp,
                            end: events[last].timestamp,
                        }
                    })
                    .collect();

                let signature = signature.into_iter().map(String::from).collect();
                if let Some(mut pattern) = Pattern::from_occurrences(
                    PatternKind::WorkflowSequence,
                    signature,
                    member_ids,
                    occurrences,
                ) {
                    pattern.confidence = self.scorer.score(&pattern, tokens.len());
                    candidates.push(pattern);
                }
            }
        }

        let found = candidates.len();
        let kept = dedup_sequences(candidates);
        debug!("Workflow scan: {} tokens, {} candidates, {} kept", tokens.len(), found, kept.len());
        kept
    }

    fn context_switching(&self, events: &[ObservedEvent]) -> Vec<Pattern> {
        let offset = events.len().saturating_sub(self.config.window_size);
        let window = &events[offset..];
        let interval = self.config.switch_interval_ms as i64;
        let min_run = self.config.min_switch_run.max(2);

        let switches: Vec<usize> = window
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind.is_focus_switch())
            .map(|(i, _)| offset + i)
            .collect();

        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for &idx in &switches {
            if let Some(&prev) = current.last() {
                let gap = events[idx]
                    .timestamp
                    .signed_duration_since(events[prev].timestamp)
                    .num_milliseconds();
                if gap < 0 || gap >= interval {
                    if current.len() >= min_run {
                        runs.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
            }
            current.push(idx);
        }
        if current.len() >= min_run {
            runs.push(current);
        }

        if runs.is_empty() {
            return Vec::new();
        }

        let mut signature: Vec<String> = Vec::new();
        let mut member_ids: Vec<Uuid> = Vec::new();
        let mut occurrences = Vec::with_capacity(runs.len());
        for run in &runs {
            for &idx in run {
                let app = &events[idx].app_name;
                if !signature.contains(app) {
                    signature.push(app.clone());
                }
                member_ids.push(events[idx].id);
            }
            let (first, last) = (run[0], run[run.len() - 1]);
            occurrences.push(Occurrence {
                start_index: first,
                end_index: last,
                start: events[first].timestamp,
                end: events[last].timestamp,
            });
        }

        Pattern::from_occurrences(PatternKind::ContextSwitching, signature, member_ids, occurrences)
            .map(|mut p| {
                p.confidence = self.scorer.score(&p, window.len());
                p
            })
            .into_iter()
            .collect()
    }

    fn debugging_loops(&self, events: &[ObservedEvent]) -> Vec<Pattern> {
        let offset = events.len().saturating_sub(self.config.window_size);
        let window = &events[offset..];

        let mut by_app: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, event) in window.iter().enumerate() {
            if event.payload.get("action").map(String::as_str) == Some("copy_error") {
                by_app.entry(event.app_name.as_str()).or_default().push(offset + i);
            }
        }

        by_app
            .into_iter()
            .filter(|(_, hits)| hits.len() >= self.config.min_repetitions.max(1))
            .filter_map(|(app, hits)| {
                let member_ids = hits.iter().map(|&i| events[i].id).collect();
                let occurrences = hits
                    .iter()
                    .map(|&i| Occurrence {
                        start_index: i,
                        end_index: i,
                        start: events[i].timestamp,
                        end: events[i].timestamp,
                    })
                    .collect();
                Pattern::from_occurrences(
                    PatternKind::DebuggingLoop,
                    vec![app.to_string()],
                    member_ids,
                    occurrences,
                )
            })
            .map(|mut p| {
                p.confidence = self.scorer.score(&p, window.len());
                p
            })
            .collect()
    }
}

impl Default for PatternMiner {
    fn default() -> Self {
        Self::new(MinerConfig::default())
    }
}

/// Transition apps with consecutive duplicates collapsed, last `window` only
fn transition_tokens(events: &[ObservedEvent], window: usize) -> Vec<Token<'_>> {
    let mut tokens: Vec<Token<'_>> = Vec::new();
    for (index, event) in events.iter().enumerate() {
        if !event.kind.is_transition() {
            continue;
        }
        if tokens.last().map(|t| t.app) == Some(event.app_name.as_str()) {
            continue;
        }
        tokens.push(Token {
            index,
            app: &event.app_name,
        });
    }
    let start = tokens.len().saturating_sub(window);
    tokens.split_off(start)
}

/// Greedy left-to-right non-overlapping match starts
fn non_overlapping_matches(tokens: &[Token<'_>], signature: &[&str]) -> Vec<usize> {
    let len = signature.len();
    let mut starts = Vec::new();
    let mut i = 0;
    while i + len <= tokens.len() {
        if tokens[i..i + len].iter().zip(signature).all(|(t, s)| t.app == *s) {
            starts.push(i);
            i += len;
        } else {
            i += 1;
        }
    }
    starts
}

/// Drop sequences contained in a longer, at-least-as-frequent sequence, then
/// merge cyclic rotations keeping the most frequent (earliest on ties).
fn dedup_sequences(candidates: Vec<Pattern>) -> Vec<Pattern> {
    let unsubsumed: Vec<&Pattern> = candidates
        .iter()
        .filter(|short| {
            !candidates.iter().any(|long| {
                long.signature.len() > short.signature.len()
                    && long.frequency >= short.frequency
                    && contains_run(&long.signature, &short.signature)
            })
        })
        .collect();

    let mut ordered = unsubsumed;
    ordered.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then(a.occurrences[0].start_index.cmp(&b.occurrences[0].start_index))
            .then(a.signature.cmp(&b.signature))
    });

    let mut kept: Vec<Pattern> = Vec::new();
    for pattern in ordered {
        if kept.iter().any(|k| is_rotation(&k.signature, &pattern.signature)) {
            continue;
        }
        kept.push(pattern.clone());
    }
    kept
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn is_rotation(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && (0..a.len()).any(|shift| a.iter().cycle().skip(shift).take(a.len()).eq(b.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::EventKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn switches(apps: &[&str], step_secs: i64) -> Vec<ObservedEvent> {
        apps.iter()
            .enumerate()
            .map(|(i, app)| {
                ObservedEvent::at(EventKind::AppSwitch, app, base() + Duration::seconds(step_secs * i as i64))
            })
            .collect()
    }

    fn workflows(patterns: &[Pattern]) -> Vec<&Pattern> {
        patterns
            .iter()
            .filter(|p| p.kind == PatternKind::WorkflowSequence)
            .collect()
    }

    #[test]
    fn test_alternating_pair_frequency_three() {
        let events = switches(&["A", "B", "A", "B", "A", "B"], 60);
        let patterns = PatternMiner::default().detect_patterns(&events);
        let wf = workflows(&patterns);
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].signature, vec!["A", "B"]);
        assert_eq!(wf[0].frequency, 3);
        assert_eq!(wf[0].id, "workflow:A>B");
        assert!((wf[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_emits_nothing() {
        let events = switches(&["A", "B", "A", "B"], 60);
        let patterns = PatternMiner::default().detect_patterns(&events);
        assert!(workflows(&patterns).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let events = switches(&["A", "A", "B", "B", "A", "B", "B", "A", "B"], 60);
        let patterns = PatternMiner::default().detect_patterns(&events);
        let wf = workflows(&patterns);
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].frequency, 3);
    }

    #[test]
    fn test_longer_sequence_subsumes_parts() {
        let events = switches(&["A", "B", "C", "A", "B", "C", "A", "B", "C"], 60);
        let patterns = PatternMiner::default().detect_patterns(&events);
        let wf = workflows(&patterns);
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].signature, vec!["A", "B", "C"]);
        assert_eq!(wf[0].frequency, 3);
    }

    #[test]
    fn test_rotations_merge_to_most_frequent() {
        let events = switches(&["A", "B", "A", "B", "A", "B", "A", "B"], 60);
        let patterns = PatternMiner::default().detect_patterns(&events);
        let wf = workflows(&patterns);
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].id, "workflow:A>B");
        assert_eq!(wf[0].frequency, 4);
    }

    #[test]
    fn test_non_transition_events_ignored() {
        let mut events = Vec::new();
        for (i, app) in ["A", "B", "A", "B", "A", "B"].iter().enumerate() {
            let t = base() + Duration::minutes(i as i64);
            events.push(ObservedEvent::at(EventKind::AppSwitch, app, t));
            events.push(ObservedEvent::at(EventKind::KeyPress, "Other", t));
        }
        let patterns = PatternMiner::default().detect_patterns(&events);
        assert_eq!(workflows(&patterns)[0].frequency, 3);
    }

    #[test]
    fn test_context_switching_burst() {
        let events = switches(&["Slack", "IDE", "Mail", "IDE", "Slack", "IDE"], 2);
        let patterns = PatternMiner::default().detect_patterns(&events);
        let cs: Vec<_> = patterns
            .iter()
            .filter(|p| p.kind == PatternKind::ContextSwitching)
            .collect();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].frequency, 1);
        assert_eq!(cs[0].member_ids.len(), 6);
        assert_eq!(cs[0].signature, vec!["Slack", "IDE", "Mail"]);
    }

    #[test]
    fn test_slow_switching_is_not_a_burst() {
        let events = switches(&["Slack", "IDE", "Mail", "IDE", "Slack", "IDE"], 30);
        let patterns = PatternMiner::default().detect_patterns(&events);
        assert!(patterns.iter().all(|p| p.kind != PatternKind::ContextSwitching));
    }

    #[test]
    fn test_debugging_loop() {
        let events: Vec<_> = (0..4)
            .map(|i| {
                ObservedEvent::at(EventKind::KeyPress, "IDE", base() + Duration::seconds(i))
                    .with_payload("action", "copy_error")
            })
            .collect();
        let patterns = PatternMiner::default().detect_patterns(&events);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::DebuggingLoop);
        assert_eq!(patterns[0].id, "debugging_loop:IDE");
        assert_eq!(patterns[0].frequency, 4);
    }

    #[test]
    fn test_custom_scorer() {
        struct Fixed;
        impl ConfidenceScorer for Fixed {
            fn score(&self, _: &Pattern, _: usize) -> f64 {
                0.42
            }
        }
        let miner = PatternMiner::with_scorer(MinerConfig::default(), Arc::new(Fixed));
        let events = switches(&["A", "B", "A", "B", "A", "B"], 60);
        let patterns = miner.detect_patterns(&events);
        assert_eq!(patterns[0].confidence, 0.42);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let events = switches(&["A", "B", "C", "A", "B", "C", "A", "B", "C", "D", "A", "B"], 5);
        let miner = PatternMiner::default();
        let first = miner.detect_patterns(&events);
        for _ in 0..5 {
            assert_eq!(miner.detect_patterns(&events), first);
        }
    }
}
