//! Agent orchestration
//!
//! Owns every component and wires the pipeline:
//! observer → miner → policy → synthesizer → sandbox → execution history.
//! The consent kernel gates each stage. There is no global state: build an
//! [`Agent`], `start` it, and `shutdown` it when done.

mod background;
mod candidates;

pub use background::BackgroundConfig;
pub use candidates::{options_for, RetrievalService, KEY_PARAM, STATE_PARAM};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::observer::{EventObserver, ObservedEvent};
use crate::pattern::{CausalRelationship, Pattern, PatternMiner};
use crate::policy::{
    ActionOutcome, CandidateAction, DecisionPolicy, PolicyObservation, ReinforcementPolicy, Reward,
};
use crate::privacy::{Capability, ConsentKernel, SecureStore, TimelineKind};
use crate::report::{AgentReport, ConsentStatus};
use crate::sandbox::{Environment, SandboxRunner};
use crate::synthesizer::{AutoActionSynthesizer, Decision};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: CandidateAction,
    pub expected_value: f64,
}

/// Result of one mining pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningSnapshot {
    pub mined_at: DateTime<Utc>,
    pub events_considered: usize,
    pub patterns: Vec<Pattern>,
    pub causal: Vec<CausalRelationship>,
    pub ranked: Vec<RankedCandidate>,
}

pub struct Agent {
    config: Config,
    consent: Arc<ConsentKernel>,
    observer: Arc<EventObserver>,
    miner: PatternMiner,
    policy: Arc<DecisionPolicy>,
    rl: ReinforcementPolicy,
    sandbox: Arc<SandboxRunner>,
    synthesizer: AutoActionSynthesizer,
    retrieval: Option<Arc<dyn RetrievalService>>,
    store: Option<Arc<dyn SecureStore>>,
    latest: RwLock<Option<MiningSnapshot>>,
    /// Suggestion keys already proposed, so cycles do not repeat themselves
    proposed_keys: RwLock<HashSet<String>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(config: Config, consent: Arc<ConsentKernel>, env: Arc<dyn Environment>) -> Self {
        let observer = Arc::new(EventObserver::new(config.observer.clone(), consent.clone()));
        let miner = PatternMiner::new(config.miner.clone());
        let policy = Arc::new(DecisionPolicy::with_config(config.policy.clone()));
        let rl = match config.policy.rl_seed {
            Some(seed) => ReinforcementPolicy::seeded(config.policy.epsilon, config.policy.rl_learning_rate, seed),
            None => ReinforcementPolicy::new(config.policy.epsilon, config.policy.rl_learning_rate),
        };
        let sandbox = Arc::new(SandboxRunner::new(config.sandbox.clone(), env));
        let synthesizer = AutoActionSynthesizer::new(
            config.synthesizer.clone(),
            consent.clone(),
            policy.clone(),
            sandbox.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);

        info!("Agent initialized");
        Self {
            config,
            consent,
            observer,
            miner,
            policy,
            rl,
            sandbox,
            synthesizer,
            retrieval: None,
            store: None,
            latest: RwLock::new(None),
            proposed_keys: RwLock::new(HashSet::new()),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalService>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Sealed persistence for the consent ledger
    pub fn with_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn consent(&self) -> &Arc<ConsentKernel> {
        &self.consent
    }

    pub fn observer(&self) -> &Arc<EventObserver> {
        &self.observer
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn reinforcement(&self) -> &ReinforcementPolicy {
        &self.rl
    }

    pub fn sandbox(&self) -> &SandboxRunner {
        &self.sandbox
    }

    pub fn synthesizer(&self) -> &AutoActionSynthesizer {
        &self.synthesizer
    }

    pub fn record(&self, event: ObservedEvent) -> bool {
        self.observer.record(event)
    }

    pub fn latest(&self) -> Option<MiningSnapshot> {
        self.latest.read().clone()
    }

    /// Mine the current event log. Skipped (None) without behavioral-logging consent.
    pub async fn mine(&self) -> Option<MiningSnapshot> {
        if !self.consent.is_granted(Capability::BehavioralLogging) {
            debug!("Skipping mining: behavioral logging not granted");
            return None;
        }

        // Events whose capability was revoked after capture are not mined
        let events: Vec<ObservedEvent> = self
            .observer
            .snapshot()
            .into_iter()
            .filter(|e| self.consent.is_granted(e.kind.capability()))
            .collect();

        let patterns = self.miner.detect_patterns(&events);
        let causal = self.miner.infer_causal_relationships(&patterns);

        let mut candidates: Vec<CandidateAction> = patterns
            .iter()
            .filter_map(|p| candidates::from_pattern(p, &self.rl))
            .collect();
        candidates.extend(causal.iter().map(candidates::from_causal));

        if let Some(retrieval) = &self.retrieval {
            if self.consent.is_granted(Capability::CloudReasoning) {
                for candidate in candidates.iter_mut() {
                    candidates::enrich(candidate, retrieval.as_ref()).await;
                }
            }
        }

        let ranked: Vec<RankedCandidate> = self
            .policy
            .rank(candidates)
            .into_iter()
            .map(|(candidate, expected_value)| RankedCandidate {
                candidate,
                expected_value,
            })
            .collect();

        self.consent.note(
            TimelineKind::PatternsMined,
            format!(
                "Mined {} patterns and {} causal links from {} events",
                patterns.len(),
                causal.len(),
                events.len()
            ),
            vec![Capability::BehavioralLogging.as_str().to_string()],
            None,
        );

        let snapshot = MiningSnapshot {
            mined_at: Utc::now(),
            events_considered: events.len(),
            patterns,
            causal,
            ranked,
        };
        *self.latest.write() = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Mine and propose the best new candidates
    pub async fn run_cycle(&self) -> Result<Vec<Decision>> {
        let Some(snapshot) = self.mine().await else {
            return Ok(Vec::new());
        };

        let limit = self.config.background.max_proposals_per_cycle;
        let (keys, fresh): (Vec<String>, Vec<CandidateAction>) = {
            let proposed = self.proposed_keys.read();
            let mut seen = HashSet::new();
            snapshot
                .ranked
                .into_iter()
                .map(|r| (suggestion_key(&r.candidate), r.candidate))
                .filter(|(key, _)| !proposed.contains(key) && seen.insert(key.clone()))
                .take(limit)
                .unzip()
        };
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let mut decisions = Vec::with_capacity(fresh.len());
        let results = self.synthesizer.propose_batch(fresh).await;
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                // Failed suggestions stay eligible for the next cycle
                Ok(decision) => {
                    self.proposed_keys.write().insert(key);
                    decisions.push(decision);
                }
                Err(e) if e.requires_user() => warn!("Proposal needs attention: {}", e),
                Err(e) => warn!("Proposal failed: {}", e),
            }
        }
        info!("Cycle proposed {} candidates", decisions.len());
        Ok(decisions)
    }

    /// Feed a real-world outcome back into every learner
    pub fn record_outcome(&self, proposal_id: Uuid, outcome: ActionOutcome) -> Result<()> {
        let proposal = self
            .synthesizer
            .proposal(proposal_id)
            .ok_or_else(|| AgentError::NotFound(format!("proposal {}", proposal_id)))?;
        let candidate = proposal.candidate;

        self.policy
            .train(&[PolicyObservation::new(&candidate, outcome.clone())]);

        let state = candidate
            .params
            .get(STATE_PARAM)
            .map(String::as_str)
            .unwrap_or("manual");
        self.rl
            .update_from_outcome(state, candidate.action_type, Reward::from_outcome(&outcome));
        self.sandbox.record_outcome(candidate.action_type, outcome.accepted);

        debug!("Outcome recorded for {}: accepted={}", proposal_id, outcome.accepted);
        Ok(())
    }

    pub fn report(&self) -> AgentReport {
        let latest = self.latest();
        AgentReport {
            generated_at: Utc::now(),
            consent: Capability::ALL
                .iter()
                .map(|&capability| ConsentStatus {
                    capability,
                    granted: self.consent.is_granted(capability),
                })
                .collect(),
            audit_trail: self.consent.audit_trail(),
            timeline: self.consent.timeline(100),
            observer: self.observer.stats(),
            patterns: latest.as_ref().map(|s| s.patterns.clone()).unwrap_or_default(),
            causal: latest.as_ref().map(|s| s.causal.clone()).unwrap_or_default(),
            ranked: latest.map(|s| s.ranked).unwrap_or_default(),
            proposals: self.synthesizer.proposals(),
            history: self.synthesizer.history().views(),
            policy_weights: self.policy.weights(),
            reinforcement: self.rl.statistics(),
        }
    }

    /// Seal the consent ledger into the configured store
    pub fn persist(&self) -> Result<()> {
        match &self.store {
            Some(store) => self.consent.save_ledger(store.as_ref()),
            None => Ok(()),
        }
    }

    /// Spawn the background mining loop
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let rx = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(background::run_continuous(self.clone(), rx)));
    }

    /// Stop the loop, wait for it, and persist consent
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        self.persist()?;
        info!("Agent shut down");
        Ok(())
    }
}

/// Identity of a suggestion across mining passes
fn suggestion_key(candidate: &CandidateAction) -> String {
    candidate
        .params
        .get(KEY_PARAM)
        .cloned()
        .unwrap_or_else(|| candidate.id.to_string())
}
