//! Auto-Action Synthesizer
//!
//! Runs each candidate through the sandbox and the gate, then either
//! executes it, parks it for approval, or rejects it:
//! - **State machine**: every proposal move is an explicit [`ActionEvent`]
//! - **Gate**: safe, low/medium risk, confident, and `AutoExecution` granted
//! - **History**: append-only record of executions with their undo
//! - **Locks**: overlapping resources serialize, unrelated actions run in parallel

mod history;
mod locks;
mod state;

pub use history::{ExecutedAction, ExecutedActionView, ExecutionHistory};
pub use locks::{ResourceGuard, ResourceLocks};
pub use state::{ActionEvent, ActionState};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::policy::{ActionSource, CandidateAction, DecisionPolicy, RiskCategory};
use crate::privacy::{Capability, ConsentKernel, TimelineKind};
use crate::sandbox::{SandboxResult, SandboxRunner, UndoFn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Minimum confidence for autonomous execution
    pub auto_execute_threshold: f64,
    /// Highest risk allowed to auto-execute; never above Medium
    pub max_auto_risk: RiskCategory,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            auto_execute_threshold: 0.85,
            max_auto_risk: RiskCategory::Medium,
        }
    }
}

impl SynthesizerConfig {
    fn auto_risk_ceiling(&self) -> RiskCategory {
        self.max_auto_risk.min(RiskCategory::Medium)
    }
}

/// Sandbox verdict kept on the proposal (the undo itself is not retained)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSummary {
    pub action_safe: bool,
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub side_effects: Vec<String>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl From<&SandboxResult> for SandboxSummary {
    fn from(r: &SandboxResult) -> Self {
        Self {
            action_safe: r.action_safe,
            quality_score: r.quality_score,
            errors: r.errors.clone(),
            warnings: r.warnings.clone(),
            side_effects: r.side_effects.clone(),
            timed_out: r.timed_out,
            duration_ms: r.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub candidate: CandidateAction,
    pub state: ActionState,
    pub expected_value: f64,
    pub sandbox: Option<SandboxSummary>,
    pub execution_id: Option<Uuid>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub proposal_id: Uuid,
    pub state: ActionState,
    pub expected_value: f64,
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub execution_id: Option<Uuid>,
    pub why: String,
}

pub struct AutoActionSynthesizer {
    config: SynthesizerConfig,
    consent: Arc<ConsentKernel>,
    policy: Arc<DecisionPolicy>,
    sandbox: Arc<SandboxRunner>,
    proposals: RwLock<HashMap<Uuid, Proposal>>,
    history: ExecutionHistory,
    locks: ResourceLocks,
}

impl AutoActionSynthesizer {
    pub fn new(
        config: SynthesizerConfig,
        consent: Arc<ConsentKernel>,
        policy: Arc<DecisionPolicy>,
        sandbox: Arc<SandboxRunner>,
    ) -> Self {
        Self {
            config,
            consent,
            policy,
            sandbox,
            proposals: RwLock::new(HashMap::new()),
            history: ExecutionHistory::new(),
            locks: ResourceLocks::new(),
        }
    }

    /// Sandbox-test `candidate` and route it through the gate
    pub async fn propose(&self, candidate: CandidateAction) -> Result<Decision> {
        let id = candidate.id;
        let expected_value = self.policy.score(&candidate);
        {
            let mut proposals = self.proposals.write();
            if let Some(existing) = proposals.get(&id) {
                return Err(AgentError::InvalidTransition {
                    from: existing.state.as_str().to_string(),
                    event: "propose".to_string(),
                });
            }
            let now = Utc::now();
            proposals.insert(
                id,
                Proposal {
                    id,
                    candidate: candidate.clone(),
                    state: ActionState::Proposed,
                    expected_value,
                    sandbox: None,
                    execution_id: None,
                    error: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        // Held through the sandbox run and any live execution
        let _guard = self.locks.acquire(&candidate.resources).await;

        let result = self.sandbox.run(&candidate).await;
        let summary = SandboxSummary::from(&result);
        self.update(id, |p| p.sandbox = Some(summary));
        self.transition(id, ActionEvent::SandboxCompleted)?;

        let mut decision = Decision {
            proposal_id: id,
            state: ActionState::SandboxTested,
            expected_value,
            quality_score: result.quality_score,
            errors: result.errors.clone(),
            execution_id: None,
            why: String::new(),
        };

        if !result.action_safe {
            decision.state = self.transition(id, ActionEvent::GateReject)?;
            decision.why = format!("Rejected: sandbox found it unsafe ({})", reasons(&result));
            info!("Proposal {} rejected: {}", id, decision.why);
            self.consent.note(
                TimelineKind::ActionRejected,
                format!("{}: {}", candidate.description, decision.why),
                candidate.resources.clone(),
                None,
            );
            return Ok(decision);
        }

        match self.auto_gate(&candidate) {
            Ok(()) => {
                self.transition(id, ActionEvent::GateAutoExecute)?;
                let why = format!(
                    "Auto-executed: confidence {:.2} >= {:.2}, risk {}, sandbox quality {:.2}; {}",
                    candidate.confidence,
                    self.config.auto_execute_threshold,
                    candidate.risk_category,
                    result.quality_score,
                    origin(&candidate)
                );
                let execution_id = self.execute_live(id, &candidate, why.clone()).await?;
                decision.state = ActionState::Executed;
                decision.execution_id = Some(execution_id);
                decision.why = why;
            }
            Err(reason) => {
                decision.state = self.transition(id, ActionEvent::GateRequireApproval)?;
                decision.why = format!("Awaiting approval: {}", reason);
                info!("Proposal {} pending approval: {}", id, reason);
            }
        }

        Ok(decision)
    }

    /// Propose several candidates concurrently; overlapping ones serialize on their locks
    pub async fn propose_batch(&self, candidates: Vec<CandidateAction>) -> Vec<Result<Decision>> {
        join_all(candidates.into_iter().map(|c| self.propose(c))).await
    }

    /// Explicit user approval of a pending proposal
    pub async fn approve(&self, proposal_id: Uuid) -> Result<Uuid> {
        let candidate = self.pending_candidate(proposal_id)?;
        let _guard = self.locks.acquire(&candidate.resources).await;

        // Fails if withdrawn while waiting for the locks; once Approved a
        // withdraw can no longer land
        self.transition(proposal_id, ActionEvent::Approve)?;
        let why = format!("Approved by user; {}", origin(&candidate));
        self.execute_live(proposal_id, &candidate, why).await
    }

    /// Cancel a pending approval. Refused once execution has started.
    pub fn withdraw(&self, proposal_id: Uuid) -> Result<()> {
        let state = self.transition(proposal_id, ActionEvent::Withdraw)?;
        info!("Proposal {} withdrawn ({})", proposal_id, state);
        if let Some(p) = self.proposal(proposal_id) {
            self.consent.note(
                TimelineKind::ActionRejected,
                format!("Withdrawn by user: {}", p.candidate.description),
                p.candidate.resources,
                None,
            );
        }
        Ok(())
    }

    /// Roll back the most recent still-executed action, if any
    pub async fn rollback_last(&self) -> Result<Option<Uuid>> {
        match self.history.last_executed() {
            Some(id) => self.rollback(id).await.map(|_| Some(id)),
            None => Ok(None),
        }
    }

    /// Undo an executed action. Rolling back twice is a no-op.
    pub async fn rollback(&self, execution_id: Uuid) -> Result<()> {
        let entry = self
            .history
            .get(execution_id)
            .ok_or_else(|| AgentError::NotFound(format!("execution {}", execution_id)))?;
        if entry.state == ActionState::RolledBack {
            return Ok(());
        }

        let _guard = self.locks.acquire(&entry.action.resources).await;
        let entry = match self.history.get(execution_id) {
            Some(e) if e.state == ActionState::RolledBack => return Ok(()),
            Some(e) => e,
            None => return Err(AgentError::NotFound(format!("execution {}", execution_id))),
        };

        // Under the locks so an overlapping execution cannot commit in between
        let dependents = self.history.dependents_of(execution_id);
        if !dependents.is_empty() {
            return Err(AgentError::NotRollbackable {
                action_id: execution_id,
                dependents,
            });
        }

        if let Err(e) = entry.undo_fn.invoke(self.sandbox.environment().as_ref()).await {
            let reason = e.to_string();
            warn!("Rollback of {} failed: {}", execution_id, reason);
            self.history.mark_rollback_failed(execution_id, &reason);
            return Err(AgentError::RollbackFailed {
                action_id: execution_id,
                reason,
            });
        }

        self.history.mark_rolled_back(execution_id);
        self.transition(entry.proposal_id, ActionEvent::RollBack)?;
        info!("Rolled back {} ({})", execution_id, entry.action.description);
        self.consent.note(
            TimelineKind::ActionRolledBack,
            format!("Rolled back: {}", entry.action.description),
            entry.action.resources.clone(),
            Some(format!("undo {}", execution_id)),
        );
        Ok(())
    }

    pub fn proposal(&self, id: Uuid) -> Option<Proposal> {
        self.proposals.read().get(&id).cloned()
    }

    /// All proposals, oldest first
    pub fn proposals(&self) -> Vec<Proposal> {
        let mut all: Vec<Proposal> = self.proposals.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn pending_approvals(&self) -> Vec<Proposal> {
        self.proposals()
            .into_iter()
            .filter(|p| p.state == ActionState::PendingApproval)
            .collect()
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Why a safe candidate may not run without the user
    fn auto_gate(&self, candidate: &CandidateAction) -> std::result::Result<(), String> {
        let ceiling = self.config.auto_risk_ceiling();
        if candidate.risk_category > ceiling {
            return Err(format!(
                "risk {} is above the auto-execute ceiling {}",
                candidate.risk_category, ceiling
            ));
        }
        if candidate.confidence < self.config.auto_execute_threshold {
            return Err(format!(
                "confidence {:.2} is below {:.2}",
                candidate.confidence, self.config.auto_execute_threshold
            ));
        }
        if !self.consent.is_granted(Capability::AutoExecution) {
            return Err("auto-execution consent not granted".to_string());
        }
        Ok(())
    }

    fn pending_candidate(&self, proposal_id: Uuid) -> Result<CandidateAction> {
        let proposal = self
            .proposal(proposal_id)
            .ok_or_else(|| AgentError::NotFound(format!("proposal {}", proposal_id)))?;
        // Validate without applying
        proposal.state.next(ActionEvent::Approve)?;
        Ok(proposal.candidate)
    }

    /// Real execution with a fresh live snapshot as undo. Caller holds the locks.
    async fn execute_live(&self, proposal_id: Uuid, candidate: &CandidateAction, why: String) -> Result<Uuid> {
        let env = self.sandbox.environment();

        let outcome = async {
            let snapshot = env.capture(&candidate.resources).await?.ok_or_else(|| {
                AgentError::ExecutionFailed {
                    action_id: proposal_id,
                    reason: "live state cannot be captured".to_string(),
                }
            })?;
            if let Err(e) = env.apply(candidate).await {
                if let Err(restore_err) = env.restore(&snapshot).await {
                    warn!("Restore after failed execution of {} failed: {}", proposal_id, restore_err);
                }
                return Err(e);
            }
            Ok::<_, AgentError>(snapshot)
        }
        .await;

        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Execution of {} failed: {}", proposal_id, e);
                let message = e.to_string();
                self.update(proposal_id, |p| p.error = Some(message.clone()));
                self.transition(proposal_id, ActionEvent::ExecutionFailed)?;
                return Err(match e {
                    AgentError::ExecutionFailed { .. } => e,
                    other => AgentError::ExecutionFailed {
                        action_id: proposal_id,
                        reason: other.to_string(),
                    },
                });
            }
        };

        let execution_id = Uuid::new_v4();
        self.history.push(ExecutedAction {
            id: execution_id,
            proposal_id,
            action: candidate.clone(),
            executed_at: Utc::now(),
            state: ActionState::Executed,
            rolled_back_at: None,
            why: why.clone(),
            undo_fn: UndoFn::new(snapshot),
            rollback_error: None,
        });
        self.update(proposal_id, |p| p.execution_id = Some(execution_id));
        self.transition(proposal_id, ActionEvent::ExecutionSucceeded)?;

        info!("Executed {} ({}): {}", execution_id, candidate.action_type, why);
        self.consent.note(
            TimelineKind::ActionExecuted,
            format!("{}: {}", candidate.description, why),
            candidate.resources.clone(),
            Some(format!("execution {}", execution_id)),
        );
        Ok(execution_id)
    }

    fn transition(&self, id: Uuid, event: ActionEvent) -> Result<ActionState> {
        let mut proposals = self.proposals.write();
        let proposal = proposals
            .get_mut(&id)
            .ok_or_else(|| AgentError::NotFound(format!("proposal {}", id)))?;
        let next = proposal.state.next(event)?;
        proposal.state = next;
        proposal.updated_at = Utc::now();
        Ok(next)
    }

    fn update<F: FnOnce(&mut Proposal)>(&self, id: Uuid, f: F) {
        if let Some(p) = self.proposals.write().get_mut(&id) {
            f(p);
        }
    }
}

fn reasons(result: &SandboxResult) -> String {
    if result.errors.is_empty() {
        format!("quality {:.2} below threshold", result.quality_score)
    } else {
        result.errors.join("; ")
    }
}

fn origin(candidate: &CandidateAction) -> String {
    let source = match &candidate.derived_from {
        ActionSource::Pattern { pattern_id } => format!("from pattern {}", pattern_id),
        ActionSource::Causal { cause, effect } => format!("because {} tends to lead to {}", cause, effect),
        ActionSource::Manual => "requested manually".to_string(),
    };
    if candidate.rationale.is_empty() {
        source
    } else {
        format!("{} ({})", candidate.rationale, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionType;
    use crate::sandbox::{MemoryEnvironment, SandboxConfig};
    use std::time::Duration;

    struct Fixture {
        consent: Arc<ConsentKernel>,
        env: Arc<MemoryEnvironment>,
        synth: AutoActionSynthesizer,
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryEnvironment::new())
    }

    fn fixture_with(env: MemoryEnvironment) -> Fixture {
        let consent = Arc::new(ConsentKernel::ephemeral());
        consent.grant(Capability::AutoExecution);
        let env = Arc::new(env);
        env.set("notifications", "on");
        env.set("calendar", "busy");
        let runner = Arc::new(SandboxRunner::new(SandboxConfig::default(), env.clone()));
        let synth = AutoActionSynthesizer::new(
            SynthesizerConfig::default(),
            consent.clone(),
            Arc::new(DecisionPolicy::new()),
            runner,
        );
        Fixture { consent, env, synth }
    }

    fn action(resource: &str, value: &str, confidence: f64, risk: RiskCategory) -> CandidateAction {
        CandidateAction::new(ActionType::FocusMode, "quiet hours", confidence)
            .with_risk(risk)
            .with_resource(resource)
            .with_param("value", value)
    }

    #[tokio::test]
    async fn test_confident_low_risk_auto_executes() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::Executed);
        assert!(d.execution_id.is_some());
        assert!(d.why.starts_with("Auto-executed"));
        assert_eq!(f.env.get("notifications").as_deref(), Some("off"));
    }

    #[tokio::test]
    async fn test_critical_never_auto_executes() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("notifications", "off", 1.0, RiskCategory::Critical))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::PendingApproval);
        assert_eq!(f.env.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_config_cannot_raise_ceiling_above_medium() {
        let consent = Arc::new(ConsentKernel::ephemeral());
        consent.grant(Capability::AutoExecution);
        let env = Arc::new(MemoryEnvironment::new());
        let synth = AutoActionSynthesizer::new(
            SynthesizerConfig {
                max_auto_risk: RiskCategory::Critical,
                ..SynthesizerConfig::default()
            },
            consent,
            Arc::new(DecisionPolicy::new()),
            Arc::new(SandboxRunner::new(SandboxConfig::default(), env)),
        );
        let d = synth
            .propose(action("x", "y", 1.0, RiskCategory::High))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::PendingApproval);
    }

    #[tokio::test]
    async fn test_without_consent_needs_approval() {
        let f = fixture();
        f.consent.revoke(Capability::AutoExecution, None);
        let d = f
            .synth
            .propose(action("notifications", "off", 0.99, RiskCategory::Low))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::PendingApproval);

        let exec = f.synth.approve(d.proposal_id).await.unwrap();
        assert_eq!(f.env.get("notifications").as_deref(), Some("off"));
        assert_eq!(
            f.synth.proposal(d.proposal_id).unwrap().execution_id,
            Some(exec)
        );
    }

    #[tokio::test]
    async fn test_unsafe_is_rejected_and_cannot_be_approved() {
        let f = fixture();
        f.env.mark_irreversible("email:outbox");
        let d = f
            .synth
            .propose(action("email:outbox", "sent", 0.99, RiskCategory::Low))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::Rejected);
        assert!(matches!(
            f.synth.approve(d.proposal_id).await,
            Err(AgentError::InvalidTransition { .. })
        ));
        assert!(f.synth.history().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("calendar", "free", 0.5, RiskCategory::Low))
            .await
            .unwrap();
        f.synth.withdraw(d.proposal_id).unwrap();
        assert_eq!(f.synth.proposal(d.proposal_id).unwrap().state, ActionState::Rejected);
        assert!(f.synth.approve(d.proposal_id).await.is_err());
        assert!(f.synth.withdraw(d.proposal_id).is_err());
    }

    #[tokio::test]
    async fn test_withdraw_refused_once_approved_execution_started() {
        let f = fixture_with(MemoryEnvironment::new().with_latency(Duration::from_millis(50)));
        let d = f
            .synth
            .propose(action("notifications", "off", 0.5, RiskCategory::Low))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::PendingApproval);

        let (approved, withdrawn) = tokio::join!(f.synth.approve(d.proposal_id), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            f.synth.withdraw(d.proposal_id)
        });

        assert!(matches!(withdrawn, Err(AgentError::InvalidTransition { .. })));
        let exec = approved.unwrap();
        let p = f.synth.proposal(d.proposal_id).unwrap();
        assert_eq!(p.state, ActionState::Executed);
        assert_eq!(p.execution_id, Some(exec));
        assert_eq!(f.env.get("notifications").as_deref(), Some("off"));
        assert_eq!(f.synth.history().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_rechecks_dependents_after_waiting() {
        let f = fixture_with(MemoryEnvironment::new().with_latency(Duration::from_millis(50)));
        let first = f
            .synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        let a = first.execution_id.unwrap();

        // The second proposal holds the lock when the rollback arrives
        let (second, rolled_back) = tokio::join!(
            f.synth.propose(action("notifications", "dnd", 0.95, RiskCategory::Low)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                f.synth.rollback(a).await
            }
        );

        let b = second.unwrap().execution_id.unwrap();
        match rolled_back {
            Err(AgentError::NotRollbackable { action_id, dependents }) => {
                assert_eq!(action_id, a);
                assert_eq!(dependents, vec![b]);
            }
            other => panic!("expected NotRollbackable, got {:?}", other),
        }
        assert_eq!(f.env.get("notifications").as_deref(), Some("dnd"));
        assert_eq!(f.synth.history().get(a).unwrap().state, ActionState::Executed);
        assert_eq!(f.synth.history().get(b).unwrap().state, ActionState::Executed);
    }

    #[tokio::test]
    async fn test_rollback_idempotent() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        let exec = d.execution_id.unwrap();

        f.synth.rollback(exec).await.unwrap();
        assert_eq!(f.env.get("notifications").as_deref(), Some("on"));
        f.synth.rollback(exec).await.unwrap();
        assert_eq!(f.env.get("notifications").as_deref(), Some("on"));
        assert_eq!(f.synth.history().get(exec).unwrap().state, ActionState::RolledBack);
        assert_eq!(f.synth.proposal(d.proposal_id).unwrap().state, ActionState::RolledBack);
    }

    #[tokio::test]
    async fn test_rollback_blocked_by_dependent() {
        let f = fixture();
        let first = f
            .synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        let second = f
            .synth
            .propose(action("notifications", "dnd", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        let (a, b) = (first.execution_id.unwrap(), second.execution_id.unwrap());

        match f.synth.rollback(a).await {
            Err(AgentError::NotRollbackable { dependents, .. }) => assert_eq!(dependents, vec![b]),
            other => panic!("expected NotRollbackable, got {:?}", other),
        }

        assert_eq!(f.synth.rollback_last().await.unwrap(), Some(b));
        assert_eq!(f.synth.rollback_last().await.unwrap(), Some(a));
        assert_eq!(f.synth.rollback_last().await.unwrap(), None);
        assert_eq!(f.env.get("notifications").as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_executed() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        let exec = d.execution_id.unwrap();

        f.env.mark_restore_failing("notifications");
        assert!(matches!(
            f.synth.rollback(exec).await,
            Err(AgentError::RollbackFailed { .. })
        ));
        let entry = f.synth.history().get(exec).unwrap();
        assert_eq!(entry.state, ActionState::Executed);
        assert!(entry.rollback_error.is_some());

        f.env.clear_restore_failing("notifications");
        f.synth.rollback(exec).await.unwrap();
        assert_eq!(f.synth.history().get(exec).unwrap().state, ActionState::RolledBack);
    }

    #[tokio::test]
    async fn test_live_failure_ends_failed() {
        let f = fixture();
        let d = f
            .synth
            .propose(action("calendar", "free", 0.5, RiskCategory::Low))
            .await
            .unwrap();
        assert_eq!(d.state, ActionState::PendingApproval);

        f.env.mark_failing("calendar");
        assert!(matches!(
            f.synth.approve(d.proposal_id).await,
            Err(AgentError::ExecutionFailed { .. })
        ));
        let p = f.synth.proposal(d.proposal_id).unwrap();
        assert_eq!(p.state, ActionState::Failed);
        assert!(p.error.is_some());
        assert_eq!(f.env.get("calendar").as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn test_batch_runs_all() {
        let f = fixture();
        let results = f
            .synth
            .propose_batch(vec![
                action("notifications", "off", 0.95, RiskCategory::Low),
                action("calendar", "free", 0.95, RiskCategory::Low),
                action("notifications", "dnd", 0.5, RiskCategory::Low),
            ])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(f.synth.history().len(), 2);
        assert_eq!(f.synth.pending_approvals().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_proposal_rejected() {
        let f = fixture();
        let c = action("calendar", "free", 0.5, RiskCategory::Low);
        f.synth.propose(c.clone()).await.unwrap();
        assert!(f.synth.propose(c).await.is_err());
    }

    #[tokio::test]
    async fn test_timeline_records_execution() {
        let f = fixture();
        f.synth
            .propose(action("notifications", "off", 0.95, RiskCategory::Low))
            .await
            .unwrap();
        assert!(f
            .consent
            .timeline(10)
            .iter()
            .any(|e| e.kind == TimelineKind::ActionExecuted));
    }
}
