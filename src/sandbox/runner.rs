//! Sandbox runner
//!
//! Every candidate is tried against an isolated copy of the environment:
//! capture, apply, then verify the inverse by restoring inside the copy.
//! A missing inverse, an error, a timeout or a low quality score all make
//! the attempt unsafe. Failures are reported in the result, never raised.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::environment::{ApplyReport, Environment, Snapshot};
use crate::error::{AgentError, Result};
use crate::policy::{ActionType, CandidateAction};

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Hard limit for one sandbox attempt
    pub timeout_ms: u64,
    /// Minimum quality score for a safe verdict
    pub min_quality: f64,
    /// Maximum resources one action may touch
    pub max_resources: usize,
    /// Resources no action may touch
    pub blocked_resources: HashSet<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            min_quality: 0.6,
            max_resources: 16,
            blocked_resources: default_blocked_resources(),
        }
    }
}

impl SandboxConfig {
    /// Short timeout, higher quality bar, few resources per action
    pub fn strict() -> Self {
        Self {
            timeout_ms: 1_000,
            min_quality: 0.75,
            max_resources: 4,
            blocked_resources: default_blocked_resources(),
        }
    }

    /// For slow hosts and trusted action sets
    pub fn relaxed() -> Self {
        Self {
            timeout_ms: 30_000,
            min_quality: 0.5,
            max_resources: 64,
            blocked_resources: HashSet::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_blocked_resources() -> HashSet<String> {
    ["system:credentials", "system:boot", "system:firewall", "system:users"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Pre-flight check of a candidate against the config
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub allowed: bool,
    pub blocked_reasons: Vec<String>,
    pub warnings: Vec<String>,
}

/// Opaque inverse operation: restores a captured snapshot
#[derive(Debug, Clone)]
pub struct UndoFn {
    snapshot: Snapshot,
}

impl UndoFn {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn resources(&self) -> impl Iterator<Item = &String> {
        self.snapshot.resources.keys()
    }

    pub async fn invoke(&self, env: &dyn Environment) -> Result<()> {
        env.restore(&self.snapshot).await
    }
}

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub action_safe: bool,
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub side_effects: Vec<String>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub undo_fn: Option<UndoFn>,
}

impl SandboxResult {
    fn unsafe_with(error: String, warnings: Vec<String>, started: Instant) -> Self {
        Self {
            action_safe: false,
            quality_score: 0.0,
            errors: vec![error],
            warnings,
            side_effects: Vec::new(),
            timed_out: false,
            duration_ms: started.elapsed().as_millis() as u64,
            undo_fn: None,
        }
    }
}

/// Accepted / total outcomes per action type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeHistory {
    counts: HashMap<ActionType, (u64, u64)>,
}

impl OutcomeHistory {
    pub fn record(&mut self, action_type: ActionType, accepted: bool) {
        let entry = self.counts.entry(action_type).or_insert((0, 0));
        if accepted {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    /// Laplace-smoothed acceptance rate; 0.5 with no history
    pub fn acceptance(&self, action_type: ActionType) -> f64 {
        let (accepted, total) = self.counts.get(&action_type).copied().unwrap_or((0, 0));
        (accepted as f64 + 1.0) / (total as f64 + 2.0)
    }
}

enum Attempt {
    NoInverse,
    Completed {
        snapshot: Snapshot,
        report: ApplyReport,
        undo_verified: bool,
    },
}

pub struct SandboxRunner {
    config: SandboxConfig,
    env: Arc<dyn Environment>,
    history: RwLock<OutcomeHistory>,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig, env: Arc<dyn Environment>) -> Self {
        info!(
            "Sandbox runner ready (timeout {}ms, min quality {:.2})",
            config.timeout_ms, config.min_quality
        );
        Self {
            config,
            env,
            history: RwLock::new(OutcomeHistory::default()),
        }
    }

    /// The live environment real executions go to
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.env
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn record_outcome(&self, action_type: ActionType, accepted: bool) {
        self.history.write().record(action_type, accepted);
    }

    pub fn acceptance(&self, action_type: ActionType) -> f64 {
        self.history.read().acceptance(action_type)
    }

    pub fn validate(&self, candidate: &CandidateAction) -> ValidationResult {
        let mut blocked_reasons = Vec::new();
        let mut warnings = Vec::new();

        for resource in &candidate.resources {
            if self.config.blocked_resources.contains(resource) {
                blocked_reasons.push(format!("Resource '{}' is blocked", resource));
            }
        }
        if candidate.resources.len() > self.config.max_resources {
            blocked_reasons.push(format!(
                "Action touches {} resources (max {})",
                candidate.resources.len(),
                self.config.max_resources
            ));
        }
        if candidate.resources.is_empty() {
            warnings.push("Action declares no resources".to_string());
        }

        ValidationResult {
            allowed: blocked_reasons.is_empty(),
            blocked_reasons,
            warnings,
        }
    }

    /// Try `candidate` in isolation and report whether real execution is safe
    pub async fn run(&self, candidate: &CandidateAction) -> SandboxResult {
        let started = Instant::now();

        let validation = self.validate(candidate);
        if !validation.allowed {
            warn!("Sandbox blocked {}: {:?}", candidate.id, validation.blocked_reasons);
            return SandboxResult {
                errors: validation.blocked_reasons,
                ..SandboxResult::unsafe_with(String::new(), validation.warnings, started)
            };
        }

        let sandbox = match self.env.isolate().await {
            Ok(env) => env,
            Err(e) => {
                return SandboxResult::unsafe_with(
                    format!("isolation failed: {}", e),
                    validation.warnings,
                    started,
                )
            }
        };

        let attempt = tokio::time::timeout(self.config.timeout(), async {
            let Some(snapshot) = sandbox.capture(&candidate.resources).await? else {
                return Ok::<_, AgentError>(Attempt::NoInverse);
            };
            let report = sandbox.apply(candidate).await?;
            sandbox.restore(&snapshot).await?;
            let restored = sandbox.capture(&candidate.resources).await?;
            let undo_verified = restored.map(|r| r.same_state(&snapshot)).unwrap_or(false);
            Ok::<_, AgentError>(Attempt::Completed {
                snapshot,
                report,
                undo_verified,
            })
        })
        .await;

        let mut warnings = validation.warnings;
        let result = match attempt {
            Err(_) => {
                let err = AgentError::SandboxTimeout(self.config.timeout());
                warn!("Sandbox run for {} timed out", candidate.id);
                SandboxResult {
                    timed_out: true,
                    ..SandboxResult::unsafe_with(err.to_string(), warnings, started)
                }
            }
            Ok(Err(e)) => {
                warn!("Sandbox run for {} failed: {}", candidate.id, e);
                SandboxResult::unsafe_with(e.to_string(), warnings, started)
            }
            Ok(Ok(Attempt::NoInverse)) => SandboxResult::unsafe_with(
                "no inverse operation: resource state cannot be captured".to_string(),
                warnings,
                started,
            ),
            Ok(Ok(Attempt::Completed {
                snapshot,
                report,
                undo_verified,
            })) => {
                let mut errors = Vec::new();
                if !undo_verified {
                    errors.push("undo verification failed: state differs after restore".to_string());
                }
                let fidelity = if undo_verified { 1.0 } else { 0.0 };
                let quality = 0.5 * self.acceptance(candidate.action_type) + 0.5 * fidelity;
                warnings.extend(report.warnings);

                let undo_fn = undo_verified.then(|| UndoFn::new(snapshot));
                SandboxResult {
                    action_safe: errors.is_empty()
                        && quality >= self.config.min_quality
                        && undo_fn.is_some(),
                    quality_score: quality,
                    errors,
                    warnings,
                    side_effects: report.side_effects,
                    timed_out: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                    undo_fn,
                }
            }
        };

        debug!(
            "Sandbox verdict for {} ({}): safe={} quality={:.2} in {}ms",
            candidate.id,
            candidate.action_type,
            result.action_safe,
            result.quality_score,
            result.duration_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::MemoryEnvironment;

    fn runner(env: MemoryEnvironment, config: SandboxConfig) -> (Arc<MemoryEnvironment>, SandboxRunner) {
        let env = Arc::new(env);
        let runner = SandboxRunner::new(config, env.clone());
        (env, runner)
    }

    fn focus_action() -> CandidateAction {
        CandidateAction::new(ActionType::FocusMode, "silence notifications", 0.9)
            .with_resource("notifications")
            .with_param("value", "off")
    }

    #[tokio::test]
    async fn test_safe_run_leaves_live_untouched() {
        let live = MemoryEnvironment::new();
        live.set("notifications", "on");
        let (env, runner) = runner(live, SandboxConfig::default());

        let result = runner.run(&focus_action()).await;
        assert!(result.action_safe, "errors: {:?}", result.errors);
        assert!((result.quality_score - 0.75).abs() < 1e-9);
        assert!(result.undo_fn.is_some());
        assert_eq!(result.side_effects.len(), 1);
        assert_eq!(env.get("notifications").as_deref(), Some("on"));
        assert_eq!(env.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_no_inverse_is_unsafe() {
        let live = MemoryEnvironment::new();
        live.mark_irreversible("notifications");
        let (_env, runner) = runner(live, SandboxConfig::default());

        let result = runner.run(&focus_action()).await;
        assert!(!result.action_safe);
        assert!(result.undo_fn.is_none());
    }

    #[tokio::test]
    async fn test_apply_error_is_unsafe() {
        let live = MemoryEnvironment::new();
        live.mark_failing("notifications");
        let (_env, runner) = runner(live, SandboxConfig::default());

        let result = runner.run(&focus_action()).await;
        assert!(!result.action_safe);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_unsafe() {
        let live = MemoryEnvironment::new().with_latency(Duration::from_millis(200));
        let config = SandboxConfig {
            timeout_ms: 20,
            ..SandboxConfig::default()
        };
        let (_env, runner) = runner(live, config);

        let result = runner.run(&focus_action()).await;
        assert!(result.timed_out);
        assert!(!result.action_safe);
    }

    #[tokio::test]
    async fn test_blocked_resource() {
        let (_env, runner) = runner(MemoryEnvironment::new(), SandboxConfig::default());
        let action = focus_action().with_resource("system:credentials");
        let result = runner.run(&action).await;
        assert!(!result.action_safe);
        assert!(result.errors[0].contains("system:credentials"));
    }

    #[tokio::test]
    async fn test_history_lowers_quality() {
        let (_env, runner) = runner(MemoryEnvironment::new(), SandboxConfig::default());
        for _ in 0..8 {
            runner.record_outcome(ActionType::FocusMode, false);
        }
        let result = runner.run(&focus_action()).await;
        assert!(result.quality_score < 0.6);
        assert!(!result.action_safe);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_undo_fn_restores_live() {
        let live = MemoryEnvironment::new();
        live.set("notifications", "on");
        let (env, runner) = runner(live, SandboxConfig::default());

        let action = focus_action();
        let undo = runner.run(&action).await.undo_fn.unwrap();
        env.apply(&action).await.unwrap();
        assert_eq!(env.get("notifications").as_deref(), Some("off"));
        undo.invoke(env.as_ref()).await.unwrap();
        assert_eq!(env.get("notifications").as_deref(), Some("on"));
    }
}
