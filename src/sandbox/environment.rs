//! Execution environments
//!
//! The host implements [`Environment`] for whatever the agent acts on
//! (notification settings, calendar, window layout). [`MemoryEnvironment`]
//! is a resource map used for simulation and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::policy::CandidateAction;

/// Captured state of a set of resources; `None` means the resource did not exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub resources: BTreeMap<String, Option<String>>,
}

impl Snapshot {
    pub fn new(resources: BTreeMap<String, Option<String>>) -> Self {
        Self {
            taken_at: Utc::now(),
            resources,
        }
    }

    /// Same resource state, ignoring capture time
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.resources == other.resources
    }
}

/// What applying an action changed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub side_effects: Vec<String>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait Environment: Send + Sync {
    /// Capture the given resources. `Ok(None)` when any of them cannot be
    /// captured, i.e. no inverse operation exists.
    async fn capture(&self, resources: &[String]) -> Result<Option<Snapshot>>;

    async fn apply(&self, action: &CandidateAction) -> Result<ApplyReport>;

    async fn restore(&self, snapshot: &Snapshot) -> Result<()>;

    /// Independent copy for sandbox runs; changes never reach `self`
    async fn isolate(&self) -> Result<Box<dyn Environment>>;
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    values: BTreeMap<String, String>,
    irreversible: HashSet<String>,
    failing: HashSet<String>,
    restore_failing: HashSet<String>,
    applied: u64,
}

/// In-memory resource map
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    state: RwLock<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps this long first
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set(&self, resource: &str, value: &str) {
        self.state
            .write()
            .values
            .insert(resource.to_string(), value.to_string());
    }

    pub fn get(&self, resource: &str) -> Option<String> {
        self.state.read().values.get(resource).cloned()
    }

    /// Resource that cannot be captured (no undo possible)
    pub fn mark_irreversible(&self, resource: &str) {
        self.state.write().irreversible.insert(resource.to_string());
    }

    /// Resource whose modification always fails
    pub fn mark_failing(&self, resource: &str) {
        self.state.write().failing.insert(resource.to_string());
    }

    pub fn clear_failing(&self, resource: &str) {
        self.state.write().failing.remove(resource);
    }

    /// Resource whose restore always fails
    pub fn mark_restore_failing(&self, resource: &str) {
        self.state.write().restore_failing.insert(resource.to_string());
    }

    pub fn clear_restore_failing(&self, resource: &str) {
        self.state.write().restore_failing.remove(resource);
    }

    /// Number of successful apply calls against this environment
    pub fn applied_count(&self) -> u64 {
        self.state.read().applied
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Environment for MemoryEnvironment {
    async fn capture(&self, resources: &[String]) -> Result<Option<Snapshot>> {
        self.delay().await;
        let state = self.state.read();
        if resources.iter().any(|r| state.irreversible.contains(r)) {
            return Ok(None);
        }
        let captured = resources
            .iter()
            .map(|r| (r.clone(), state.values.get(r).cloned()))
            .collect();
        Ok(Some(Snapshot::new(captured)))
    }

    async fn apply(&self, action: &CandidateAction) -> Result<ApplyReport> {
        self.delay().await;
        let mut state = self.state.write();

        if let Some(bad) = action.resources.iter().find(|r| state.failing.contains(*r)) {
            return Err(AgentError::ExecutionFailed {
                action_id: action.id,
                reason: format!("resource '{}' rejected the change", bad),
            });
        }

        let value = action
            .params
            .get("value")
            .cloned()
            .unwrap_or_else(|| format!("{}:{}", action.action_type, action.id));

        let mut report = ApplyReport::default();
        for resource in &action.resources {
            match state.values.insert(resource.clone(), value.clone()) {
                Some(previous) => report
                    .side_effects
                    .push(format!("{}: '{}' -> '{}'", resource, previous, value)),
                None => {
                    report.side_effects.push(format!("{}: created '{}'", resource, value));
                    report
                        .warnings
                        .push(format!("{} did not exist before this action", resource));
                }
            }
        }
        state.applied += 1;
        debug!("Applied {} to {} resources", action.action_type, action.resources.len());
        Ok(report)
    }

    async fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        self.delay().await;
        let mut state = self.state.write();

        if let Some(bad) = snapshot
            .resources
            .keys()
            .find(|r| state.restore_failing.contains(*r))
        {
            return Err(AgentError::SandboxError(format!(
                "resource '{}' could not be restored",
                bad
            )));
        }

        for (resource, value) in &snapshot.resources {
            match value {
                Some(v) => {
                    state.values.insert(resource.clone(), v.clone());
                }
                None => {
                    state.values.remove(resource);
                }
            }
        }
        Ok(())
    }

    async fn isolate(&self) -> Result<Box<dyn Environment>> {
        let copy = self.state.read().clone();
        Ok(Box::new(MemoryEnvironment {
            state: RwLock::new(MemoryState { applied: 0, ..copy }),
            latency: self.latency,
        }))
    }
}
