//! Append-only execution history

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::ActionState;
use crate::policy::CandidateAction;
use crate::sandbox::UndoFn;

#[derive(Debug, Clone)]
pub struct ExecutedAction {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub action: CandidateAction,
    pub executed_at: DateTime<Utc>,
    /// `Executed` or `RolledBack`
    pub state: ActionState,
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Human-readable reason the action ran
    pub why: String,
    pub undo_fn: UndoFn,
    /// Last failed rollback attempt
    pub rollback_error: Option<String>,
}

/// Serializable view of an [`ExecutedAction`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedActionView {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub action_type: String,
    pub description: String,
    pub resources: Vec<String>,
    pub executed_at: DateTime<Utc>,
    pub state: ActionState,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub why: String,
    pub rollback_error: Option<String>,
}

impl From<&ExecutedAction> for ExecutedActionView {
    fn from(entry: &ExecutedAction) -> Self {
        Self {
            id: entry.id,
            proposal_id: entry.proposal_id,
            action_type: entry.action.action_type.as_str().to_string(),
            description: entry.action.description.clone(),
            resources: entry.action.resources.clone(),
            executed_at: entry.executed_at,
            state: entry.state,
            rolled_back_at: entry.rolled_back_at,
            why: entry.why.clone(),
            rollback_error: entry.rollback_error.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionHistory {
    entries: RwLock<Vec<ExecutedAction>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: ExecutedAction) {
        self.entries.write().push(entry);
    }

    pub fn get(&self, id: Uuid) -> Option<ExecutedAction> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// Most recent entry still in `Executed`
    pub fn last_executed(&self) -> Option<Uuid> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.state == ActionState::Executed)
            .map(|e| e.id)
    }

    /// Later, still-executed entries touching any of `id`'s resources
    pub fn dependents_of(&self, id: Uuid) -> Vec<Uuid> {
        let entries = self.entries.read();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Vec::new();
        };
        let target = &entries[pos].action;
        entries[pos + 1..]
            .iter()
            .filter(|e| e.state == ActionState::Executed && e.action.overlaps(target))
            .map(|e| e.id)
            .collect()
    }

    pub fn mark_rolled_back(&self, id: Uuid) {
        if let Some(entry) = self.entries.write().iter_mut().find(|e| e.id == id) {
            entry.state = ActionState::RolledBack;
            entry.rolled_back_at = Some(Utc::now());
            entry.rollback_error = None;
        }
    }

    pub fn mark_rollback_failed(&self, id: Uuid, reason: &str) {
        if let Some(entry) = self.entries.write().iter_mut().find(|e| e.id == id) {
            entry.rollback_error = Some(reason.to_string());
        }
    }

    pub fn views(&self) -> Vec<ExecutedActionView> {
        self.entries.read().iter().map(ExecutedActionView::from).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionType;
    use crate::sandbox::Snapshot;
    use std::collections::BTreeMap;

    fn entry(resources: &[&str]) -> ExecutedAction {
        let mut action = CandidateAction::new(ActionType::FocusMode, "focus", 0.9);
        for r in resources {
            action = action.with_resource(r);
        }
        ExecutedAction {
            id: Uuid::new_v4(),
            proposal_id: action.id,
            action,
            executed_at: Utc::now(),
            state: ActionState::Executed,
            rolled_back_at: None,
            why: "test".to_string(),
            undo_fn: UndoFn::new(Snapshot::new(BTreeMap::new())),
            rollback_error: None,
        }
    }

    #[test]
    fn test_dependents_only_later_and_overlapping() {
        let history = ExecutionHistory::new();
        let first = entry(&["calendar"]);
        let unrelated = entry(&["notifications"]);
        let dependent = entry(&["calendar", "status"]);
        let (a, b, c) = (first.id, unrelated.id, dependent.id);
        history.push(first);
        history.push(unrelated);
        history.push(dependent);

        assert_eq!(history.dependents_of(a), vec![c]);
        assert!(history.dependents_of(b).is_empty());
        assert!(history.dependents_of(c).is_empty());

        history.mark_rolled_back(c);
        assert!(history.dependents_of(a).is_empty());
        assert_eq!(history.last_executed(), Some(b));
    }

    #[test]
    fn test_rollback_keeps_record() {
        let history = ExecutionHistory::new();
        let e = entry(&["calendar"]);
        let id = e.id;
        history.push(e);
        history.mark_rolled_back(id);
        assert_eq!(history.len(), 1);
        let stored = history.get(id).unwrap();
        assert_eq!(stored.state, ActionState::RolledBack);
        assert!(stored.rolled_back_at.is_some());
    }
}
