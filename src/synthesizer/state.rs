//! Proposal lifecycle
//!
//! ```text
//! Proposed -> SandboxTested -> AutoExecuted    -> Executed | Failed
//!                           -> PendingApproval -> Approved -> Executed | Failed
//!                                              -> Rejected
//!                           -> Rejected
//! Executed -> RolledBack
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Proposed,
    SandboxTested,
    /// Gate passed without the user; live execution in progress
    AutoExecuted,
    PendingApproval,
    /// Approved by the user; live execution in progress
    Approved,
    Rejected,
    Executed,
    RolledBack,
    /// Live execution failed and was restored
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionEvent {
    SandboxCompleted,
    GateAutoExecute,
    GateRequireApproval,
    GateReject,
    Withdraw,
    Approve,
    ExecutionSucceeded,
    ExecutionFailed,
    RollBack,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Proposed => "proposed",
            ActionState::SandboxTested => "sandbox_tested",
            ActionState::AutoExecuted => "auto_executed",
            ActionState::PendingApproval => "pending_approval",
            ActionState::Approved => "approved",
            ActionState::Rejected => "rejected",
            ActionState::Executed => "executed",
            ActionState::RolledBack => "rolled_back",
            ActionState::Failed => "failed",
        }
    }

    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Rejected | ActionState::RolledBack | ActionState::Failed
        )
    }

    pub fn next(self, event: ActionEvent) -> Result<ActionState> {
        use ActionEvent::*;
        use ActionState::*;

        let next = match (self, event) {
            (Proposed, SandboxCompleted) => SandboxTested,
            (SandboxTested, GateAutoExecute) => AutoExecuted,
            (SandboxTested, GateRequireApproval) => PendingApproval,
            (SandboxTested, GateReject) => Rejected,
            (PendingApproval, Withdraw) => Rejected,
            (PendingApproval, Approve) => Approved,
            (AutoExecuted | Approved, ExecutionSucceeded) => Executed,
            (AutoExecuted | Approved, ExecutionFailed) => Failed,
            (Executed, RollBack) => RolledBack,
            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: from.as_str().to_string(),
                    event: format!("{:?}", event),
                })
            }
        };
        Ok(next)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ActionEvent::*;
    use super::ActionState::*;
    use super::*;

    const ALL_STATES: [ActionState; 9] = [
        Proposed,
        SandboxTested,
        AutoExecuted,
        PendingApproval,
        Approved,
        Rejected,
        Executed,
        RolledBack,
        Failed,
    ];
    const ALL_EVENTS: [ActionEvent; 9] = [
        SandboxCompleted,
        GateAutoExecute,
        GateRequireApproval,
        GateReject,
        Withdraw,
        Approve,
        ExecutionSucceeded,
        ExecutionFailed,
        RollBack,
    ];

    #[test]
    fn test_happy_paths() {
        let auto = Proposed
            .next(SandboxCompleted)
            .and_then(|s| s.next(GateAutoExecute))
            .and_then(|s| s.next(ExecutionSucceeded))
            .and_then(|s| s.next(RollBack))
            .unwrap();
        assert_eq!(auto, RolledBack);

        let approved = SandboxTested
            .next(GateRequireApproval)
            .and_then(|s| s.next(Approve))
            .and_then(|s| s.next(ExecutionSucceeded))
            .unwrap();
        assert_eq!(approved, Executed);
    }

    #[test]
    fn test_withdraw_only_before_execution() {
        assert_eq!(PendingApproval.next(Withdraw).unwrap(), Rejected);
        assert!(Executed.next(Withdraw).is_err());
        assert!(AutoExecuted.next(Withdraw).is_err());
        assert!(Approved.next(Withdraw).is_err());
    }

    #[test]
    fn test_pending_must_be_approved_before_executing() {
        assert!(PendingApproval.next(ExecutionSucceeded).is_err());
        assert!(PendingApproval.next(ExecutionFailed).is_err());
        assert!(Approved.next(Approve).is_err());
    }

    #[test]
    fn test_rejected_cannot_execute() {
        assert!(matches!(
            Rejected.next(ExecutionSucceeded),
            Err(AgentError::InvalidTransition { .. })
        ));
        assert!(SandboxTested.next(ExecutionSucceeded).is_err());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for event in ALL_EVENTS {
                assert!(state.next(event).is_err(), "{:?} accepted {:?}", state, event);
            }
        }
    }

    #[test]
    fn test_transition_count() {
        let legal = ALL_STATES
            .iter()
            .flat_map(|s| ALL_EVENTS.iter().map(move |e| s.next(*e)))
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(legal, 11);
    }
}
