//! Error taxonomy
//!
//! One error type for the whole core. Capture-path and mining-path code logs
//! and skips these; execution-path code always returns them to the caller.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::privacy::Capability;

/// Core errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// Capability not granted in the consent kernel
    #[error("Consent denied for capability '{0}'")]
    ConsentDenied(Capability),

    /// Ciphertext could not be opened (wrong key, wrong key ref, corruption)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Sandbox attempt exceeded its time budget
    #[error("Sandbox timed out after {0:?}")]
    SandboxTimeout(Duration),

    #[error("Sandbox error: {0}")]
    SandboxError(String),

    /// Live execution failed; the pre-execution snapshot was restored if possible
    #[error("Execution failed for action {action_id}: {reason}")]
    ExecutionFailed { action_id: Uuid, reason: String },

    /// Undo could not be applied; the action stays Executed and needs the user
    #[error("Rollback failed for action {action_id}: {reason}")]
    RollbackFailed { action_id: Uuid, reason: String },

    /// A later executed action depends on the same resources
    #[error("Action {action_id} cannot be rolled back: superseded by {dependents:?}")]
    NotRollbackable { action_id: Uuid, dependents: Vec<Uuid> },

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audit trail integrity check failed at record {0}")]
    AuditTampered(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Errors the caller can recover from without user intervention
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AgentError::RollbackFailed { .. } | AgentError::AuditTampered(_)
        )
    }

    /// Errors that must be shown to the user
    pub fn requires_user(&self) -> bool {
        matches!(
            self,
            AgentError::RollbackFailed { .. }
                | AgentError::ConsentDenied(_)
                | AgentError::AuditTampered(_)
        )
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_failed_needs_user() {
        let err = AgentError::RollbackFailed {
            action_id: Uuid::nil(),
            reason: "disk full".to_string(),
        };
        assert!(err.requires_user());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_not_rollbackable_is_recoverable() {
        let err = AgentError::NotRollbackable {
            action_id: Uuid::nil(),
            dependents: vec![Uuid::nil()],
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("cannot be rolled back"));
    }

    #[test]
    fn test_consent_denied_message() {
        let err = AgentError::ConsentDenied(Capability::AutoExecution);
        assert_eq!(err.to_string(), "Consent denied for capability 'auto_execution'");
    }
}
