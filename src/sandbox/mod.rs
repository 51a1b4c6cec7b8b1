//! Sandbox Runner
//!
//! Isolated, reversible trial runs of candidate actions:
//! - **Environment**: host integration boundary plus an in-memory implementation
//! - **Runner**: capture, apply, verify undo, score quality, enforce timeout

mod environment;
mod runner;

pub use environment::{ApplyReport, Environment, MemoryEnvironment, Snapshot};
pub use runner::{OutcomeHistory, SandboxConfig, SandboxResult, SandboxRunner, UndoFn, ValidationResult};
