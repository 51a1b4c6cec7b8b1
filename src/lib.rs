//! Athenos Core
//!
//! Consent-gated behavior observation, pattern mining and reversible
//! auto-actions for a single user's desktop.
//!
//! # Features
//!
//! - **Consent Kernel**: per-capability grants, hash-chained audit trail, AES-GCM sealing
//! - **Event Observer**: bounded ring buffer that refuses capture without consent
//! - **Pattern Miner**: workflow sequences, context-switch bursts, debugging loops, causal links
//! - **Decision Policy**: linear expected-value scoring trained from outcomes, ε-greedy action choice
//! - **Sandbox Runner**: isolated trial with timeout, undo verification and quality score
//! - **Auto-Action Synthesizer**: explicit state machine, per-resource locks, rollback
//! - **Transparency**: timeline and report of everything observed and done
//!
//! # Architecture
//!
//! ```text
//! events ──► Observer ──► Miner ──► candidates ──► Policy (rank)
//!               ▲                                     │
//!               │                                     ▼
//!         ConsentKernel ◄──────────────────── Synthesizer ──► Sandbox
//!      (grants, audit, vault,                     │
//!         timeline)                               ├── auto-execute
//!                                                 ├── pending approval
//!                                                 └── rollback (undo)
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observer;
pub mod pattern;
pub mod policy;
pub mod privacy;
pub mod report;
pub mod sandbox;
pub mod synthesizer;

pub use agent::{Agent, BackgroundConfig, MiningSnapshot, RankedCandidate, RetrievalService};
pub use config::Config;
pub use error::{AgentError, Result};
pub use observer::{EventKind, EventObserver, ObservedEvent, ObserverConfig};
pub use pattern::{CausalRelationship, MinerConfig, Pattern, PatternKind, PatternMiner};
pub use policy::{
    ActionOutcome, ActionType, CandidateAction, DecisionPolicy, PolicyConfig, ReinforcementPolicy,
    RiskCategory,
};
pub use privacy::{Capability, ConsentKernel, FileStore, MemoryStore, SecureStore};
pub use report::AgentReport;
pub use sandbox::{Environment, MemoryEnvironment, SandboxConfig, SandboxResult, SandboxRunner};
pub use synthesizer::{ActionState, AutoActionSynthesizer, Decision, SynthesizerConfig};
