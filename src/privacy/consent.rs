//! Consent Ledger
//!
//! Per-capability consent, stored as an append-only, hash-chained list of
//! records. The current state of a capability is its latest record; a
//! capability with no record is not granted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{AgentError, Result};

/// Permission domain gating a class of capture or action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// App/window usage events
    BehavioralLogging,
    /// Affect signals derived from typing cadence, error bursts, etc.
    EmotionalSensing,
    /// Sending derived data to a remote reasoning provider
    CloudReasoning,
    /// Executing actions without per-action approval
    AutoExecution,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::BehavioralLogging,
        Capability::EmotionalSensing,
        Capability::CloudReasoning,
        Capability::AutoExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::BehavioralLogging => "behavioral_logging",
            Capability::EmotionalSensing => "emotional_sensing",
            Capability::CloudReasoning => "cloud_reasoning",
            Capability::AutoExecution => "auto_execution",
        }
    }

    /// Text shown to the user when consent is requested
    pub fn description(&self) -> &'static str {
        match self {
            Capability::BehavioralLogging => {
                "Record which apps and windows you use, locally, to find repeated workflows"
            }
            Capability::EmotionalSensing => {
                "Estimate focus and stress from typing rhythm and error bursts"
            }
            Capability::CloudReasoning => {
                "Send anonymized pattern summaries to a remote model for better suggestions"
            }
            Capability::AutoExecution => {
                "Run low-risk, high-confidence automations without asking each time"
            }
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Capability::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the consent ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Position in the ledger, starting at 1
    pub sequence: u64,
    pub capability: Capability,
    pub granted: bool,
    /// When the capability was (last) granted; carried forward on no-op grants
    pub granted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// When this record was appended
    pub recorded_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub prev_hash: String,
    pub hash: String,
}

impl ConsentRecord {
    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.capability.as_str().as_bytes());
        hasher.update([self.granted as u8]);
        if let Some(at) = self.granted_at {
            hasher.update(at.timestamp_micros().to_be_bytes());
        }
        if let Some(at) = self.revoked_at {
            hasher.update(at.timestamp_micros().to_be_bytes());
        }
        hasher.update(self.recorded_at.timestamp_micros().to_be_bytes());
        if let Some(ref reason) = self.reason {
            hasher.update(reason.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Append-only consent ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentLedger {
    records: Vec<ConsentRecord>,
}

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

impl ConsentLedger {
    /// Empty ledger: every capability is opt-out
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Latest record for a capability
    pub fn latest(&self, capability: Capability) -> Option<&ConsentRecord> {
        self.records.iter().rev().find(|r| r.capability == capability)
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.latest(capability).map(|r| r.granted).unwrap_or(false)
    }

    /// Append a grant. Re-granting keeps the original grant time.
    pub fn grant(&mut self, capability: Capability) -> &ConsentRecord {
        let now = Utc::now();
        let granted_at = match self.latest(capability) {
            Some(prev) if prev.granted => prev.granted_at.or(Some(now)),
            _ => Some(now),
        };
        self.append(capability, true, granted_at, None, None, now)
    }

    /// Append a revocation. Revoking twice keeps the original revocation time.
    pub fn revoke(&mut self, capability: Capability, reason: Option<String>) -> &ConsentRecord {
        let now = Utc::now();
        let (granted_at, revoked_at) = match self.latest(capability) {
            Some(prev) if !prev.granted => (prev.granted_at, prev.revoked_at.or(Some(now))),
            Some(prev) => (prev.granted_at, Some(now)),
            None => (None, Some(now)),
        };
        self.append(capability, false, granted_at, revoked_at, reason, now)
    }

    fn append(
        &mut self,
        capability: Capability,
        granted: bool,
        granted_at: Option<DateTime<Utc>>,
        revoked_at: Option<DateTime<Utc>>,
        reason: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> &ConsentRecord {
        let prev_hash = self
            .records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut record = ConsentRecord {
            sequence: self.records.len() as u64 + 1,
            capability,
            granted,
            granted_at,
            revoked_at,
            recorded_at,
            reason,
            prev_hash,
            hash: String::new(),
        };
        record.hash = record.compute_hash();

        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Full trail in append order
    pub fn records(&self) -> &[ConsentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check sequence numbers and the hash chain
    pub fn verify_chain(&self) -> Result<()> {
        let mut prev = GENESIS_HASH.to_string();
        for (i, record) in self.records.iter().enumerate() {
            if record.sequence != i as u64 + 1
                || record.prev_hash != prev
                || record.compute_hash() != record.hash
            {
                return Err(AgentError::AuditTampered(record.sequence));
            }
            prev = record.hash.clone();
        }
        Ok(())
    }
}
