//! Consent & Privacy Kernel
//!
//! Owns the consent ledger, the transparency timeline and the key store.
//! Every other component holds an `Arc<ConsentKernel>` and asks it before
//! touching capability-gated data.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::consent::{Capability, ConsentLedger, ConsentRecord};
use super::store::SecureStore;
use super::timeline::{TimelineEntry, TimelineKind, TransparencyTimeline};
use super::vault::{self, EphemeralKeyStore, KeyStore};
use crate::error::{AgentError, Result};

/// Key reference used for the persisted consent ledger
pub const LEDGER_KEY_REF: &str = "consent-ledger";
/// Blob name of the persisted consent ledger
pub const LEDGER_BLOB: &str = "consent_ledger";

/// Answer to a consent request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub capability: Capability,
    pub description: String,
    pub granted: bool,
    /// The user already answered for this capability
    pub decided: bool,
}

pub struct ConsentKernel {
    ledger: RwLock<ConsentLedger>,
    timeline: RwLock<TransparencyTimeline>,
    keys: Arc<dyn KeyStore>,
}

impl ConsentKernel {
    /// Fresh kernel: nothing granted
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        info!("Consent kernel created (all capabilities opt-out)");
        Self {
            ledger: RwLock::new(ConsentLedger::new()),
            timeline: RwLock::new(TransparencyTimeline::default()),
            keys,
        }
    }

    /// Kernel with process-lifetime keys (tests, demos)
    pub fn ephemeral() -> Self {
        Self::new(Arc::new(EphemeralKeyStore::new()))
    }

    /// Rebuild a kernel from a sealed ledger, or start fresh if none exists.
    /// A ledger that fails to decrypt or verify is a hard error.
    pub fn restore(keys: Arc<dyn KeyStore>, store: &dyn SecureStore) -> Result<Self> {
        let kernel = Self::new(keys);
        if let Some(sealed) = store.get(LEDGER_BLOB)? {
            let plaintext = kernel.decrypt(&sealed, LEDGER_KEY_REF)?;
            let ledger: ConsentLedger = serde_json::from_slice(&plaintext)?;
            ledger.verify_chain()?;
            info!("Restored consent ledger with {} records", ledger.len());
            *kernel.ledger.write() = ledger;
        }
        Ok(kernel)
    }

    /// Seal and persist the ledger
    pub fn save_ledger(&self, store: &dyn SecureStore) -> Result<()> {
        let plaintext = serde_json::to_vec(&*self.ledger.read())?;
        let sealed = self.encrypt(&plaintext, LEDGER_KEY_REF)?;
        store.put(LEDGER_BLOB, &sealed)
    }

    /// Ask for a capability. Does not touch the ledger; an undecided
    /// capability is reported as not granted.
    pub fn request_consent(&self, capability: Capability) -> ConsentRequest {
        let latest = self.ledger.read().latest(capability).cloned();
        let request = ConsentRequest {
            capability,
            description: capability.description().to_string(),
            granted: latest.as_ref().map(|r| r.granted).unwrap_or(false),
            decided: latest.is_some(),
        };

        if !request.decided {
            self.timeline.write().push(
                TimelineKind::ConsentRequested,
                format!("Requested consent for: {}", capability.description()),
                vec![capability.as_str().to_string()],
                None,
            );
        }
        request
    }

    pub fn grant(&self, capability: Capability) -> ConsentRecord {
        let record = self.ledger.write().grant(capability).clone();
        info!("Consent granted: {} (record #{})", capability, record.sequence);
        self.timeline.write().push(
            TimelineKind::ConsentGranted,
            format!("Granted consent for: {}", capability),
            vec![capability.as_str().to_string()],
            None,
        );
        record
    }

    pub fn revoke(&self, capability: Capability, reason: Option<String>) -> ConsentRecord {
        let record = self.ledger.write().revoke(capability, reason.clone()).clone();
        info!("Consent revoked: {} (record #{})", capability, record.sequence);
        self.timeline.write().push(
            TimelineKind::ConsentRevoked,
            match reason {
                Some(r) => format!("Revoked consent for: {} - reason: {}", capability, r),
                None => format!("Revoked consent for: {}", capability),
            },
            vec![capability.as_str().to_string()],
            None,
        );
        record
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.ledger.read().is_granted(capability)
    }

    /// Explicit-action gate
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.is_granted(capability) {
            Ok(())
        } else {
            Err(AgentError::ConsentDenied(capability))
        }
    }

    /// Full audit trail, oldest first
    pub fn audit_trail(&self) -> Vec<ConsentRecord> {
        self.ledger.read().records().to_vec()
    }

    pub fn audit_len(&self) -> usize {
        self.ledger.read().len()
    }

    pub fn verify_audit_trail(&self) -> Result<()> {
        self.ledger.read().verify_chain()
    }

    pub fn encrypt(&self, plaintext: &[u8], key_ref: &str) -> Result<Vec<u8>> {
        let key = self.keys.key(key_ref)?;
        vault::seal(&key, key_ref, plaintext)
    }

    pub fn decrypt(&self, sealed: &[u8], key_ref: &str) -> Result<Vec<u8>> {
        let key = self.keys.key(key_ref)?;
        vault::open(&key, key_ref, sealed).map_err(|e| {
            warn!("Decryption failed for key ref '{}'", key_ref);
            e
        })
    }

    /// Append to the transparency timeline
    pub fn note(
        &self,
        kind: TimelineKind,
        description: String,
        data_accessed: Vec<String>,
        action_taken: Option<String>,
    ) {
        self.timeline
            .write()
            .push(kind, description, data_accessed, action_taken);
    }

    pub fn timeline(&self, limit: usize) -> Vec<TimelineEntry> {
        self.timeline.read().recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::store::MemoryStore;
    use crate::privacy::vault::PassphraseKeyStore;

    #[test]
    fn test_request_is_noop_on_ledger() {
        let kernel = ConsentKernel::ephemeral();
        let req = kernel.request_consent(Capability::BehavioralLogging);
        assert!(!req.granted);
        assert!(!req.decided);
        assert_eq!(kernel.audit_len(), 0);

        kernel.grant(Capability::BehavioralLogging);
        let req = kernel.request_consent(Capability::BehavioralLogging);
        assert!(req.granted);
        assert!(req.decided);
        assert_eq!(kernel.audit_len(), 1);
    }

    #[test]
    fn test_require() {
        let kernel = ConsentKernel::ephemeral();
        assert!(matches!(
            kernel.require(Capability::AutoExecution),
            Err(AgentError::ConsentDenied(Capability::AutoExecution))
        ));
        kernel.grant(Capability::AutoExecution);
        assert!(kernel.require(Capability::AutoExecution).is_ok());
    }

    #[test]
    fn test_ledger_persists_sealed() {
        let keys: Arc<dyn KeyStore> = Arc::new(PassphraseKeyStore::new("pw"));
        let store = MemoryStore::new();

        let kernel = ConsentKernel::new(keys.clone());
        kernel.grant(Capability::BehavioralLogging);
        kernel.revoke(Capability::BehavioralLogging, Some("vacation".into()));
        kernel.save_ledger(&store).unwrap();

        let raw = store.get(LEDGER_BLOB).unwrap().unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("behavioral_logging"));

        let restored = ConsentKernel::restore(keys, &store).unwrap();
        assert_eq!(restored.audit_len(), 2);
        assert!(!restored.is_granted(Capability::BehavioralLogging));
    }

    #[test]
    fn test_restore_with_wrong_key_fails() {
        let store = MemoryStore::new();
        let kernel = ConsentKernel::ephemeral();
        kernel.grant(Capability::CloudReasoning);
        kernel.save_ledger(&store).unwrap();

        let result = ConsentKernel::restore(Arc::new(EphemeralKeyStore::new()), &store);
        assert!(matches!(result, Err(AgentError::DecryptionFailed(_))));
    }

    #[test]
    fn test_grant_and_revoke_hit_timeline() {
        let kernel = ConsentKernel::ephemeral();
        kernel.grant(Capability::EmotionalSensing);
        kernel.revoke(Capability::EmotionalSensing, None);
        let kinds: Vec<_> = kernel.timeline(10).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![TimelineKind::ConsentGranted, TimelineKind::ConsentRevoked]);
    }
}
