//! Consent & Privacy Kernel
//!
//! - **Consent ledger**: append-only, hash-chained, default-deny
//! - **Vault**: AES-256-GCM envelopes with pluggable key stores
//! - **Secure store**: opaque sealed blobs (memory or files)
//! - **Timeline**: transparency log of what was accessed and done

mod consent;
mod kernel;
mod store;
mod timeline;
mod vault;

pub use consent::{Capability, ConsentLedger, ConsentRecord};
pub use kernel::{ConsentKernel, ConsentRequest, LEDGER_BLOB, LEDGER_KEY_REF};
pub use store::{FileStore, MemoryStore, SecureStore};
pub use timeline::{TimelineEntry, TimelineKind, TransparencyTimeline};
pub use vault::{open, seal, EphemeralKeyStore, KeyMaterial, KeyStore, PassphraseKeyStore};
