//! Proof Registry: lifecycle-guarded store of proof records
//!
//! - `lifecycle`: transition table and guards for a single record
//! - `registry`: the keyed store, per-fingerprint locking, one anchor per fingerprint
//! - `journal`: append-only JSON-lines persistence replayed on open
pub mod journal;
pub mod lifecycle;
pub mod registry;

pub use journal::Journal;
pub use lifecycle::{next_state, ProofEvent};
pub use registry::{FingerprintGuard, ProofRegistry, RegistryStats};
