//! Persistence of Memory core: data model, error model, fingerprinting
//!
//! Shared vocabulary for the proof workflow: content is fingerprinted,
//! ownership is proven with a one-time code posted on a social profile, and
//! the fingerprint/owner binding is anchored on an append-only ledger.

pub mod clock;
pub mod config;
pub mod context;
pub mod data_model;
pub mod error;
pub mod fingerprint;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use context::RequestContext;
pub use data_model::{
    AnchorReceipt, ChallengeStatus, ContentFingerprint, ContentKind, Digest, DigestAlgorithm,
    PlatformKind, ProfileHandle, ProofRecord, ProofState, Revocation, StateChange,
    VerificationChallenge,
};
pub use error::{ErrorClass, ProofError};
pub use fingerprint::FingerprintEngine;
pub use retry::RetryPolicy;

/// Engine version reported by the API
pub const POM_VERSION: &str = env!("CARGO_PKG_VERSION");
