//! Ledger collaborator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pom_core::{AnchorReceipt, Digest, ProfileHandle, ProofError};
use serde::{Deserialize, Serialize};

/// One committed fingerprint/owner binding as the ledger reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub digest: Digest,
    pub owner: ProfileHandle,
    pub transaction_id: String,
    pub sequence_number: u64,
    pub committed_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn into_receipt(self, ledger: &str, reconciled: bool) -> AnchorReceipt {
        AnchorReceipt {
            fingerprint: self.digest,
            owner: self.owner,
            ledger: ledger.to_string(),
            transaction_id: self.transaction_id,
            sequence_number: self.sequence_number,
            committed_at: self.committed_at,
            reconciled,
        }
    }
}

/// Append-only store of fingerprint/owner bindings.
///
/// `commit` must reject a digest that is already committed with
/// `DuplicateAnchor`. `find` is read-only.
#[async_trait]
pub trait Ledger: Send + Sync {
    fn name(&self) -> &str;

    async fn commit(&self, digest: &Digest, owner: &ProfileHandle) -> Result<LedgerEntry, ProofError>;

    async fn find(&self, digest: &Digest) -> Result<Option<LedgerEntry>, ProofError>;
}
