//! Anchor Store Client
//!
//! ```text
//! registry already anchored? ──yes──► DuplicateAnchor
//!          │ no
//! ledger.find(digest) ──same owner──► receipt (reconciled)
//!          │        └──other owner──► DuplicateAnchor
//!          │ none
//! ledger.commit(digest, owner) ─────► receipt
//! ```
//!
//! The reconciliation step makes a retried submission safe when an earlier
//! commit landed but its response never arrived.

use crate::ledger::{Ledger, LedgerEntry};
use pom_core::{AnchorReceipt, ContentFingerprint, ProfileHandle, ProofError};
use pom_registry::ProofRegistry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct AnchorClient {
    ledger: Arc<dyn Ledger>,
    registry: Arc<ProofRegistry>,
    timeout: Duration,
}

impl AnchorClient {
    pub fn new(ledger: Arc<dyn Ledger>, registry: Arc<ProofRegistry>, timeout: Duration) -> Self {
        Self {
            ledger,
            registry,
            timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Bind `fingerprint` to `owner` on the ledger.
    ///
    /// Returns `DuplicateAnchor` when the fingerprint is anchored already, by
    /// another record or on the ledger under another owner.
    pub async fn submit_anchor(
        &self,
        fingerprint: &ContentFingerprint,
        owner: &ProfileHandle,
    ) -> Result<AnchorReceipt, ProofError> {
        let digest = fingerprint.digest;

        if let Some(existing) = self.registry.anchored_record(&digest) {
            tracing::warn!(
                digest = %digest.short(),
                record_id = %existing.id,
                "fingerprint already anchored in registry"
            );
            return Err(ProofError::DuplicateAnchor(digest.to_string()));
        }

        if let Some(entry) = self.bounded("ledger.find", self.ledger.find(&digest)).await? {
            return self.reconcile(entry, owner);
        }

        match self
            .bounded("ledger.commit", self.ledger.commit(&digest, owner))
            .await
        {
            Ok(entry) => {
                tracing::info!(
                    digest = %digest.short(),
                    owner = %owner,
                    ledger = self.ledger.name(),
                    tx = %entry.transaction_id,
                    "anchor committed"
                );
                Ok(entry.into_receipt(self.ledger.name(), false))
            }
            // A concurrent or lost commit for the same owner still counts
            Err(ProofError::DuplicateAnchor(_)) => {
                match self.bounded("ledger.find", self.ledger.find(&digest)).await? {
                    Some(entry) => self.reconcile(entry, owner),
                    None => Err(ProofError::DuplicateAnchor(digest.to_string())),
                }
            }
            Err(e) => {
                tracing::warn!(digest = %digest.short(), error = %e, "anchor commit failed");
                Err(e)
            }
        }
    }

    fn reconcile(&self, entry: LedgerEntry, owner: &ProfileHandle) -> Result<AnchorReceipt, ProofError> {
        if entry.owner != *owner {
            tracing::warn!(
                digest = %entry.digest.short(),
                claimed_by = %owner,
                committed_by = %entry.owner,
                "ledger holds the fingerprint under another owner"
            );
            return Err(ProofError::DuplicateAnchor(entry.digest.to_string()));
        }
        tracing::info!(
            digest = %entry.digest.short(),
            tx = %entry.transaction_id,
            "reconciled with existing ledger commit"
        );
        Ok(entry.into_receipt(self.ledger.name(), true))
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, ProofError>>,
    ) -> Result<T, ProofError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProofError::timeout(operation, self.timeout))?
    }
}
