//! In-process ledger
//!
//! Blocks form a blake3 hash chain: each block hash covers the previous hash,
//! the sequence number, the digest, the owner and the commit time. An account
//! balance is charged a fee per commit. Fault injection lets tests simulate
//! outages and lost commit responses.

use crate::ledger::{Ledger, LedgerEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pom_core::{Clock, Digest, ProfileHandle, ProofError, SystemClock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const GENESIS_HASH: [u8; 32] = [0u8; 32];

#[derive(Debug, Clone)]
struct Block {
    sequence: u64,
    digest: Digest,
    owner: ProfileHandle,
    committed_at: DateTime<Utc>,
    prev_hash: [u8; 32],
    hash: [u8; 32],
}

impl Block {
    fn entry(&self) -> LedgerEntry {
        LedgerEntry {
            digest: self.digest,
            owner: self.owner.clone(),
            transaction_id: format!("0x{}", hex::encode(self.hash)),
            sequence_number: self.sequence,
            committed_at: self.committed_at,
        }
    }
}

fn block_hash(
    prev_hash: &[u8; 32],
    sequence: u64,
    digest: &Digest,
    owner: &ProfileHandle,
    committed_at: DateTime<Utc>,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"pom/ledger/block/v1\0");
    hasher.update(prev_hash);
    hasher.update(&sequence.to_le_bytes());
    hasher.update(digest.as_bytes());
    hasher.update(owner.to_string().as_bytes());
    hasher.update(&[0]);
    hasher.update(committed_at.to_rfc3339().as_bytes());
    *hasher.finalize().as_bytes()
}

#[derive(Debug)]
struct Chain {
    blocks: Vec<Block>,
    balance: u64,
}

pub struct InMemoryLedger {
    name: String,
    chain: Mutex<Chain>,
    commit_fee: u64,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
    fail_next: AtomicU32,
    lose_next_response: AtomicU32,
    latency: Mutex<Duration>,
}

impl InMemoryLedger {
    pub fn new(initial_balance: u64, commit_fee: u64) -> Self {
        Self {
            name: "memory".to_string(),
            chain: Mutex::new(Chain {
                blocks: Vec::new(),
                balance: initial_balance,
            }),
            commit_fee,
            clock: Arc::new(SystemClock),
            unavailable: AtomicBool::new(false),
            fail_next: AtomicU32::new(0),
            lose_next_response: AtomicU32::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn balance(&self) -> u64 {
        self.chain().balance
    }

    pub fn set_balance(&self, balance: u64) {
        self.chain().balance = balance;
    }

    pub fn len(&self) -> usize {
        self.chain().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every call fails with `LedgerUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `n` commits fail before touching the chain.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// The next `n` commits land on the chain but report `LedgerUnavailable`.
    pub fn lose_next_response(&self, n: u32) {
        self.lose_next_response.store(n, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Recompute every block hash and check the links.
    pub fn verify_chain(&self) -> bool {
        let chain = self.chain();
        let mut prev = GENESIS_HASH;
        for (index, block) in chain.blocks.iter().enumerate() {
            if block.sequence != index as u64 + 1 || block.prev_hash != prev {
                return false;
            }
            let expected = block_hash(
                &block.prev_hash,
                block.sequence,
                &block.digest,
                &block.owner,
                block.committed_at,
            );
            if expected != block.hash {
                return false;
            }
            prev = block.hash;
        }
        true
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.chain().blocks.iter().map(Block::entry).collect()
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_available(&self) -> Result<(), ProofError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProofError::LedgerUnavailable("memory ledger is offline".to_string()));
        }
        Ok(())
    }
}

/// Decrement `counter` if it is positive; true when a fault was consumed.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn commit(&self, digest: &Digest, owner: &ProfileHandle) -> Result<LedgerEntry, ProofError> {
        self.simulate_latency().await;
        self.check_available()?;
        if take_fault(&self.fail_next) {
            return Err(ProofError::LedgerUnavailable("injected commit failure".to_string()));
        }

        let entry = {
            let mut chain = self.chain();
            if chain.blocks.iter().any(|b| b.digest == *digest) {
                return Err(ProofError::DuplicateAnchor(digest.to_string()));
            }
            if chain.balance < self.commit_fee {
                return Err(ProofError::InsufficientFunds(format!(
                    "balance {} is below the commit fee {}",
                    chain.balance, self.commit_fee
                )));
            }

            let prev_hash = chain.blocks.last().map(|b| b.hash).unwrap_or(GENESIS_HASH);
            let sequence = chain.blocks.len() as u64 + 1;
            let committed_at = self.clock.now();
            let block = Block {
                sequence,
                digest: *digest,
                owner: owner.clone(),
                committed_at,
                prev_hash,
                hash: block_hash(&prev_hash, sequence, digest, owner, committed_at),
            };
            let entry = block.entry();
            chain.balance -= self.commit_fee;
            chain.blocks.push(block);
            entry
        };

        tracing::debug!(
            digest = %digest.short(),
            sequence = entry.sequence_number,
            tx = %entry.transaction_id,
            "memory ledger commit"
        );

        if take_fault(&self.lose_next_response) {
            return Err(ProofError::LedgerUnavailable("commit response lost".to_string()));
        }
        Ok(entry)
    }

    async fn find(&self, digest: &Digest) -> Result<Option<LedgerEntry>, ProofError> {
        self.simulate_latency().await;
        self.check_available()?;
        Ok(self
            .chain()
            .blocks
            .iter()
            .find(|b| b.digest == *digest)
            .map(Block::entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> ProfileHandle {
        "twitter:alice".parse().unwrap()
    }

    #[tokio::test]
    async fn test_commit_chains_blocks_and_charges_fee() {
        let ledger = InMemoryLedger::new(10, 3);
        let a = Digest::from_bytes([1; 32]);
        let b = Digest::from_bytes([2; 32]);

        let first = ledger.commit(&a, &owner()).await.unwrap();
        let second = ledger.commit(&b, &owner()).await.unwrap();

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert_ne!(first.transaction_id, second.transaction_id);
        assert!(first.transaction_id.starts_with("0x"));
        assert_eq!(ledger.balance(), 4);
        assert!(ledger.verify_chain());
        assert_eq!(ledger.find(&a).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_duplicate_digest_rejected() {
        let ledger = InMemoryLedger::new(10, 1);
        let digest = Digest::from_bytes([7; 32]);
        ledger.commit(&digest, &owner()).await.unwrap();

        let err = ledger
            .commit(&digest, &"instagram:mallory".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::DuplicateAnchor(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let ledger = InMemoryLedger::new(0, 1);
        let err = ledger
            .commit(&Digest::from_bytes([3; 32]), &owner())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::InsufficientFunds(_)));
        assert!(!err.is_retryable());
        assert!(ledger.is_empty());

        ledger.set_balance(5);
        assert!(ledger.commit(&Digest::from_bytes([3; 32]), &owner()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let ledger = InMemoryLedger::new(10, 1);
        let digest = Digest::from_bytes([4; 32]);

        ledger.fail_next(1);
        let err = ledger.commit(&digest, &owner()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.is_empty());

        ledger.lose_next_response(1);
        let err = ledger.commit(&digest, &owner()).await.unwrap_err();
        assert!(matches!(err, ProofError::LedgerUnavailable(_)));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.find(&digest).await.unwrap().is_some());

        ledger.set_unavailable(true);
        assert!(ledger.find(&digest).await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_chain_fails_verification() {
        let ledger = InMemoryLedger::new(10, 1);
        ledger.commit(&Digest::from_bytes([5; 32]), &owner()).await.unwrap();
        ledger.commit(&Digest::from_bytes([6; 32]), &owner()).await.unwrap();
        assert!(ledger.verify_chain());

        ledger.chain().blocks[0].owner = "tiktok:mallory".parse().unwrap();
        assert!(!ledger.verify_chain());
    }
}
