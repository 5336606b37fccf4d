//! Proof Registry: keyed store of proof records
//!
//! Records are indexed by id and by fingerprint digest. Several records may
//! exist for one fingerprint (competing claims), but only one of them can
//! ever reach Anchored. Workflow steps for a fingerprint serialize on
//! [`ProofRegistry::lock_fingerprint`].

use crate::journal::Journal;
use crate::lifecycle::{self, ProofEvent};
use chrono::{DateTime, Utc};
use pom_core::{ContentFingerprint, Digest, ProofError, ProofRecord, ProofState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Held for the duration of one workflow step on a fingerprint.
pub type FingerprintGuard = OwnedMutexGuard<()>;

/// Lock table size above which idle entries are pruned
const LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
struct RegistryState {
    records: HashMap<Uuid, ProofRecord>,
    by_fingerprint: HashMap<Digest, Vec<Uuid>>,
}

impl RegistryState {
    fn insert(&mut self, record: ProofRecord) {
        let ids = self.by_fingerprint.entry(record.digest()).or_default();
        if !ids.contains(&record.id) {
            ids.push(record.id);
        }
        self.records.insert(record.id, record);
    }

    fn for_fingerprint(&self, digest: &Digest) -> impl Iterator<Item = &ProofRecord> {
        self.by_fingerprint
            .get(digest)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.records.get(id))
    }

    fn anchored(&self, digest: &Digest) -> Option<&ProofRecord> {
        self.for_fingerprint(digest).find(|r| r.ever_anchored())
    }
}

pub struct ProofRegistry {
    state: RwLock<RegistryState>,
    /// Serializes mutations so the journal write can happen outside `state`
    writer: Mutex<()>,
    locks: Mutex<HashMap<Digest, Arc<AsyncMutex<()>>>>,
    journal: Option<Journal>,
}

impl Default for ProofRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofRegistry {
    /// Memory-only registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            writer: Mutex::new(()),
            locks: Mutex::new(HashMap::new()),
            journal: None,
        }
    }

    /// Registry backed by a journal at `path`, replaying what is already there.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProofError> {
        let (journal, replayed) = Journal::open(path)?;
        let mut state = RegistryState::default();
        for record in replayed {
            state.insert(record);
        }
        Ok(Self {
            state: RwLock::new(state),
            writer: Mutex::new(()),
            locks: Mutex::new(HashMap::new()),
            journal: Some(journal),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    /// Wait for exclusive use of `digest`'s workflow.
    pub async fn lock_fingerprint(&self, digest: Digest) -> FingerprintGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(digest)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Start a new Draft record. Fails if the fingerprint was ever anchored.
    pub fn create(
        &self,
        fingerprint: ContentFingerprint,
        now: DateTime<Utc>,
    ) -> Result<ProofRecord, ProofError> {
        let _writer = self.writer()?;
        if let Some(existing) = self.read()?.anchored(&fingerprint.digest) {
            tracing::warn!(
                digest = %fingerprint.digest.short(),
                record_id = %existing.id,
                "fingerprint already anchored"
            );
            return Err(ProofError::DuplicateAnchor(fingerprint.digest.to_string()));
        }

        let record = ProofRecord::draft(fingerprint, now);
        self.commit(&record)?;

        tracing::info!(record_id = %record.id, digest = %record.digest().short(), "proof record created");
        Ok(record)
    }

    pub fn get(&self, id: Uuid) -> Result<ProofRecord, ProofError> {
        self.read()?
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| ProofError::NotFound(format!("proof {}", id)))
    }

    /// Apply a lifecycle event. Out-of-order events fail with `InvalidTransition`
    /// and a second anchor for the same fingerprint with `DuplicateAnchor`.
    pub fn advance(
        &self,
        id: Uuid,
        event: ProofEvent,
        now: DateTime<Utc>,
    ) -> Result<ProofRecord, ProofError> {
        let _writer = self.writer()?;
        let mut record = {
            let state = self.read()?;
            let record = state
                .records
                .get(&id)
                .cloned()
                .ok_or_else(|| ProofError::NotFound(format!("proof {}", id)))?;

            if matches!(event, ProofEvent::Anchored { .. }) {
                if let Some(other) = state.anchored(&record.digest()) {
                    if other.id != record.id {
                        return Err(ProofError::DuplicateAnchor(record.digest().to_string()));
                    }
                }
            }
            record
        };

        let event_name = event.name();
        let from = record.state;
        lifecycle::apply(&mut record, event, now)?;
        self.commit(&record)?;

        tracing::info!(
            record_id = %record.id,
            digest = %record.digest().short(),
            event = event_name,
            from = %from,
            to = %record.state,
            "proof advanced"
        );
        Ok(record)
    }

    /// Anchored → Revoked. History and receipt are kept.
    pub fn revoke(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<ProofRecord, ProofError> {
        let _writer = self.writer()?;
        let mut record = self.get(id)?;

        lifecycle::revoke(&mut record, reason, now)?;
        self.commit(&record)?;

        tracing::info!(record_id = %record.id, digest = %record.digest().short(), reason, "proof revoked");
        Ok(record)
    }

    /// The authoritative record for a fingerprint: the anchored (or revoked)
    /// one when it exists, otherwise the most recently updated claim.
    pub fn lookup(&self, digest: &Digest) -> Option<ProofRecord> {
        let state = self.read().ok()?;
        state
            .anchored(digest)
            .or_else(|| state.for_fingerprint(digest).max_by_key(|r| r.updated_at))
            .cloned()
    }

    pub fn lookup_all(&self, digest: &Digest) -> Vec<ProofRecord> {
        let Ok(state) = self.read() else {
            return Vec::new();
        };
        let mut records: Vec<ProofRecord> = state.for_fingerprint(digest).cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// The record that anchored `digest`, if any (including revoked ones).
    pub fn anchored_record(&self, digest: &Digest) -> Option<ProofRecord> {
        self.read().ok()?.anchored(digest).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let Ok(state) = self.read() else {
            return RegistryStats::default();
        };
        let mut stats = RegistryStats {
            total: state.records.len(),
            fingerprints: state.by_fingerprint.len(),
            ..RegistryStats::default()
        };
        for record in state.records.values() {
            match record.state {
                ProofState::Draft => stats.draft += 1,
                ProofState::Challenged => stats.challenged += 1,
                ProofState::Verified => stats.verified += 1,
                ProofState::Anchored => stats.anchored += 1,
                ProofState::Revoked => stats.revoked += 1,
            }
        }
        stats
    }

    /// Journal first, then publish. Callers hold the writer lock; readers
    /// keep seeing the previous version until the append is on disk.
    fn commit(&self, record: &ProofRecord) -> Result<(), ProofError> {
        if let Some(journal) = &self.journal {
            journal.append(record)?;
        }
        self.write()?.insert(record.clone());
        Ok(())
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, ()>, ProofError> {
        self.writer
            .lock()
            .map_err(|_| ProofError::Storage("registry writer lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RegistryState>, ProofError> {
        self.state
            .read()
            .map_err(|_| ProofError::Storage("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RegistryState>, ProofError> {
        self.state
            .write()
            .map_err(|_| ProofError::Storage("registry lock poisoned".to_string()))
    }
}

/// Record counts by lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub fingerprints: usize,
    pub draft: usize,
    pub challenged: usize,
    pub verified: usize,
    pub anchored: usize,
    pub revoked: usize,
}
