//! Proof Service: orchestrates one proof workflow step at a time
//!
//! Every step that reads and then mutates a record holds the fingerprint's
//! lock, so two requests for the same content never interleave. Platform
//! polls are single-shot; only anchor submission is retried here.

use crate::metrics::Metrics;
use pom_anchor::{ledger_from_config, AnchorClient, Ledger};
use pom_core::config::Config;
use pom_core::{
    ChallengeStatus, Clock, Digest, FingerprintEngine, ProfileHandle, ProofError, ProofRecord,
    ProofState, RetryPolicy, SystemClock, VerificationChallenge,
};
use pom_registry::{ProofEvent, ProofRegistry, RegistryStats};
use pom_verify::{PlatformDirectory, VerificationEngine};
use std::sync::Arc;
use uuid::Uuid;

/// Allowance for the JSON fields around the content
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

pub struct ProofService {
    fingerprints: FingerprintEngine,
    verifier: VerificationEngine,
    anchors: AnchorClient,
    registry: Arc<ProofRegistry>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl ProofService {
    /// Wire every collaborator from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ProofError> {
        config.validate()?;
        let registry = match &config.registry.journal_path {
            Some(path) => ProofRegistry::open(path)?,
            None => ProofRegistry::new(),
        };
        let platforms = PlatformDirectory::from_config(&config.platforms, config.timeouts.poll())?;
        let ledger = ledger_from_config(&config.ledger, config.timeouts.ledger())?;
        Self::new(config, platforms, ledger, Arc::new(registry), Arc::new(SystemClock))
    }

    pub fn new(
        config: &Config,
        platforms: PlatformDirectory,
        ledger: Arc<dyn Ledger>,
        registry: Arc<ProofRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProofError> {
        let metrics = Metrics::new().map_err(|e| ProofError::Config(format!("metrics: {}", e)))?;
        Ok(Self {
            fingerprints: FingerprintEngine::new(config.fingerprint.max_content_bytes),
            verifier: VerificationEngine::from_config(config, platforms, clock.clone()),
            anchors: AnchorClient::new(ledger, registry.clone(), config.timeouts.ledger()),
            registry,
            retry: config.retry.clone(),
            clock,
            metrics: Arc::new(metrics),
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ProofRegistry {
        &self.registry
    }

    /// Largest request body worth reading: the content limit once base64
    /// encoded, plus room for the JSON envelope.
    pub fn body_limit(&self) -> usize {
        let max = self.fingerprints.max_content_bytes();
        max.saturating_add(max / 3 + 4).saturating_add(BODY_ENVELOPE_BYTES)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Fingerprint submitted content and open a Draft record for it.
    pub async fn start_proof(&self, content: &[u8], source_url: &str) -> Result<ProofRecord, ProofError> {
        let result = async {
            let fingerprint =
                self.fingerprints
                    .compute_fingerprint(content, source_url, self.clock.now())?;
            let _guard = self.registry.lock_fingerprint(fingerprint.digest).await;
            let record = self.registry.create(fingerprint, self.clock.now())?;
            self.metrics.proofs_started.inc();
            Ok::<_, ProofError>(record)
        }
        .await;
        self.observe("proof.start", result)
    }

    /// Issue (or reissue) the ownership challenge for a record.
    ///
    /// A live challenge for the same profile is returned as is.
    pub async fn issue_challenge(
        &self,
        id: Uuid,
        profile: ProfileHandle,
    ) -> Result<VerificationChallenge, ProofError> {
        let result = async {
            let digest = self.registry.get(id)?.digest();
            let _guard = self.registry.lock_fingerprint(digest).await;
            let record = self.registry.get(id)?;
            self.ensure_not_anchored_elsewhere(&record)?;

            let now = self.clock.now();
            let event = match (record.state, &record.challenge) {
                (ProofState::Draft, _) => {
                    let challenge = self.verifier.issue_challenge(&record.fingerprint, profile)?;
                    ProofEvent::ChallengeIssued { challenge }
                }
                (ProofState::Challenged, Some(current))
                    if current.is_live(now) && current.profile == profile =>
                {
                    return Ok(current.clone());
                }
                (ProofState::Challenged, _) => {
                    let challenge = self.verifier.issue_challenge(&record.fingerprint, profile)?;
                    ProofEvent::ChallengeReissued { challenge }
                }
                (state, _) => return Err(ProofError::invalid_transition(state, "challenge_issued")),
            };

            let record = self.registry.advance(id, event, now)?;
            self.metrics.challenges_issued.inc();
            record
                .challenge
                .ok_or_else(|| ProofError::Storage(format!("proof {} lost its challenge", id)))
        }
        .await;
        self.observe("proof.challenge", result)
    }

    /// Poll the challenge once; once confirmed, anchor the proof.
    ///
    /// Returns the record: Anchored on success, still Challenged while the
    /// code has not been posted. An expired challenge is recorded and then
    /// reported as `ChallengeExpired`.
    pub async fn confirm_challenge(&self, id: Uuid) -> Result<ProofRecord, ProofError> {
        let result = async {
            let digest = self.registry.get(id)?.digest();
            let _guard = self.registry.lock_fingerprint(digest).await;
            let record = self.registry.get(id)?;

            match record.state {
                ProofState::Anchored => Ok(record),
                ProofState::Verified => self.anchor(record).await,
                ProofState::Challenged => {
                    let mut challenge = record.challenge.clone().ok_or_else(|| {
                        ProofError::Storage(format!("proof {} is challenged without a challenge", id))
                    })?;
                    if challenge.status == ChallengeStatus::Expired {
                        return Err(ProofError::ChallengeExpired(challenge.id.to_string()));
                    }

                    match self.verifier.confirm_challenge(&mut challenge).await? {
                        ChallengeStatus::Pending => Ok(record),
                        ChallengeStatus::Expired => {
                            let challenge_id = challenge.id;
                            self.registry.advance(
                                id,
                                ProofEvent::ChallengeExpired { challenge },
                                self.clock.now(),
                            )?;
                            self.metrics.challenges_expired.inc();
                            Err(ProofError::ChallengeExpired(challenge_id.to_string()))
                        }
                        ChallengeStatus::Confirmed => {
                            let record = self.registry.advance(
                                id,
                                ProofEvent::ChallengeConfirmed { challenge },
                                self.clock.now(),
                            )?;
                            self.metrics.challenges_confirmed.inc();
                            self.anchor(record).await
                        }
                    }
                }
                state => Err(ProofError::invalid_transition(state, "challenge_confirmed")),
            }
        }
        .await;
        self.observe("proof.confirm", result)
    }

    pub fn status(&self, id: Uuid) -> Result<ProofRecord, ProofError> {
        self.observe("proof.status", self.registry.get(id))
    }

    pub fn lookup_by_fingerprint(&self, digest: &Digest) -> Result<ProofRecord, ProofError> {
        let result = self
            .registry
            .lookup(digest)
            .ok_or_else(|| ProofError::NotFound(format!("fingerprint {}", digest)));
        self.observe("proof.lookup", result)
    }

    pub async fn revoke(&self, id: Uuid, reason: &str) -> Result<ProofRecord, ProofError> {
        let result = async {
            let digest = self.registry.get(id)?.digest();
            let _guard = self.registry.lock_fingerprint(digest).await;
            let record = self.registry.revoke(id, reason, self.clock.now())?;
            self.metrics.proofs_revoked.inc();
            Ok::<_, ProofError>(record)
        }
        .await;
        self.observe("proof.revoke", result)
    }

    /// Verified → Anchored. On failure the record stays Verified for a later retry.
    async fn anchor(&self, record: ProofRecord) -> Result<ProofRecord, ProofError> {
        let owner = record.owner.clone().ok_or_else(|| {
            ProofError::Storage(format!("proof {} is verified without an owner", record.id))
        })?;
        let receipt = self
            .retry
            .run("anchor.submit", || self.anchors.submit_anchor(&record.fingerprint, &owner))
            .await?;
        let anchored = self
            .registry
            .advance(record.id, ProofEvent::Anchored { receipt }, self.clock.now())?;
        self.metrics.anchors_committed.inc();
        Ok(anchored)
    }

    fn ensure_not_anchored_elsewhere(&self, record: &ProofRecord) -> Result<(), ProofError> {
        match self.registry.anchored_record(&record.digest()) {
            Some(other) if other.id != record.id => {
                Err(ProofError::DuplicateAnchor(record.digest().to_string()))
            }
            _ => Ok(()),
        }
    }

    fn observe<T>(&self, operation: &str, result: Result<T, ProofError>) -> Result<T, ProofError> {
        if let Err(e) = &result {
            self.metrics.record_error(operation, e.code());
            match e {
                ProofError::Storage(_) | ProofError::Config(_) => {
                    tracing::error!(operation, code = e.code(), error = %e, "operation failed")
                }
                e if e.is_retryable() => {
                    tracing::warn!(operation, code = e.code(), error = %e, "operation failed, retryable")
                }
                _ => tracing::info!(operation, code = e.code(), error = %e, "operation rejected"),
            }
        }
        result
    }
}
