//! Proof lifecycle
//!
//! ```text
//! Draft ─ChallengeIssued─► Challenged ─ChallengeConfirmed─► Verified ─Anchored─► Anchored ─revoke─► Revoked
//!                            │    ▲
//!                            └────┘ ChallengeReissued / ChallengeExpired
//! ```
//!
//! Any other (state, event) pair is an `InvalidTransition`. Cross-record
//! rules (one anchor per fingerprint) are enforced by the registry.

use chrono::{DateTime, Utc};
use pom_core::{
    AnchorReceipt, ChallengeStatus, ProofError, ProofRecord, ProofState, Revocation,
    VerificationChallenge,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProofEvent {
    /// First challenge for a draft
    ChallengeIssued { challenge: VerificationChallenge },
    /// Replacement for an expired challenge
    ChallengeReissued { challenge: VerificationChallenge },
    /// The current challenge was found past its deadline
    ChallengeExpired { challenge: VerificationChallenge },
    /// The current challenge's code was found on the profile
    ChallengeConfirmed { challenge: VerificationChallenge },
    /// The ledger holds the fingerprint/owner binding
    Anchored { receipt: AnchorReceipt },
}

impl ProofEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChallengeIssued { .. } => "challenge_issued",
            Self::ChallengeReissued { .. } => "challenge_reissued",
            Self::ChallengeExpired { .. } => "challenge_expired",
            Self::ChallengeConfirmed { .. } => "challenge_confirmed",
            Self::Anchored { .. } => "anchored",
        }
    }
}

/// State reached by applying `event` in state `from`, ignoring guards.
pub fn next_state(from: ProofState, event: &ProofEvent) -> Result<ProofState, ProofError> {
    use ProofState::*;
    match (from, event) {
        (Draft, ProofEvent::ChallengeIssued { .. }) => Ok(Challenged),
        (Challenged, ProofEvent::ChallengeReissued { .. })
        | (Challenged, ProofEvent::ChallengeExpired { .. }) => Ok(Challenged),
        (Challenged, ProofEvent::ChallengeConfirmed { .. }) => Ok(Verified),
        (Verified, ProofEvent::Anchored { .. }) => Ok(Anchored),
        _ => Err(ProofError::invalid_transition(from, event.name())),
    }
}

/// Apply `event` to `record` after checking the transition table and guards.
/// On error the record is untouched.
pub fn apply(record: &mut ProofRecord, event: ProofEvent, now: DateTime<Utc>) -> Result<(), ProofError> {
    let from = record.state;
    let to = next_state(from, &event)?;

    match event {
        ProofEvent::ChallengeIssued { challenge } => {
            check_new_challenge(record, &challenge)?;
            let note = format!("challenge issued to {}", challenge.profile);
            record.owner = Some(challenge.profile.clone());
            record.challenge = Some(challenge);
            record.record_transition(to, note, now);
        }
        ProofEvent::ChallengeReissued { challenge } => {
            let live = record
                .challenge
                .as_ref()
                .map(|current| current.is_live(now))
                .unwrap_or(false);
            if live {
                return Err(ProofError::invalid_transition(from, "challenge_reissued"));
            }
            check_new_challenge(record, &challenge)?;
            let note = format!("challenge reissued to {}", challenge.profile);
            record.owner = Some(challenge.profile.clone());
            record.challenge = Some(challenge);
            record.record_transition(to, note, now);
        }
        ProofEvent::ChallengeExpired { challenge } => {
            check_current_challenge(record, &challenge, ChallengeStatus::Expired, "challenge_expired")?;
            record.challenge = Some(challenge);
            record.record_transition(to, "challenge expired", now);
        }
        ProofEvent::ChallengeConfirmed { challenge } => {
            check_current_challenge(
                record,
                &challenge,
                ChallengeStatus::Confirmed,
                "challenge_confirmed",
            )?;
            let note = format!("ownership confirmed for {}", challenge.profile);
            record.challenge = Some(challenge);
            record.record_transition(to, note, now);
        }
        ProofEvent::Anchored { receipt } => {
            let confirmed = record
                .challenge
                .as_ref()
                .map(|c| c.status == ChallengeStatus::Confirmed)
                .unwrap_or(false);
            if !confirmed {
                return Err(ProofError::invalid_transition(from, "anchored"));
            }
            if !receipt.is_complete() {
                return Err(ProofError::InvalidInput(
                    "anchor receipt has no transaction id".to_string(),
                ));
            }
            if receipt.fingerprint != record.digest() {
                return Err(ProofError::InvalidInput(format!(
                    "receipt is for {}, record is for {}",
                    receipt.fingerprint,
                    record.digest()
                )));
            }
            if record.owner.as_ref() != Some(&receipt.owner) {
                return Err(ProofError::InvalidInput(format!(
                    "receipt owner {} does not match the verified profile",
                    receipt.owner
                )));
            }
            let note = format!("anchored in tx {}", receipt.transaction_id);
            record.receipt = Some(receipt);
            record.record_transition(to, note, now);
        }
    }
    Ok(())
}

/// Anchored → Revoked. Prior history is kept.
pub fn revoke(record: &mut ProofRecord, reason: &str, now: DateTime<Utc>) -> Result<(), ProofError> {
    if record.state != ProofState::Anchored {
        return Err(ProofError::invalid_transition(record.state, "revoke"));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ProofError::InvalidInput("revocation needs a reason".to_string()));
    }
    record.revocation = Some(Revocation {
        reason: reason.to_string(),
        revoked_at: now,
    });
    record.record_transition(ProofState::Revoked, format!("revoked: {}", reason), now);
    Ok(())
}

fn check_new_challenge(record: &ProofRecord, challenge: &VerificationChallenge) -> Result<(), ProofError> {
    if challenge.fingerprint != record.digest() {
        return Err(ProofError::InvalidInput(format!(
            "challenge targets {}, record is for {}",
            challenge.fingerprint,
            record.digest()
        )));
    }
    if challenge.status != ChallengeStatus::Pending {
        return Err(ProofError::InvalidInput(format!(
            "new challenge must be pending, got {}",
            challenge.status
        )));
    }
    Ok(())
}

fn check_current_challenge(
    record: &ProofRecord,
    challenge: &VerificationChallenge,
    expected: ChallengeStatus,
    event: &str,
) -> Result<(), ProofError> {
    let same = record
        .challenge
        .as_ref()
        .map(|current| current.id == challenge.id)
        .unwrap_or(false);
    if !same || challenge.status != expected {
        return Err(ProofError::invalid_transition(record.state, event));
    }
    Ok(())
}
