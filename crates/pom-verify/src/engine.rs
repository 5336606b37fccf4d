//! Ownership Verification Engine
//!
//! ```text
//! issue_challenge ──► Pending ──confirm (code found)──► Confirmed
//!                        │
//!                        └──confirm (deadline passed)─► Expired
//! ```
//!
//! `confirm_challenge` is a single poll. Callers retry it; the engine never loops.
use crate::code::CodeGenerator;
use crate::platform::PlatformDirectory;
use chrono::Duration as ChronoDuration;
use pom_core::config::Config;
use pom_core::{
    ChallengeStatus, Clock, ContentFingerprint, ProfileHandle, ProofError, VerificationChallenge,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct VerificationEngine {
    platforms: PlatformDirectory,
    codes: CodeGenerator,
    ttl: ChronoDuration,
    poll_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl VerificationEngine {
    pub fn new(
        platforms: PlatformDirectory,
        codes: CodeGenerator,
        ttl: ChronoDuration,
        poll_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platforms,
            codes,
            ttl,
            poll_timeout,
            clock,
        }
    }

    pub fn from_config(
        config: &Config,
        platforms: PlatformDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            platforms,
            CodeGenerator::new(config.challenge.code_length),
            ChronoDuration::seconds(config.challenge.ttl_secs as i64),
            config.timeouts.poll(),
            clock,
        )
    }

    pub fn platforms(&self) -> &PlatformDirectory {
        &self.platforms
    }

    pub fn issue_challenge(
        &self,
        fingerprint: &ContentFingerprint,
        profile: ProfileHandle,
    ) -> Result<VerificationChallenge, ProofError> {
        self.platforms.get(profile.platform())?;

        let now = self.clock.now();
        let challenge = VerificationChallenge {
            id: Uuid::new_v4(),
            code: self.codes.generate(),
            fingerprint: fingerprint.digest,
            profile,
            issued_at: now,
            expires_at: now + self.ttl,
            status: ChallengeStatus::Pending,
            resolved_at: None,
        };

        tracing::info!(
            challenge_id = %challenge.id,
            digest = %fingerprint.digest.short(),
            profile = %challenge.profile,
            expires_at = %challenge.expires_at,
            "challenge issued"
        );
        Ok(challenge)
    }

    /// Poll the challenge's profile once and update its status.
    ///
    /// Terminal challenges are returned unchanged. A deadline that passes while
    /// the poll is in flight yields `Expired` even if the code was found. On a
    /// failed or timed-out poll the challenge is left `Pending`.
    pub async fn confirm_challenge(
        &self,
        challenge: &mut VerificationChallenge,
    ) -> Result<ChallengeStatus, ProofError> {
        if challenge.status.is_terminal() {
            return Ok(challenge.status);
        }

        let now = self.clock.now();
        if challenge.is_past_deadline(now) {
            return Ok(expire(challenge, now));
        }

        let platform = self.platforms.get(challenge.profile.platform())?;
        let posts = tokio::time::timeout(
            self.poll_timeout,
            platform.fetch_recent_posts(challenge.profile.handle()),
        )
        .await
        .map_err(|_| ProofError::timeout("platform.fetch_recent_posts", self.poll_timeout))??;

        let polled_at = self.clock.now();
        if challenge.is_past_deadline(polled_at) {
            return Ok(expire(challenge, polled_at));
        }

        if posts.iter().any(|body| body.contains(&challenge.code)) {
            challenge.status = ChallengeStatus::Confirmed;
            challenge.resolved_at = Some(polled_at);
            tracing::info!(
                challenge_id = %challenge.id,
                profile = %challenge.profile,
                "challenge confirmed"
            );
        } else {
            tracing::debug!(
                challenge_id = %challenge.id,
                profile = %challenge.profile,
                scanned = posts.len(),
                "code not posted yet"
            );
        }
        Ok(challenge.status)
    }
}

fn expire(challenge: &mut VerificationChallenge, now: chrono::DateTime<chrono::Utc>) -> ChallengeStatus {
    challenge.status = ChallengeStatus::Expired;
    challenge.resolved_at = Some(now);
    tracing::info!(challenge_id = %challenge.id, profile = %challenge.profile, "challenge expired");
    ChallengeStatus::Expired
}
