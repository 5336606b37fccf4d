//! Data Model: ContentFingerprint, VerificationChallenge, AnchorReceipt, ProofRecord
use crate::error::ProofError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// DIGEST
// ============================================================================

/// 256-bit content digest, rendered as `0x` followed by 64 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(hex_part)
            .map_err(|e| ProofError::InvalidInput(format!("digest '{}': {}", s, e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            ProofError::InvalidInput(format!("digest '{}' must be {} bytes", s, Self::LEN))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Blake3,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// Canonical form the content was hashed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Composite,
}

impl ContentKind {
    /// Single-byte tag mixed into composite digests.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Text => 0x01,
            Self::Image => 0x02,
            Self::Composite => 0x03,
        }
    }
}

/// Identifies one piece of content at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub digest: Digest,
    pub algorithm: DigestAlgorithm,
    pub kind: ContentKind,
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
}

impl ContentFingerprint {
    /// Two fingerprints name the same content when digest and algorithm agree,
    /// whatever their capture time or URL.
    pub fn same_content(&self, other: &ContentFingerprint) -> bool {
        self.digest == other.digest && self.algorithm == other.algorithm
    }
}

// ============================================================================
// PROFILES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Twitter,
    Instagram,
    Tiktok,
    Mastodon,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::Twitter,
        PlatformKind::Instagram,
        PlatformKind::Tiktok,
        PlatformKind::Mastodon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Mastodon => "mastodon",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Self::Twitter),
            "instagram" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::Tiktok),
            "mastodon" => Ok(Self::Mastodon),
            other => Err(ProofError::InvalidInput(format!("unknown platform '{}'", other))),
        }
    }
}

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("valid handle regex"));

static FEDERATED_HANDLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]{1,64}@[A-Za-z0-9.\-]{1,253}$").expect("valid handle regex")
});

/// A social profile, written `platform:handle` (e.g. `twitter:alice`).
///
/// The profile a challenge was confirmed on is the owner identity bound to the proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileHandle {
    platform: PlatformKind,
    handle: String,
}

impl ProfileHandle {
    pub fn new(platform: PlatformKind, handle: &str) -> Result<Self, ProofError> {
        let handle = handle.trim().trim_start_matches('@');
        let valid = match platform {
            PlatformKind::Mastodon => {
                HANDLE_RE.is_match(handle) || FEDERATED_HANDLE_RE.is_match(handle)
            }
            _ => HANDLE_RE.is_match(handle),
        };
        if !valid {
            return Err(ProofError::InvalidInput(format!(
                "invalid {} handle '{}'",
                platform, handle
            )));
        }
        Ok(Self {
            platform,
            handle: handle.to_string(),
        })
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }
}

impl fmt::Display for ProfileHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.handle)
    }
}

impl FromStr for ProfileHandle {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, handle) = s.split_once(':').ok_or_else(|| {
            ProofError::InvalidInput(format!("profile '{}' must look like platform:handle", s))
        })?;
        Self::new(platform.parse()?, handle)
    }
}

impl TryFrom<String> for ProfileHandle {
    type Error = ProofError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProfileHandle> for String {
    fn from(value: ProfileHandle) -> Self {
        value.to_string()
    }
}

// ============================================================================
// CHALLENGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Confirmed,
    Expired,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// One-time code the owner must post on `profile` before `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub id: Uuid,
    pub code: String,
    pub fingerprint: Digest,
    pub profile: ProfileHandle,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ChallengeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl VerificationChallenge {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Still pending and inside its deadline.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ChallengeStatus::Pending && !self.is_past_deadline(now)
    }

    pub fn instructions(&self) -> String {
        format!(
            "Post the code {} on {} before {}",
            self.code,
            self.profile,
            self.expires_at.to_rfc3339()
        )
    }
}

// ============================================================================
// ANCHOR RECEIPT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub fingerprint: Digest,
    pub owner: ProfileHandle,
    /// Name of the ledger backend that holds the commit
    pub ledger: String,
    pub transaction_id: String,
    pub sequence_number: u64,
    pub committed_at: DateTime<Utc>,
    /// True when rebuilt from an existing ledger commit instead of a fresh one
    #[serde(default)]
    pub reconciled: bool,
}

impl AnchorReceipt {
    pub fn is_complete(&self) -> bool {
        !self.transaction_id.trim().is_empty()
    }
}

// ============================================================================
// PROOF RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofState {
    Draft,
    Challenged,
    Verified,
    Anchored,
    Revoked,
}

impl ProofState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl fmt::Display for ProofState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Challenged => "challenged",
            Self::Verified => "verified",
            Self::Anchored => "anchored",
            Self::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// One entry of a record's audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ProofState>,
    pub to: ProofState,
    pub at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub reason: String,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub id: Uuid,
    pub fingerprint: ContentFingerprint,
    /// Profile the current challenge targets; becomes the owner identity once verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ProfileHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<VerificationChallenge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<AnchorReceipt>,
    pub state: ProofState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,
    #[serde(default)]
    pub history: Vec<StateChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProofRecord {
    pub fn draft(fingerprint: ContentFingerprint, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            owner: None,
            challenge: None,
            receipt: None,
            state: ProofState::Draft,
            revocation: None,
            history: vec![StateChange {
                from: None,
                to: ProofState::Draft,
                at: now,
                note: "proof started".to_string(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn digest(&self) -> Digest {
        self.fingerprint.digest
    }

    /// Whether this record reached Anchored at any point, revoked or not.
    pub fn ever_anchored(&self) -> bool {
        self.history.iter().any(|c| c.to == ProofState::Anchored)
    }

    /// Move to `to`, appending to the history. Guards live in the registry.
    pub fn record_transition(&mut self, to: ProofState, note: impl Into<String>, now: DateTime<Utc>) {
        self.history.push(StateChange {
            from: Some(self.state),
            to,
            at: now,
            note: note.into(),
        });
        self.state = to;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_text_form() {
        let digest = Digest::from_bytes([0xab; 32]);
        let text = digest.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<Digest>().unwrap(), digest);
        assert_eq!(text[2..].parse::<Digest>().unwrap(), digest);
        assert!("0x1234".parse::<Digest>().is_err());
        assert!("not hex".parse::<Digest>().is_err());
    }

    #[test]
    fn test_digest_serde() {
        let digest = Digest::from_bytes([7; 32]);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_profile_handle_parsing() {
        let profile: ProfileHandle = "twitter:@alice_b".parse().unwrap();
        assert_eq!(profile.platform(), PlatformKind::Twitter);
        assert_eq!(profile.handle(), "alice_b");
        assert_eq!(profile.to_string(), "twitter:alice_b");

        let fedi: ProfileHandle = "mastodon:carol@mastodon.social".parse().unwrap();
        assert_eq!(fedi.handle(), "carol@mastodon.social");

        assert!("twitter:carol@mastodon.social".parse::<ProfileHandle>().is_err());
        assert!("alice".parse::<ProfileHandle>().is_err());
        assert!("myspace:alice".parse::<ProfileHandle>().is_err());
        assert!("instagram:".parse::<ProfileHandle>().is_err());
        assert!("instagram:has space".parse::<ProfileHandle>().is_err());
    }

    #[test]
    fn test_profile_handle_serde_as_string() {
        let profile: ProfileHandle = "instagram:bob".parse().unwrap();
        let json = serde_json::to_string(&profile).unwrap();
        assert_eq!(json, "\"instagram:bob\"");
        let bad: Result<ProfileHandle, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_record_history() {
        let now = Utc::now();
        let fingerprint = ContentFingerprint {
            digest: Digest::from_bytes([1; 32]),
            algorithm: DigestAlgorithm::Blake3,
            kind: ContentKind::Text,
            source_url: "https://example.com/p/1".to_string(),
            captured_at: now,
        };
        let mut record = ProofRecord::draft(fingerprint, now);
        assert_eq!(record.state, ProofState::Draft);
        assert!(!record.ever_anchored());

        record.record_transition(ProofState::Challenged, "challenge issued", now);
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[1].from, Some(ProofState::Draft));
        assert_eq!(record.state, ProofState::Challenged);
    }
}
