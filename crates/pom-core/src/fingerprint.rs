//! Fingerprint Engine: canonical BLAKE3 digests for social-media content
//!
//! The digest depends on the content bytes only. Capture time and source URL
//! are carried on the fingerprint but never hashed, so the same post captured
//! twice yields the same digest.
use crate::data_model::{ContentFingerprint, ContentKind, Digest, DigestAlgorithm};
use crate::error::ProofError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const TEXT_TAG: &[u8] = b"pom/text/v1\0";
const IMAGE_TAG: &[u8] = b"pom/image/v1\0";
const COMPOSITE_TAG: &[u8] = b"pom/composite/v1\0";

/// Default upper bound on a single content body (16 MiB)
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 16 * 1024 * 1024;

static DYNAMIC_EMBED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(script|iframe|embed|object)\b").expect("valid embed regex")
});

static SOURCE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/?#]+\S*$").expect("valid url regex"));

#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    max_content_bytes: usize,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_BYTES)
    }
}

impl FingerprintEngine {
    pub fn new(max_content_bytes: usize) -> Self {
        Self { max_content_bytes }
    }

    pub fn max_content_bytes(&self) -> usize {
        self.max_content_bytes
    }

    pub fn compute_fingerprint(
        &self,
        content: &[u8],
        source_url: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<ContentFingerprint, ProofError> {
        validate_source_url(source_url)?;
        let (kind, digest) = self.digest_part(content)?;

        tracing::debug!(digest = %digest.short(), kind = ?kind, bytes = content.len(), "fingerprint computed");

        Ok(ContentFingerprint {
            digest,
            algorithm: DigestAlgorithm::Blake3,
            kind,
            source_url: source_url.to_string(),
            captured_at,
        })
    }

    /// Fingerprint a post made of several parts (e.g. caption + images).
    /// Part order is significant.
    pub fn compute_composite(
        &self,
        parts: &[&[u8]],
        source_url: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<ContentFingerprint, ProofError> {
        validate_source_url(source_url)?;
        if parts.is_empty() {
            return Err(ProofError::UnsupportedContentType(
                "composite content has no parts".to_string(),
            ));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(COMPOSITE_TAG);
        hasher.update(&(parts.len() as u64).to_le_bytes());
        for (index, part) in parts.iter().enumerate() {
            let (kind, digest) = self.digest_part(part).map_err(|e| match e {
                ProofError::UnsupportedContentType(msg) => {
                    ProofError::UnsupportedContentType(format!("part {}: {}", index, msg))
                }
                other => other,
            })?;
            hasher.update(&[kind.tag()]);
            hasher.update(digest.as_bytes());
        }

        Ok(ContentFingerprint {
            digest: Digest::from_bytes(*hasher.finalize().as_bytes()),
            algorithm: DigestAlgorithm::Blake3,
            kind: ContentKind::Composite,
            source_url: source_url.to_string(),
            captured_at,
        })
    }

    /// Recompute and compare against an earlier single-part fingerprint.
    /// Composite fingerprints go through [`Self::verify_composite`].
    pub fn verify(&self, content: &[u8], fingerprint: &ContentFingerprint) -> bool {
        if fingerprint.kind == ContentKind::Composite {
            return false;
        }
        match self.digest_part(content) {
            Ok((_, digest)) => {
                fingerprint.algorithm == DigestAlgorithm::Blake3 && digest == fingerprint.digest
            }
            Err(_) => false,
        }
    }

    /// Recompute a composite from its ordered parts and compare.
    pub fn verify_composite(&self, parts: &[&[u8]], fingerprint: &ContentFingerprint) -> bool {
        if fingerprint.kind != ContentKind::Composite {
            return false;
        }
        match self.compute_composite(parts, &fingerprint.source_url, fingerprint.captured_at) {
            Ok(recomputed) => {
                fingerprint.algorithm == DigestAlgorithm::Blake3 && recomputed.digest == fingerprint.digest
            }
            Err(_) => false,
        }
    }

    fn digest_part(&self, content: &[u8]) -> Result<(ContentKind, Digest), ProofError> {
        if content.is_empty() {
            return Err(ProofError::UnsupportedContentType("content is empty".to_string()));
        }
        if content.len() > self.max_content_bytes {
            return Err(ProofError::UnsupportedContentType(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                self.max_content_bytes
            )));
        }

        if detect_image(content).is_some() {
            return Ok((ContentKind::Image, tagged_hash(IMAGE_TAG, content)));
        }

        let text = std::str::from_utf8(content).map_err(|_| {
            ProofError::UnsupportedContentType("unrecognized binary content".to_string())
        })?;
        if DYNAMIC_EMBED_RE.is_match(text) {
            return Err(ProofError::UnsupportedContentType(
                "dynamic embeds cannot be canonicalized".to_string(),
            ));
        }
        let canonical = canonicalize_text(text);
        if canonical.is_empty() {
            return Err(ProofError::UnsupportedContentType(
                "content is blank after normalization".to_string(),
            ));
        }
        Ok((ContentKind::Text, tagged_hash(TEXT_TAG, canonical.as_bytes())))
    }
}

fn tagged_hash(tag: &[u8], bytes: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tag);
    hasher.update(bytes);
    Digest::from_bytes(*hasher.finalize().as_bytes())
}

fn validate_source_url(source_url: &str) -> Result<(), ProofError> {
    if SOURCE_URL_RE.is_match(source_url) {
        Ok(())
    } else {
        Err(ProofError::InvalidInput(format!(
            "source url '{}' must be an http(s) url",
            source_url
        )))
    }
}

/// Image MIME type from magic bytes.
pub fn detect_image(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// BOM stripped, line endings unified, trailing whitespace and blank tail removed.
pub fn canonicalize_text(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(|line| line.trim_end()).collect();
    lines.join("\n").trim_end_matches('\n').to_string()
}
