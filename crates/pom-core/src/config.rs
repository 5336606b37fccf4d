//! Service configuration (YAML file + environment overrides)
use crate::data_model::PlatformKind;
use crate::error::ProofError;
use crate::fingerprint::DEFAULT_MAX_CONTENT_BYTES;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the YAML config file
pub const CONFIG_ENV: &str = "POM_CONFIG";
/// Environment variable overriding `listen_addr`
pub const ADDR_ENV: &str = "POM_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub challenge: ChallengeConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryPolicy,
    pub fingerprint: FingerprintConfig,
    pub platforms: Vec<PlatformConfig>,
    pub ledger: LedgerConfig,
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8787".to_string(),
            challenge: ChallengeConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryPolicy::default(),
            fingerprint: FingerprintConfig::default(),
            platforms: Vec::new(),
            ledger: LedgerConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// How long an issued code stays valid
    pub ttl_secs: u64,
    /// Number of characters in a code
    pub code_length: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            code_length: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on a single social-platform poll
    pub poll_ms: u64,
    /// Bound on a single ledger call
    pub ledger_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10_000,
            ledger_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn ledger(&self) -> Duration {
        Duration::from_millis(self.ledger_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub max_content_bytes: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }
}

/// Which collaborator answers "recent posts" for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    #[serde(flatten)]
    pub backend: PlatformBackend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum PlatformBackend {
    /// In-process feed, seeded from config (development and tests)
    Static {
        #[serde(default)]
        posts: HashMap<String, Vec<String>>,
    },
    /// JSON feed served at `{base_url}/{handle}/posts`
    HttpFeed {
        base_url: String,
        #[serde(default)]
        max_posts: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum LedgerConfig {
    /// Hash-chained ledger held in memory
    Memory {
        initial_balance: u64,
        commit_fee: u64,
    },
    /// Remote anchoring gateway
    Http { endpoint: String },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::Memory {
            initial_balance: 1_000_000,
            commit_fee: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Append-only JSON-lines journal; registry is memory-only when unset
    pub journal_path: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ProofError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ProofError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProofError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ProofError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// `POM_CONFIG` file (or defaults), then `POM_ADDR`.
    pub fn from_env() -> Result<Self, ProofError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var(ADDR_ENV) {
            config.listen_addr = addr;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProofError> {
        if self.listen_addr.trim().is_empty() {
            return Err(ProofError::Config("listen_addr is empty".into()));
        }
        if self.challenge.ttl_secs == 0 {
            return Err(ProofError::Config("challenge.ttl_secs must be positive".into()));
        }
        if !(4..=32).contains(&self.challenge.code_length) {
            return Err(ProofError::Config(format!(
                "challenge.code_length {} is outside 4..=32",
                self.challenge.code_length
            )));
        }
        if self.timeouts.poll_ms == 0 || self.timeouts.ledger_ms == 0 {
            return Err(ProofError::Config("timeouts must be positive".into()));
        }
        if self.fingerprint.max_content_bytes == 0 {
            return Err(ProofError::Config("fingerprint.max_content_bytes must be positive".into()));
        }
        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if !seen.insert(platform.kind) {
                return Err(ProofError::Config(format!(
                    "platform {} is configured twice",
                    platform.kind
                )));
            }
            if let PlatformBackend::HttpFeed { base_url, .. } = &platform.backend {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(ProofError::Config(format!(
                        "platform {} base_url '{}' is not an http(s) url",
                        platform.kind, base_url
                    )));
                }
            }
        }
        if let LedgerConfig::Http { endpoint } = &self.ledger {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ProofError::Config(format!(
                    "ledger endpoint '{}' is not an http(s) url",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}
