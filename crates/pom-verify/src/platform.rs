//! Social platform collaborators
//!
//! The engine only ever reads recent posts; it never writes to a platform.
//! One implementation is registered per platform, chosen by configuration.
use crate::http_feed::HttpFeedPlatform;
use async_trait::async_trait;
use pom_core::config::{PlatformBackend, PlatformConfig};
use pom_core::{PlatformKind, ProofError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[async_trait]
pub trait SocialPlatform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Backend name for logs (e.g. "static", "http_feed")
    fn backend(&self) -> &'static str;

    /// Bodies of the profile's most recent posts, newest first.
    async fn fetch_recent_posts(&self, handle: &str) -> Result<Vec<String>, ProofError>;
}

/// In-process feed. Posts are published through [`StaticPlatform::publish`].
pub struct StaticPlatform {
    kind: PlatformKind,
    posts: RwLock<HashMap<String, Vec<String>>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl StaticPlatform {
    pub fn new(kind: PlatformKind) -> Self {
        Self::with_posts(kind, HashMap::new())
    }

    pub fn with_posts(kind: PlatformKind, posts: HashMap<String, Vec<String>>) -> Self {
        Self {
            kind,
            posts: RwLock::new(posts),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Add a post to the front of `handle`'s feed.
    pub fn publish(&self, handle: &str, body: impl Into<String>) {
        let mut posts = self.posts.write().unwrap_or_else(|p| p.into_inner());
        posts.entry(handle.to_string()).or_default().insert(0, body.into());
    }

    pub fn clear(&self, handle: &str) {
        let mut posts = self.posts.write().unwrap_or_else(|p| p.into_inner());
        posts.remove(handle);
    }

    /// Make every fetch fail with `PlatformUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every fetch, to exercise caller timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl SocialPlatform for StaticPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn backend(&self) -> &'static str {
        "static"
    }

    async fn fetch_recent_posts(&self, handle: &str) -> Result<Vec<String>, ProofError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProofError::PlatformUnavailable(format!(
                "{} feed is offline",
                self.kind
            )));
        }
        let posts = self.posts.read().unwrap_or_else(|p| p.into_inner());
        Ok(posts.get(handle).cloned().unwrap_or_default())
    }
}

/// Platform kind → collaborator.
#[derive(Clone, Default)]
pub struct PlatformDirectory {
    platforms: HashMap<PlatformKind, Arc<dyn SocialPlatform>>,
}

impl PlatformDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `platform`, replacing any earlier one for the same kind.
    pub fn register(&mut self, platform: Arc<dyn SocialPlatform>) {
        self.platforms.insert(platform.kind(), platform);
    }

    pub fn with(mut self, platform: Arc<dyn SocialPlatform>) -> Self {
        self.register(platform);
        self
    }

    pub fn get(&self, kind: PlatformKind) -> Result<Arc<dyn SocialPlatform>, ProofError> {
        self.platforms.get(&kind).cloned().ok_or_else(|| {
            ProofError::InvalidInput(format!("no platform configured for {}", kind))
        })
    }

    pub fn contains(&self, kind: PlatformKind) -> bool {
        self.platforms.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<PlatformKind> {
        let mut kinds: Vec<_> = self.platforms.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn from_config(
        configs: &[PlatformConfig],
        request_timeout: Duration,
    ) -> Result<Self, ProofError> {
        let mut directory = Self::new();
        for config in configs {
            let platform: Arc<dyn SocialPlatform> = match &config.backend {
                PlatformBackend::Static { posts } => {
                    Arc::new(StaticPlatform::with_posts(config.kind, posts.clone()))
                }
                PlatformBackend::HttpFeed { base_url, max_posts } => {
                    let mut feed = HttpFeedPlatform::new(config.kind, base_url, request_timeout)?;
                    if let Some(max) = max_posts {
                        feed = feed.with_max_posts(*max);
                    }
                    Arc::new(feed)
                }
            };
            tracing::info!(platform = %config.kind, backend = platform.backend(), "platform registered");
            directory.register(platform);
        }
        Ok(directory)
    }
}
