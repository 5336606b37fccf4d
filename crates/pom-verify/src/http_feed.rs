//! HTTP feed collaborator.
//!
//! Sends `GET {base_url}/{handle}/posts` and expects
//! `{"posts": [{"body": "..."}, ...]}`, newest first.

use crate::platform::SocialPlatform;
use async_trait::async_trait;
use pom_core::{PlatformKind, ProofError};
use serde::Deserialize;
use std::time::Duration;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts considered per poll unless configured otherwise.
const DEFAULT_MAX_POSTS: usize = 20;

pub struct HttpFeedPlatform {
    kind: PlatformKind,
    base_url: String,
    max_posts: usize,
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    posts: Vec<FeedPost>,
}

#[derive(Debug, Deserialize)]
struct FeedPost {
    body: String,
}

impl HttpFeedPlatform {
    pub fn new(kind: PlatformKind, base_url: &str, timeout: Duration) -> Result<Self, ProofError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ProofError::Config(format!("http client for {}: {}", kind, e)))?;
        Ok(Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_posts: DEFAULT_MAX_POSTS,
            http_client,
        })
    }

    pub fn with_max_posts(mut self, max_posts: usize) -> Self {
        self.max_posts = max_posts;
        self
    }

    fn posts_url(&self, handle: &str) -> String {
        format!("{}/{}/posts", self.base_url, handle)
    }
}

#[async_trait]
impl SocialPlatform for HttpFeedPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn backend(&self) -> &'static str {
        "http_feed"
    }

    async fn fetch_recent_posts(&self, handle: &str) -> Result<Vec<String>, ProofError> {
        let url = self.posts_url(handle);

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProofError::PlatformUnavailable(format!("{} feed timed out: {}", self.kind, e))
            } else if e.is_connect() {
                ProofError::PlatformUnavailable(format!("{} feed unreachable: {}", self.kind, e))
            } else {
                ProofError::PlatformUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProofError::NotFound(format!("profile {}:{}", self.kind, handle)));
        }
        if !status.is_success() {
            return Err(ProofError::PlatformUnavailable(format!(
                "{} feed returned HTTP {}",
                self.kind, status
            )));
        }

        let feed: FeedResponse = response.json().await.map_err(|e| {
            ProofError::PlatformUnavailable(format!("{} feed is malformed: {}", self.kind, e))
        })?;

        tracing::debug!(platform = %self.kind, handle, posts = feed.posts.len(), "feed fetched");

        Ok(feed
            .posts
            .into_iter()
            .take(self.max_posts)
            .map(|p| p.body)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn posts(Path(handle): Path<String>) -> (StatusCode, Json<Value>) {
        match handle.as_str() {
            "alice" => (
                StatusCode::OK,
                Json(json!({ "posts": [
                    { "body": "verifying my memories: K7QX2M" },
                    { "body": "older post" },
                    { "body": "oldest post" }
                ]})),
            ),
            "broken" => (StatusCode::OK, Json(json!({ "items": [] }))),
            "flaky" => (StatusCode::BAD_GATEWAY, Json(json!({}))),
            _ => (StatusCode::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/{handle}/posts", get(posts));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_fetches_and_limits_posts() {
        let base = serve().await;
        let feed = HttpFeedPlatform::new(PlatformKind::Twitter, &base, Duration::from_secs(5))
            .unwrap()
            .with_max_posts(2);

        let posts = feed.fetch_recent_posts("alice").await.unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts[0].contains("K7QX2M"));
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let base = serve().await;
        let feed =
            HttpFeedPlatform::new(PlatformKind::Twitter, &base, Duration::from_secs(5)).unwrap();

        let err = feed.fetch_recent_posts("nobody").await.unwrap_err();
        assert!(matches!(err, ProofError::NotFound(_)));

        let err = feed.fetch_recent_posts("flaky").await.unwrap_err();
        assert!(err.is_retryable());

        let err = feed.fetch_recent_posts("broken").await.unwrap_err();
        assert!(matches!(err, ProofError::PlatformUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_retryable() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let feed = HttpFeedPlatform::new(
            PlatformKind::Mastodon,
            &format!("http://{}", addr),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = feed.fetch_recent_posts("alice").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
