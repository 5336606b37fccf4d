//! Remote ledger over JSON/HTTP.
//!
//! - `POST {endpoint}/commits` with `{"digest", "owner"}` returns a [`LedgerEntry`]
//! - `GET {endpoint}/commits/{digest}` returns a [`LedgerEntry`] or 404

use crate::ledger::{Ledger, LedgerEntry};
use async_trait::async_trait;
use pom_core::{Digest, ProfileHandle, ProofError};
use serde::Serialize;
use std::time::Duration;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpLedger {
    endpoint: String,
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    digest: &'a Digest,
    owner: &'a ProfileHandle,
}

impl HttpLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ProofError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ProofError::Config(format!("ledger http client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(e: reqwest::Error) -> ProofError {
    if e.is_timeout() {
        ProofError::LedgerUnavailable(format!("ledger timed out: {}", e))
    } else if e.is_connect() {
        ProofError::LedgerUnavailable(format!("ledger unreachable: {}", e))
    } else {
        ProofError::LedgerUnavailable(e.to_string())
    }
}

async fn error_for_status(response: reqwest::Response, digest: &Digest) -> ProofError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        402 => ProofError::InsufficientFunds(format!("ledger refused payment: {}", body)),
        409 => ProofError::DuplicateAnchor(digest.to_string()),
        400 | 422 => ProofError::InvalidInput(format!("ledger rejected request: {}", body)),
        _ => ProofError::LedgerUnavailable(format!("ledger returned HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn commit(&self, digest: &Digest, owner: &ProfileHandle) -> Result<LedgerEntry, ProofError> {
        let url = format!("{}/commits", self.endpoint);
        let response = self
            .http_client
            .post(&url)
            .json(&CommitRequest { digest, owner })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response, digest).await);
        }

        let entry: LedgerEntry = response
            .json()
            .await
            .map_err(|e| ProofError::LedgerUnavailable(format!("malformed commit response: {}", e)))?;

        tracing::debug!(
            digest = %digest.short(),
            tx = %entry.transaction_id,
            sequence = entry.sequence_number,
            "ledger commit accepted"
        );
        Ok(entry)
    }

    async fn find(&self, digest: &Digest) -> Result<Option<LedgerEntry>, ProofError> {
        let url = format!("{}/commits/{}", self.endpoint, digest);
        let response = self.http_client.get(&url).send().await.map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for_status(response, digest).await);
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| ProofError::LedgerUnavailable(format!("malformed ledger entry: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use chrono::Utc;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeLedger {
        entries: Mutex<HashMap<Digest, LedgerEntry>>,
        broke: Mutex<bool>,
    }

    #[derive(Deserialize)]
    struct Body {
        digest: Digest,
        owner: ProfileHandle,
    }

    async fn commit(State(ledger): State<Arc<FakeLedger>>, Json(body): Json<Body>) -> Response {
        if body.owner.handle() == "pauper" {
            return (StatusCode::PAYMENT_REQUIRED, "no funds").into_response();
        }
        let mut entries = ledger.entries.lock().unwrap();
        if entries.contains_key(&body.digest) {
            return (StatusCode::CONFLICT, "exists").into_response();
        }
        let entry = LedgerEntry {
            digest: body.digest,
            owner: body.owner,
            transaction_id: format!("0xtx{}", entries.len() + 1),
            sequence_number: entries.len() as u64 + 1,
            committed_at: Utc::now(),
        };
        entries.insert(body.digest, entry.clone());
        (StatusCode::CREATED, Json(entry)).into_response()
    }

    async fn find(State(ledger): State<Arc<FakeLedger>>, Path(digest): Path<String>) -> Response {
        if *ledger.broke.lock().unwrap() {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let digest: Digest = digest.parse().unwrap();
        match ledger.entries.lock().unwrap().get(&digest) {
            Some(entry) => Json(entry.clone()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn serve() -> (String, Arc<FakeLedger>) {
        let ledger = Arc::new(FakeLedger::default());
        let app = Router::new()
            .route("/commits", post(commit))
            .route("/commits/{digest}", get(find))
            .with_state(ledger.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), ledger)
    }

    #[tokio::test]
    async fn test_commit_and_find() {
        let (endpoint, _) = serve().await;
        let ledger = HttpLedger::new(&endpoint, Duration::from_secs(5)).unwrap();
        let digest = Digest::from_bytes([9; 32]);
        let owner: ProfileHandle = "twitter:alice".parse().unwrap();

        assert_eq!(ledger.find(&digest).await.unwrap(), None);
        let entry = ledger.commit(&digest, &owner).await.unwrap();
        assert_eq!(entry.sequence_number, 1);
        assert_eq!(ledger.find(&digest).await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (endpoint, fake) = serve().await;
        let ledger = HttpLedger::new(&endpoint, Duration::from_secs(5)).unwrap();
        let digest = Digest::from_bytes([8; 32]);

        let err = ledger
            .commit(&digest, &"twitter:pauper".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::InsufficientFunds(_)));

        ledger.commit(&digest, &"twitter:alice".parse().unwrap()).await.unwrap();
        let err = ledger
            .commit(&digest, &"twitter:alice".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::DuplicateAnchor(_)));

        *fake.broke.lock().unwrap() = true;
        let err = ledger.find(&digest).await.unwrap_err();
        assert!(matches!(err, ProofError::LedgerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ledger = HttpLedger::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = ledger
            .commit(&Digest::from_bytes([1; 32]), &"twitter:alice".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
