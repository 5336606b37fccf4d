//! End-to-end tests of the /v1 API over an in-process router.
//!
//! Platforms and the ledger are the in-memory backends; time is a manual clock.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use pom_anchor::InMemoryLedger;
use pom_api::{create_app, ProofService};
use pom_core::{Config, ManualClock, PlatformKind};
use pom_registry::ProofRegistry;
use pom_verify::{PlatformDirectory, StaticPlatform};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    twitter: Arc<StaticPlatform>,
    ledger: Arc<InMemoryLedger>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    harness_with(Config::default())
}

fn harness_with(mut config: Config) -> Harness {
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 2;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let twitter = Arc::new(StaticPlatform::new(PlatformKind::Twitter));
    let ledger = Arc::new(InMemoryLedger::new(100, 1));
    let service = ProofService::new(
        &config,
        PlatformDirectory::new().with(twitter.clone()),
        ledger.clone(),
        Arc::new(ProofRegistry::new()),
        clock.clone(),
    )
    .unwrap();

    Harness {
        app: create_app(Arc::new(service)),
        twitter,
        ledger,
        clock,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn start(app: &Router, text: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/alice/status/1", "content": text })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (
        body["id"].as_str().unwrap().to_string(),
        body["fingerprint"]["digest"].as_str().unwrap().to_string(),
    )
}

async fn challenge(app: &Router, id: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        &format!("/v1/proofs/{}/challenge", id),
        Some(json!({ "profile": "twitter:alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["challenge"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_proof_workflow() {
    let h = harness();
    let (id, digest) = start(&h.app, "a dream caused by the flight of a bee").await;
    assert!(digest.starts_with("0x"));

    let code = challenge(&h.app, &id).await;

    // Nothing posted yet
    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["state"], "challenged");

    h.twitter.publish("alice", format!("claiming my work {}", code));
    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["state"], "anchored");
    assert!(!body["receipt"]["transaction_id"].as_str().unwrap().is_empty());
    assert_eq!(h.ledger.len(), 1);

    let (status, body) = call(&h.app, "GET", &format!("/v1/fingerprints/{}", digest), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["owner"], "twitter:alice");

    // Confirming again is a no-op
    let (status, _) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_resubmitting_anchored_content_conflicts() {
    let h = harness();
    let (id, _) = start(&h.app, "persistence").await;
    let code = challenge(&h.app, &id).await;
    h.twitter.publish("alice", code);
    let (status, _) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/bob/status/2", "content": "persistence" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate_anchor");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_confirm_on_draft_is_invalid_transition() {
    let h = harness();
    let (id, _) = start(&h.app, "draft only").await;

    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_transition");
}

#[tokio::test]
async fn test_expired_challenge_then_reissue() {
    let h = harness();
    let (id, _) = start(&h.app, "ephemeral").await;
    let first = challenge(&h.app, &id).await;

    h.twitter.publish("alice", first.clone());
    h.clock.advance(ChronoDuration::hours(25));

    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "challenge_expired");

    let (_, record) = call(&h.app, "GET", &format!("/v1/proofs/{}", id), None).await;
    assert_eq!(record["challenge"]["status"], "expired");
    assert_eq!(record["state"], "challenged");

    let second = challenge(&h.app, &id).await;
    h.twitter.publish("alice", second);
    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["state"], "anchored");
}

#[tokio::test]
async fn test_ledger_outage_keeps_record_verified_for_retry() {
    let h = harness();
    let (id, _) = start(&h.app, "outage").await;
    let code = challenge(&h.app, &id).await;
    h.twitter.publish("alice", code);

    h.ledger.set_unavailable(true);
    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["retryable"], true);

    let (_, record) = call(&h.app, "GET", &format!("/v1/proofs/{}", id), None).await;
    assert_eq!(record["state"], "verified");

    h.ledger.set_unavailable(false);
    let (status, body) = call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "anchored");
}

#[tokio::test]
async fn test_revoke_keeps_history() {
    let h = harness();
    let (id, _) = start(&h.app, "regret").await;
    let code = challenge(&h.app, &id).await;
    h.twitter.publish("alice", code);
    call(&h.app, "POST", &format!("/v1/proofs/{}/confirm", id), None).await;

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/v1/proofs/{}/revoke", id),
        Some(json!({ "reason": "wrong file" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "revoked");
    assert_eq!(body["revocation"]["reason"], "wrong file");
    assert_eq!(body["history"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_input_errors() {
    let h = harness();

    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/a/status/1", "content": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "unsupported_content_type");

    let (status, _) = call(&h.app, "GET", "/v1/proofs/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        &h.app,
        "GET",
        &format!("/v1/proofs/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (id, _) = start(&h.app, "profile check").await;
    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/v1/proofs/{}/challenge", id),
        Some(json!({ "profile": "instagram:alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_large_content_up_to_the_configured_limit() {
    let h = harness();
    let text = "a".repeat(3 * 1024 * 1024);
    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/alice/status/9", "content": text })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "draft");
}

#[tokio::test]
async fn test_content_over_the_configured_limit() {
    let mut config = Config::default();
    config.fingerprint.max_content_bytes = 1024;
    let h = harness_with(config);

    // Within the body allowance, rejected by the fingerprint engine
    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/alice/status/9", "content": "a".repeat(2048) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "unsupported_content_type");

    // Past the body allowance, rejected before parsing
    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/proofs",
        Some(json!({ "source_url": "https://twitter.com/alice/status/9", "content": "a".repeat(1024 * 1024) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "unsupported_content_type");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let h = harness();
    start(&h.app, "counted").await;

    let (status, body) = call(&h.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records"]["total"], 1);

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("pom_proofs_started_total 1"));
}

#[tokio::test]
async fn test_service_from_example_config_with_journal() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let example = std::path::Path::new(&manifest_dir).join("../../config/pom.example.yaml");
    let mut config = Config::load(&example).unwrap();

    let dir = tempfile::tempdir().unwrap();
    config.registry.journal_path = Some(dir.path().join("registry.jsonl"));

    let id = {
        let service = ProofService::from_config(&config).unwrap();
        assert!(service.registry().is_durable());
        service
            .start_proof(b"journaled", "https://mastodon.social/@alice/1")
            .await
            .unwrap()
            .id
    };

    let reopened = ProofService::from_config(&config).unwrap();
    assert_eq!(reopened.status(id).unwrap().state, pom_core::ProofState::Draft);
}
