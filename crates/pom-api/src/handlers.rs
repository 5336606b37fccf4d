//! API Handlers
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use pom_core::{Digest, ProfileHandle, ProofError, ProofState, POM_VERSION};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// `ProofError` rendered as `{"error": {"code", "message", "retryable"}}`.
#[derive(Debug)]
pub struct ApiError(pub ProofError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ProofError::UnsupportedContentType(_) | ProofError::InvalidInput(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ProofError::ChallengeExpired(_) => StatusCode::GONE,
            ProofError::LedgerUnavailable(_)
            | ProofError::PlatformUnavailable(_)
            | ProofError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProofError::DuplicateAnchor(_) | ProofError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            ProofError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            ProofError::NotFound(_) => StatusCode::NOT_FOUND,
            ProofError::Storage(_) | ProofError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProofError> for ApiError {
    fn from(e: ProofError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self(ProofError::UnsupportedContentType(
                "request body exceeds the content size limit".to_string(),
            ));
        }
        Self(ProofError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the logs
        let message = match &self.0 {
            ProofError::Storage(_) | ProofError::Config(_) => "internal error".to_string(),
            e => e.to_string(),
        };
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": message,
                "retryable": self.0.is_retryable(),
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|e| ApiError(ProofError::InvalidInput(format!("proof id '{}': {}", raw, e))))
}

#[derive(Debug, Deserialize)]
pub struct StartProofRequest {
    pub source_url: String,
    /// UTF-8 text content
    #[serde(default)]
    pub content: Option<String>,
    /// Binary content (images), standard base64
    #[serde(default)]
    pub content_base64: Option<String>,
}

impl StartProofRequest {
    fn content_bytes(&self) -> Result<Vec<u8>, ProofError> {
        match (&self.content, &self.content_base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ProofError::InvalidInput(format!("content_base64: {}", e))),
            _ => Err(ProofError::InvalidInput(
                "exactly one of content or content_base64 is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    /// `platform:handle`, e.g. `twitter:alice`
    pub profile: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

pub async fn start_proof(
    State(state): State<AppState>,
    payload: Result<Json<StartProofRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let content = request.content_bytes()?;
    let record = state.start_proof(&content, &request.source_url).await?;
    let location = format!("/v1/proofs/{}", record.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(record),
    )
        .into_response())
}

pub async fn issue_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let Json(request) = payload?;
    let profile: ProfileHandle = request.profile.parse()?;
    let challenge = state.issue_challenge(id, profile).await?;
    let instructions = challenge.instructions();
    Ok(Json(json!({
        "challenge": challenge,
        "instructions": instructions,
    }))
    .into_response())
}

pub async fn confirm_challenge(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let record = state.confirm_challenge(id).await?;
    let status = if record.state == ProofState::Anchored {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(record)).into_response())
}

pub async fn get_proof(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    Ok(Json(state.status(id)?).into_response())
}

pub async fn get_fingerprint(State(state): State<AppState>, Path(digest): Path<String>) -> ApiResult {
    let digest: Digest = digest.parse()?;
    Ok(Json(state.lookup_by_fingerprint(&digest)?).into_response())
}

pub async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RevokeRequest>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let Json(request) = payload?;
    Ok(Json(state.revoke(id, &request.reason).await?).into_response())
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": POM_VERSION,
            "records": state.stats(),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult {
    let body = state
        .metrics()
        .encode()
        .map_err(|e| ApiError(ProofError::Storage(format!("encode metrics: {}", e))))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
