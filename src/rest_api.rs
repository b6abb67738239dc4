//! REST management interface for the engine.
//!
//! A thin Axum layer over [`crate::engine::Engine`]: typed request/response
//! structs validate at the boundary, non-2xx responses are a JSON
//! `ErrorResponse { error, details }`, and every handler maps its
//! `Result` into a `StatusCode` via `IntoResponse`.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::connector::InboundMessage;
use crate::domain::message::StatisticsCounters;
use crate::domain_types::{ChannelId, ContentType, MessageId, MetaDataId};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::vm_router::VmRouter;

/// Collaborators shared across every channel built from a posted config.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub vm_router: Arc<VmRouter>,
    pub http_client: reqwest::Client,
}

/// Health check response for `/api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
}

/// Error response structure, returned as the body of every non-2xx
/// response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

impl From<&EngineError> for ErrorResponse {
    fn from(error: &EngineError) -> Self {
        Self { error: error.to_string(), details: None }
    }
}

fn engine_error_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::ChannelNotDeployed(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyDeployed(_) => StatusCode::CONFLICT,
        EngineError::InvalidState(_) => StatusCode::CONFLICT,
        EngineError::Config(_) => StatusCode::BAD_REQUEST,
        EngineError::Integrity(_) | EngineError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error_response(error: EngineError) -> axum::response::Response {
    (engine_error_status(&error), Json(ErrorResponse::from(&error))).into_response()
}

/// Response body for `GET /channels/:id/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatusResponse {
    pub id: String,
    pub name: String,
    pub state: String,
    pub statistics: HashMap<String, StatisticsCounters>,
}

/// Response for a successful lifecycle action (`_start`, `_stop`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct ActionAcceptedResponse {
    pub id: String,
    pub state: String,
}

/// Response for `POST /channels/:id/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitMessageResponse {
    #[serde(with = "base64_bytes")]
    pub response: Vec<u8>,
}

/// Request body for the encrypted export endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    /// 32-byte AES-256 key, base64-encoded.
    pub key: String,
}

/// The encrypted export envelope described by the spec:
/// `{format, algorithm, iv, tag, data}`, all binary fields base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct EncryptedExport {
    pub format: &'static str,
    pub algorithm: &'static str,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Builds the management API router over shared engine state.
#[must_use]
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_check))
        .route("/channels", post(deploy_channel))
        .route("/channels/{id}/status", get(channel_status))
        .route("/channels/{id}/_start", post(start_channel))
        .route("/channels/{id}/_stop", post(stop_channel))
        .route("/channels/{id}/_pause", post(pause_channel))
        .route("/channels/{id}/_resume", post(resume_channel))
        .route("/channels/{id}/_halt", post(halt_channel))
        .route("/channels/{id}/_undeploy", post(undeploy_channel))
        .route("/channels/{id}/messages", post(submit_message))
        .route("/channels/{id}/messages/{message_id}/export", post(export_message))
        .with_state(Arc::new(state))
}

async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse { status: "healthy".to_string() })
}

fn parse_channel_id(raw: &str) -> Result<ChannelId, axum::response::Response> {
    raw.parse::<uuid::Uuid>().map(ChannelId::new).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid channel id".to_string(),
                details: Some("channel id must be a valid UUID".to_string()),
            }),
        )
            .into_response()
    })
}

async fn deploy_channel(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ChannelConfig>,
) -> impl IntoResponse {
    let id = config.id;
    let channel = match Channel::build(
        config,
        crate::domain_types::ServerId::generate(),
        state.engine.dao_for_new_channel(),
        state.engine.content_store_for_new_channel(),
        state.engine.statistics_store_for_new_channel(),
        crate::observability::EventBus::new(),
        Arc::clone(&state.vm_router),
        state.http_client.clone(),
    ) {
        Ok(channel) => channel,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: error.to_string(), details: None }),
            )
                .into_response();
        }
    };

    match state.engine.deploy(channel).await {
        Ok(()) => (StatusCode::CREATED, Json(ActionAcceptedResponse { id: id.to_string(), state: "Stopped".to_string() })).into_response(),
        Err(error) => engine_error_response(error),
    }
}

async fn channel_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_channel_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let channel = match state.engine.get(id) {
        Ok(channel) => channel,
        Err(error) => return engine_error_response(error),
    };

    let mut statistics = HashMap::new();
    for metadata_id in std::iter::once(MetaDataId::default()).chain(
        channel
            .destinations
            .iter()
            .map(|(metadata_id, _, _)| *metadata_id),
    ) {
        if let Ok(counters) = channel.statistics(metadata_id).await {
            statistics.insert(metadata_id.to_string(), counters);
        }
    }

    Json(ChannelStatusResponse {
        id: id.to_string(),
        name: channel.config.name.clone(),
        state: format!("{:?}", channel.state.get()),
        statistics,
    })
    .into_response()
}

macro_rules! lifecycle_handler {
    ($name:ident, $method:ident) => {
        async fn $name(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
            let id = match parse_channel_id(&id) {
                Ok(id) => id,
                Err(response) => return response,
            };
            match state.engine.$method(id).await {
                Ok(()) => match state.engine.get(id) {
                    Ok(channel) => Json(ActionAcceptedResponse {
                        id: id.to_string(),
                        state: format!("{:?}", channel.state.get()),
                    })
                    .into_response(),
                    Err(error) => engine_error_response(error),
                },
                Err(error) => engine_error_response(error),
            }
        }
    };
}

lifecycle_handler!(start_channel, start_and_drive);
lifecycle_handler!(stop_channel, stop);
lifecycle_handler!(pause_channel, pause);
lifecycle_handler!(resume_channel, resume);
lifecycle_handler!(halt_channel, halt);
lifecycle_handler!(undeploy_channel, undeploy);

async fn submit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let id = match parse_channel_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let message = InboundMessage {
        raw: body.to_vec(),
        data_type: None,
        source_map: crate::domain::source_map::SourceMap::default(),
    };
    match state.engine.submit(id, message).await {
        Ok(response) => Json(SubmitMessageResponse { response }).into_response(),
        Err(error) => engine_error_response(error),
    }
}

async fn export_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(String, i64)>,
    Json(request): Json<ExportRequest>,
) -> impl IntoResponse {
    let id = match parse_channel_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let message_id = match MessageId::try_new(message_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: "invalid message id".to_string(), details: None }),
            )
                .into_response();
        }
    };
    let channel = match state.engine.get(id) {
        Ok(channel) => channel,
        Err(error) => return engine_error_response(error),
    };

    let content = match channel
        .content_store
        .get(id, message_id, MetaDataId::default(), ContentType::Raw)
        .await
    {
        Ok(Some(content)) => content,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: "message not found".to_string(), details: None }),
            )
                .into_response();
        }
        Err(error) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: error.to_string(), details: None }),
            )
                .into_response();
        }
    };

    match encrypt_export(&request.key, &content.content) {
        Ok(export) => Json(export).into_response(),
        Err(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "invalid export key".to_string(), details: Some(message) }),
        )
            .into_response(),
    }
}

/// Encrypts `plaintext` into the `{format, algorithm, iv, tag, data}`
/// export envelope using AES-256-GCM.
fn encrypt_export(key_b64: &str, plaintext: &[u8]) -> Result<EncryptedExport, String> {
    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(key_b64)
        .map_err(|e| format!("key is not valid base64: {e}"))?;
    if key_bytes.len() != 32 {
        return Err("key must decode to exactly 32 bytes for AES-256-GCM".to_string());
    }
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| format!("encryption failed: {e}"))?;
    // `aes-gcm` appends the 16-byte authentication tag to the ciphertext;
    // the wire envelope carries it as a separate field.
    let tag = ciphertext.split_off(ciphertext.len() - 16);

    Ok(EncryptedExport {
        format: "donkey-encrypted-v1",
        algorithm: "aes-256-gcm",
        iv: base64::engine::general_purpose::STANDARD.encode(nonce_bytes(&nonce)),
        tag: base64::engine::general_purpose::STANDARD.encode(tag),
        data: base64::engine::general_purpose::STANDARD.encode(ciphertext),
    })
}

fn nonce_bytes(nonce: &Nonce<<Aes256Gcm as aes_gcm::AeadCore>::NonceSize>) -> Vec<u8> {
    nonce.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_response_serializes_as_healthy() {
        let response = HealthCheckResponse { status: "healthy".to_string() };
        assert_eq!(response.status, "healthy");
    }

    #[test]
    fn encrypt_export_rejects_a_short_key() {
        let short_key = base64::engine::general_purpose::STANDARD.encode(b"too short");
        let result = encrypt_export(&short_key, b"payload");
        assert!(result.is_err());
    }

    #[test]
    fn encrypt_export_produces_distinct_iv_per_call() {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let first = encrypt_export(&key, b"payload").unwrap();
        let second = encrypt_export(&key, b"payload").unwrap();
        assert_ne!(first.iv, second.iv);
        assert_eq!(first.algorithm, "aes-256-gcm");
    }
}
