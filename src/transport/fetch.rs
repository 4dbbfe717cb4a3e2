// src/transport/fetch.rs
//! Fetch-domain transport boundary
//!
//! The engine consumes pause events from, and issues resume/fulfill
//! commands to, an abstract transport speaking the browser's
//! network-interception channel. Wire shapes follow the Chrome DevTools
//! Protocol `Fetch` domain: camelCase fields, optional overrides omitted
//! when absent, bodies base64-encoded.

use crate::utils::errors::{InterceptError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// One name/value header pair as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// The request half of a pause event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Inline request body, present when the request carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_post_data: Option<bool>,
}

/// A request paused at a phase boundary.
///
/// The response fields are populated only for response-phase pauses; their
/// absence is what identifies a request-phase pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPausedEvent {
    /// Opaque identifier, unique per in-flight request.
    pub request_id: String,
    pub request: PausedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<HeaderEntry>>,
}

impl RequestPausedEvent {
    /// Whether this pause sits at the response phase.
    pub fn is_response_phase(&self) -> bool {
        self.response_status_code.is_some()
    }
}

/// Which phase a pattern intercepts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStage {
    Request,
    Response,
}

/// One interception pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
    pub url_pattern: String,
    pub request_stage: RequestStage,
}

/// Interception activation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableInterceptionParams {
    pub patterns: Vec<RequestPattern>,
}

impl EnableInterceptionParams {
    /// Intercept every request matching `url_pattern` at the request stage.
    pub fn with_url_pattern(url_pattern: &str) -> Self {
        Self {
            patterns: vec![RequestPattern {
                url_pattern: url_pattern.to_string(),
                request_stage: RequestStage::Request,
            }],
        }
    }
}

/// Resume an intercepted request, optionally overriding outbound fields.
///
/// The transport applies only fields that are present, so a resume that
/// should change anything must carry every mutable field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequestParams {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Base64-encoded request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderEntry>>,
    /// Ask the transport to pause this request again at the response phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intercept_response: Option<bool>,
}

impl ContinueRequestParams {
    /// A plain resume carrying no overrides.
    pub fn passthrough(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    /// A resume carrying no overrides that still requests response-phase
    /// interception.
    pub fn observe_response(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            intercept_response: Some(true),
            ..Self::default()
        }
    }
}

/// Resume an intercepted response without replacing its body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseParams {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<HeaderEntry>>,
}

impl ContinueResponseParams {
    /// A plain resume carrying no overrides.
    pub fn passthrough(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}

/// Complete an intercepted response with an explicit payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillRequestParams {
    pub request_id: String,
    pub response_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<HeaderEntry>>,
    /// Base64-encoded response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A buffered response body as returned by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyPayload {
    pub body: String,
    pub base64_encoded: bool,
}

impl ResponseBodyPayload {
    /// Decode into raw bytes, honoring the transport's encoding flag.
    pub fn decode(&self) -> Result<Bytes> {
        if self.base64_encoded {
            BASE64
                .decode(&self.body)
                .map(Bytes::from)
                .map_err(|e| InterceptError::BodyDecode(e.to_string()))
        } else {
            Ok(Bytes::copy_from_slice(self.body.as_bytes()))
        }
    }
}

/// Base64-encode a body for an outgoing command.
pub fn encode_body(body: &[u8]) -> String {
    BASE64.encode(body)
}

/// The network-interception channel the engine drives.
///
/// A production implementation wraps a live protocol session (a WebSocket
/// DevTools client or similar); tests substitute an in-memory double.
/// Idempotent subscription is the transport's responsibility.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    /// Stream of pause events, one per intercepted request per phase.
    fn subscribe_request_paused(&self) -> mpsc::Receiver<RequestPausedEvent>;

    /// Start intercepting.
    async fn enable_interception(&self, params: EnableInterceptionParams) -> Result<()>;

    /// Resume a request-phase pause.
    async fn continue_request(&self, params: ContinueRequestParams) -> Result<()>;

    /// Resume a response-phase pause without replacing the body.
    async fn continue_response(&self, params: ContinueResponseParams) -> Result<()>;

    /// Complete a response-phase pause with an explicit payload.
    async fn fulfill_request(&self, params: FulfillRequestParams) -> Result<()>;

    /// Fetch the buffered body of a paused response.
    async fn get_response_body(&self, request_id: &str) -> Result<ResponseBodyPayload>;
}
