use std::future::Future;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Response, StatusCode, Version},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, GenerationDefaults};
use crate::envelope::{write_json, ApiResponse};
use crate::error::ForwardError;
use crate::payload::{chat_endpoint, ChatRequest, UpstreamPayload};
use crate::shutdown::ShutdownHandle;
use crate::sse::relay_stream;

/// Frames buffered between the upstream reader and the client
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Shared, read-only state for the chat forwarder
#[derive(Clone)]
pub struct GatewayState {
    pub client: reqwest::Client,
    pub chat_endpoint: String,
    pub generation: GenerationDefaults,
    pub request_timeout: Duration,
    pub shutdown: ShutdownHandle,
}

impl GatewayState {
    pub fn new(
        upstream_base_url: &str,
        generation: GenerationDefaults,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            chat_endpoint: chat_endpoint(upstream_base_url),
            generation,
            request_timeout,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.upstream.base_url,
            config.generation.clone(),
            config.connect_timeout(),
            config.request_timeout(),
        )
    }
}

/// `POST /api/chat`
pub async fn chat_handler(State(state): State<GatewayState>, req: Request<Body>) -> Response<Body> {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);

    async move {
        match forward_chat(&state, req).await {
            Ok(response) => response,
            Err(e) => {
                if e.status_code().is_client_error() {
                    warn!("⚠️  Rejected chat request: {}", e);
                } else {
                    error!("❌ Chat request failed: {}", e);
                }
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn forward_chat(state: &GatewayState, req: Request<Body>) -> Result<Response<Body>, ForwardError> {
    let version = req.version();

    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ForwardError::Decode(format!("failed to read body: {}", e)))?
        .to_bytes();

    let chat = ChatRequest::decode(&body_bytes)?;
    info!(model = %chat.model_name, stream = chat.stream, "📨 Incoming chat request");
    chat.validate()?;

    // Chunked, incrementally flushed bodies need HTTP/1.1 or later
    if chat.stream && matches!(version, Version::HTTP_09 | Version::HTTP_10) {
        return Err(ForwardError::StreamingUnsupported);
    }

    let payload = UpstreamPayload::from_request(&chat, &state.generation);

    info!("🔄 Forwarding to LLM: {}", state.chat_endpoint);
    // `json` also sets Content-Type: application/json
    let send = state.client.post(&state.chat_endpoint).json(&payload).send();

    let response = within_deadline(state, send)
        .await?
        .map_err(|e| ForwardError::UpstreamUnreachable(e.to_string()))?;

    let status = response.status();
    info!("📬 LLM response status: {}", status);

    if chat.stream {
        Ok(stream_response(state, response))
    } else {
        buffered_response(state, response, status).await
    }
}

/// Bound an upstream wait by the request deadline and by server force-close.
/// Either one ends the call as an unreachable upstream.
async fn within_deadline<F: Future>(state: &GatewayState, fut: F) -> Result<F::Output, ForwardError> {
    tokio::select! {
        _ = state.shutdown.cancelled() => {
            Err(ForwardError::UpstreamUnreachable("server is shutting down".to_string()))
        }
        res = tokio::time::timeout(state.request_timeout, fut) => res.map_err(|_| {
            ForwardError::UpstreamUnreachable(format!("timed out after {:?}", state.request_timeout))
        }),
    }
}

/// Read the whole upstream body and wrap it in a success envelope,
/// mirroring the upstream status
async fn buffered_response(
    state: &GatewayState,
    response: reqwest::Response,
    status: StatusCode,
) -> Result<Response<Body>, ForwardError> {
    let bytes = within_deadline(state, response.bytes())
        .await?
        .map_err(|e| ForwardError::UpstreamUnreachable(format!("failed to read response: {}", e)))?;
    debug!("Read {} bytes from LLM response", bytes.len());

    let data: Value = serde_json::from_slice(&bytes).map_err(|e| ForwardError::UpstreamDecode(e.to_string()))?;

    Ok(write_json(status, &ApiResponse::success(data)))
}

/// Commit a 200 event-stream response and relay the upstream body in the background
fn stream_response(state: &GatewayState, response: reqwest::Response) -> Response<Body> {
    info!("🌊 Starting event-stream relay");

    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let idle_timeout = state.request_timeout;
    let cancel = state.shutdown.token();

    state.shutdown.spawn(
        async move {
            let outcome = relay_stream(Box::pin(response.bytes_stream()), tx, idle_timeout, cancel).await;
            debug!("Relay finished: {:?}", outcome);
        }
        .in_current_span(),
    );

    let mut out = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *out.status_mut() = StatusCode::OK;
    let headers = out.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_precomputes_chat_endpoint() {
        for base in ["http://localhost:11434/api", "http://localhost:11434/api/"] {
            let state = GatewayState::new(
                base,
                GenerationDefaults::default(),
                Duration::from_secs(1),
                Duration::from_secs(30),
            )
            .unwrap();
            assert_eq!(state.chat_endpoint, "http://localhost:11434/api/chat");
            assert_eq!(state.request_timeout, Duration::from_secs(30));
        }
    }

    #[test]
    fn test_stream_response_headers() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let upstream = reqwest::Response::from(axum::http::Response::new("a\n"));
        let state = GatewayState::new(
            "http://localhost:11434/api",
            GenerationDefaults::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        let response = stream_response(&state, upstream);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
    }
}
