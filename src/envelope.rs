use axum::{
    body::Body,
    http::{header, Response, StatusCode},
};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// Uniform JSON wrapper returned by every non-streaming response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: "success".to_string(),
            data: (!data.is_null()).then_some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Render an envelope as a JSON response with the given status
pub fn write_json(status: StatusCode, envelope: &ApiResponse) -> Response<Body> {
    let body = match serde_json::to_vec(envelope) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to serialize response envelope: {}", e);
            br#"{"status":"error","error":"failed to serialize response"}"#.to_vec()
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
