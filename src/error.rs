use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::envelope::{write_json, ApiResponse};

/// Everything that can go wrong while forwarding one chat request.
/// All variants are reported to the caller in the same response cycle.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid request body: {0}")]
    Decode(String),

    #[error("field validation failed: {0}")]
    Validation(String),

    #[error("failed to call LLM: {0}")]
    UpstreamUnreachable(String),

    #[error("invalid LLM response: {0}")]
    UpstreamDecode(String),

    #[error("streaming not supported")]
    StreamingUnsupported,
}

impl ForwardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnreachable(_)
            | Self::UpstreamDecode(_)
            | Self::StreamingUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        write_json(self.status_code(), &ApiResponse::error(self.to_string()))
    }
}
