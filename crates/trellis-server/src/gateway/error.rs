use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use trellis::error::{ErrorKind, SearchError};

/// Gateway-level failure; wraps core errors and request-shape rejections.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidInput,
            GatewayError::Search(e) => e.kind(),
        }
    }
}

/// Wire shape of every failure response.
#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DependencyFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut headers = HeaderMap::new();
        if kind == ErrorKind::Unavailable {
            headers.insert("Retry-After", HeaderValue::from_static("1"));
        }

        let body = Json(ErrorResponse {
            error: kind.as_str(),
            message: self.to_string(),
            retryable: kind.retryable(),
        });

        (status, headers, body).into_response()
    }
}
