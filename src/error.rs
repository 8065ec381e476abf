//! Bridge error types with HTTP status code mapping.
//!
//! [`BridgeError`] is the central error type for the crate. Runtime
//! failures on the WebSocket path are recovered and logged where they
//! happen; the variants that reach an HTTP client map to a status code
//! and a structured JSON error response.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3002,
///     "message": "websocket server is closed",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Crate-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category      | HTTP Status                 |
/// |-----------|---------------|-----------------------------|
/// | 1000–1999 | Configuration | 500 Internal Server Error   |
/// | 2000–2999 | Connection    | 404 Not Found / 410 Gone / 429 |
/// | 3000–3999 | Server        | 500 / 503                   |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A configuration value is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP listener could not be bound.
    #[error("cannot bind listener on {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A message could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No live connection with the given id.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// The connection's writer has gone away.
    #[error("connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("outbound queue full for connection {0}")]
    Backpressure(ConnectionId),

    /// The WebSocket server no longer accepts work.
    #[error("websocket server is closed")]
    ServerClosed,
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::Bind { .. } => 1002,
            Self::ConnectionNotFound(_) => 2001,
            Self::ConnectionClosed(_) => 2002,
            Self::Backpressure(_) => 2003,
            Self::Serialization(_) => 3001,
            Self::ServerClosed => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConnectionClosed(_) => StatusCode::GONE,
            Self::Backpressure(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Bind { .. } | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
