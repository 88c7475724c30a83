//! Failure taxonomy shared by both request clients.
//!
//! Every failure that leaves [`crate::AuthClient`] or [`crate::UnauthClient`]
//! is one of the four [`FetchError`] variants. Retry decisions, refresh
//! decisions and UI message extraction all inspect these values directly.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::message::extract_detail;

/// Snapshot of an error response, taken at the moment it was classified.
///
/// The body is read eagerly so the error can be cloned, retried and
/// inspected later without holding the connection open.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ErrorResponse {
    /// Consume a `reqwest` response, keeping status, headers and body.
    ///
    /// A body that cannot be read is recorded as empty.
    pub(crate) async fn capture(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(%status, "failed to read error response body: {err}");
                Bytes::new()
            }
        };
        Self {
            status,
            headers,
            body,
        }
    }

    /// Decode the captured body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Human-readable message from the backend `detail` field.
    pub fn detail_message(&self) -> String {
        extract_detail(self.status, &self.body)
    }
}

/// Classified failure of a single request chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The transport failed before a response arrived (DNS, refused
    /// connection, timeout, malformed request).
    #[error("Connection error. Please try again.")]
    Network { message: String },

    /// The server answered with a 5xx status.
    #[error("Server error {}", .status.as_u16())]
    Server {
        status: StatusCode,
        response: Option<ErrorResponse>,
    },

    /// The server answered with a non-success status below 500 that the
    /// client does not handle itself.
    #[error("Client error {}", .status.as_u16())]
    Client {
        status: StatusCode,
        response: Option<ErrorResponse>,
    },

    /// A 401 could not be recovered by refreshing the credential.
    #[error("Session expired")]
    SessionExpired,
}

impl FetchError {
    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub(crate) fn server(response: ErrorResponse) -> Self {
        Self::Server {
            status: response.status,
            response: Some(response),
        }
    }

    pub(crate) fn client(response: ErrorResponse) -> Self {
        Self::Client {
            status: response.status,
            response: Some(response),
        }
    }

    /// Only transport and server failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// HTTP status for `Server` and `Client` failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::Network { .. } | Self::SessionExpired => None,
        }
    }

    /// Captured response for `Server` and `Client` failures.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Server { response, .. } | Self::Client { response, .. } => response.as_ref(),
            Self::Network { .. } | Self::SessionExpired => None,
        }
    }

    /// Message suitable for an inline form or page error.
    ///
    /// HTTP failures use the backend `detail` field, falling back to
    /// "Request failed with status N".
    pub fn detail_message(&self) -> String {
        match self {
            Self::Server { status, response } | Self::Client { status, response } => {
                match response {
                    Some(response) => response.detail_message(),
                    None => extract_detail(*status, &[]),
                }
            }
            Self::Network { .. } | Self::SessionExpired => self.to_string(),
        }
    }
}
