//! Client for endpoints that need no session: login, registration, the
//! credential refresh call itself.
//!
//! Shares response classification and retry policy with
//! [`crate::AuthClient`], but a 401 here is an ordinary client error and
//! no refresh is ever attempted.

use std::sync::Arc;

use reqwest::Method;
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ErrorResponse;
use crate::error::FetchError;
use crate::retry::RetryConfig;
use crate::retry::with_retry;
use crate::transport::ApiRequest;
use crate::transport::CredentialMode;
use crate::transport::Sent;
use crate::transport::Transport;
use crate::transport::decode_json;

#[derive(Debug, Clone)]
pub struct UnauthClient {
    transport: Arc<Transport>,
    retry: RetryConfig,
}

impl UnauthClient {
    pub(crate) fn new(transport: Arc<Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// Send `request` under the retry policy.
    ///
    /// Fails with `Network`, `Server` or `Client`; never `SessionExpired`.
    pub async fn request(&self, request: ApiRequest) -> Result<Response, FetchError> {
        let url = self.transport.resolve(&request)?;
        let mut attempt = 0u32;
        let sent = with_retry(
            || {
                attempt += 1;
                self.transport
                    .send_once(&request, &url, CredentialMode::Omit, attempt)
            },
            &self.retry,
        )
        .await?;

        match sent {
            Sent::Success(response) => Ok(response),
            // `CredentialMode::Omit` classifies 401 as a client error.
            Sent::Unauthorized(response) => {
                Err(FetchError::client(ErrorResponse::capture(response).await))
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response = self.request(ApiRequest::get(path)).await?;
        decode_json(response).await
    }

    /// Send `body` as JSON and return the raw response.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response, FetchError> {
        let request = ApiRequest::new(method, path)
            .json(body)
            .map_err(|err| FetchError::network(format!("failed to encode request body: {err}")))?;
        self.request(request).await
    }
}
