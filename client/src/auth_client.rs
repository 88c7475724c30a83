//! Client for endpoints that require the session credential.
//!
//! Each call runs under the retry policy. A 401 pauses the chain while the
//! shared [`RefreshCoordinator`] renews the credential, then the request is
//! issued once more. A second 401, or a refresh this caller ran and lost,
//! ends the chain with [`FetchError::SessionExpired`].

use std::sync::Arc;

use reqwest::Method;
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::coordinator::RefreshCoordinator;
use crate::coordinator::RefreshOutcome;
use crate::error::FetchError;
use crate::retry::RetryConfig;
use crate::retry::with_retry;
use crate::transport::ApiRequest;
use crate::transport::CredentialMode;
use crate::transport::Sent;
use crate::transport::Transport;
use crate::transport::decode_json;

#[derive(Debug, Clone)]
pub struct AuthClient {
    transport: Arc<Transport>,
    retry: RetryConfig,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthClient {
    pub(crate) fn new(
        transport: Arc<Transport>,
        retry: RetryConfig,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            retry,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send `request` with the session credential attached.
    pub async fn request(&self, request: ApiRequest) -> Result<Response, FetchError> {
        let url = self.transport.resolve(&request)?;
        let mut refresh_attempted = false;
        loop {
            let (sent, generation) = self.attempt(&request, &url, refresh_attempted).await?;
            match sent {
                Sent::Success(response) => return Ok(response),
                Sent::Unauthorized(response) => drop(response),
            }

            if refresh_attempted {
                return Err(self.expire(&request, "credential rejected after refresh"));
            }

            match self.coordinator.coordinate_refresh(generation).await {
                RefreshOutcome::Failed => {
                    return Err(self.expire(&request, "credential refresh failed"));
                }
                outcome => {
                    tracing::debug!(
                        path = request.path(),
                        ?outcome,
                        "re-issuing request after refresh"
                    );
                    refresh_attempted = true;
                }
            }
        }
    }

    /// One retried send. Also returns the credential generation the last
    /// attempt went out with.
    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &Url,
        refresh_attempted: bool,
    ) -> Result<(Sent, u64), FetchError> {
        let mut attempt = 0u32;
        let mut generation = self.coordinator.generation();
        let result = with_retry(
            || {
                attempt += 1;
                // Read before the token is attached.
                generation = self.coordinator.generation();
                self.transport
                    .send_once(request, url, CredentialMode::Attach, attempt)
            },
            &self.retry,
        )
        .await;
        if let Err(err) = &result {
            tracing::debug!(
                path = request.path(),
                attempts = attempt,
                refresh_attempted,
                "request failed: {err}"
            );
        }
        result.map(|sent| (sent, generation))
    }

    fn expire(&self, request: &ApiRequest, reason: &str) -> FetchError {
        tracing::warn!(path = request.path(), "session expired: {reason}");
        self.transport.session().clear();
        FetchError::SessionExpired
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response = self.request(ApiRequest::get(path)).await?;
        decode_json(response).await
    }

    /// Send `body` as JSON and decode the JSON answer.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, path)
            .json(body)
            .map_err(|err| FetchError::network(format!("failed to encode request body: {err}")))?;
        let response = self.request(request).await?;
        decode_json(response).await
    }
}
