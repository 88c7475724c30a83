//! Exchange an expiring credential for a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use crate::models::TokenBody;
use crate::session::Session;
use crate::transport::ApiRequest;
use crate::unauth_client::UnauthClient;

/// Backend endpoint that renews the session.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Performs one credential refresh.
///
/// Implementations never fail: every outcome collapses to `true`
/// (the session now holds a fresh credential) or `false`.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refreshes through `POST /auth/refresh` on the unauthenticated client.
///
/// The renewal cookie travels in the shared jar. When the session holds a
/// refresh token it is also sent in the JSON body, and any tokens in the
/// response replace the stored pair.
#[derive(Debug, Clone)]
pub struct HttpCredentialRefresher {
    client: UnauthClient,
    session: Arc<Session>,
}

impl HttpCredentialRefresher {
    pub fn new(client: UnauthClient, session: Arc<Session>) -> Self {
        Self { client, session }
    }
}

#[async_trait]
impl CredentialRefresher for HttpCredentialRefresher {
    async fn refresh(&self) -> bool {
        let result = match self.session.refresh_token() {
            Some(refresh_token) => {
                let body = RefreshRequest {
                    refresh_token: &refresh_token,
                };
                self.client.send_json(Method::POST, REFRESH_PATH, &body).await
            }
            None => self.client.request(ApiRequest::post(REFRESH_PATH)).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::info!("credential refresh rejected: {err}");
                self.session.set_tokens(None);
                return false;
            }
        };

        // Cookie deployments answer with an empty or non-token body.
        match response.bytes().await {
            Ok(body) if !body.is_empty() => {
                if let Ok(tokens) = serde_json::from_slice::<TokenBody>(&body) {
                    self.session.absorb(tokens);
                }
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("ignoring unreadable refresh body: {err}"),
        }
        true
    }
}
