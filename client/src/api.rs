//! Entry point that wires the session, both request clients and the
//! refresh coordinator together.

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth_client::AuthClient;
use crate::config::ClientConfig;
use crate::config::ConfigError;
use crate::coordinator::RefreshCoordinator;
use crate::refresh::CredentialRefresher;
use crate::refresh::HttpCredentialRefresher;
use crate::session::Session;
use crate::transport::Transport;
use crate::unauth_client::UnauthClient;

/// One backend connection: a shared session plus the clients that use it.
///
/// Cloning is cheap and every clone shares the same session and
/// refresh state.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    auth: AuthClient,
    unauth: UnauthClient,
    slow_backend: Arc<watch::Sender<bool>>,
}

impl ApiClient {
    /// Build a client that refreshes through `POST /auth/refresh`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Build a client with a custom refresh strategy.
    pub fn with_refresher(
        config: ClientConfig,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Some(refresher))
    }

    fn build(
        config: ClientConfig,
        refresher: Option<Arc<dyn CredentialRefresher>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url = config.base_url()?;
        let session = Arc::new(Session::new());

        let http = reqwest::Client::builder()
            .cookie_provider(session.cookie_jar())
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        let transport = Arc::new(Transport::new(http, base_url, Arc::clone(&session)));
        let unauth = UnauthClient::new(Arc::clone(&transport), config.retry.clone());
        let refresher: Arc<dyn CredentialRefresher> = match refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpCredentialRefresher::new(
                unauth.clone(),
                Arc::clone(&session),
            )),
        };
        let coordinator = Arc::new(RefreshCoordinator::new(refresher));
        let auth = AuthClient::new(transport, config.retry.clone(), coordinator);
        let (slow_backend, _) = watch::channel(false);

        tracing::debug!(api_base_url = %config.api_base_url, "api client ready");
        Ok(Self {
            config: Arc::new(config),
            session,
            auth,
            unauth,
            slow_backend: Arc::new(slow_backend),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client for endpoints behind the session (authFetch).
    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Client for pre-session endpoints (unauthFetch).
    pub fn unauth(&self) -> &UnauthClient {
        &self.unauth
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        self.auth.coordinator()
    }

    /// Observe whether the backend is currently slow to answer
    /// [`ApiClient::current_user`].
    pub fn slow_backend(&self) -> watch::Receiver<bool> {
        self.slow_backend.subscribe()
    }

    pub(crate) fn set_slow_backend(&self, slow: bool) {
        self.slow_backend.send_replace(slow);
    }
}
