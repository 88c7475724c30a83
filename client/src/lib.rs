//! Authenticated HTTP client for the song-usage dashboard backend.
//!
//! [`ApiClient`] owns one session and hands out two request clients:
//! [`AuthClient`] for endpoints behind the session, which transparently
//! refreshes an expired credential once per request chain, and
//! [`UnauthClient`] for login, registration and other pre-session calls.
//! Both retry transport and server failures with capped exponential
//! backoff and report everything else through [`FetchError`].

mod account;
mod admin;
mod api;
mod auth_client;
pub mod config;
mod coordinator;
mod error;
pub mod message;
pub mod models;
mod refresh;
pub mod retry;
mod session;
mod transport;
mod unauth_client;

pub use account::AccountError;
pub use account::PasswordChange;
pub use account::RegisterRequest;
pub use account::Registration;
pub use account::SLOW_BACKEND_THRESHOLD;
pub use api::ApiClient;
pub use auth_client::AuthClient;
pub use config::ClientConfig;
pub use config::ConfigError;
pub use config::ConfigLoader;
pub use coordinator::RefreshCoordinator;
pub use coordinator::RefreshOutcome;
pub use error::ErrorResponse;
pub use error::FetchError;
pub use refresh::CredentialRefresher;
pub use refresh::HttpCredentialRefresher;
pub use refresh::REFRESH_PATH;
pub use retry::RetryConfig;
pub use retry::with_retry;
pub use session::Session;
pub use session::TokenPair;
pub use transport::ApiRequest;
pub use transport::StatusClass;
pub use transport::classify_status;
pub use transport::join_url;
pub use unauth_client::UnauthClient;
