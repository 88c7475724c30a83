//! Account flows built on the two request clients: login, logout,
//! registration, the current-user probe and password changes.

use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiClient;
use crate::error::FetchError;
use crate::models::AuthUser;
use crate::models::Church;
use crate::models::Network;
use crate::models::TokenBody;
use crate::transport::ApiRequest;

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
pub const NETWORKS_PATH: &str = "/networks";

/// How long `current_user` waits before flagging a cold-starting backend.
pub const SLOW_BACKEND_THRESHOLD: Duration = Duration::from_secs(3);

const MIN_CREDENTIAL_LEN: usize = 5;
const MAX_CREDENTIAL_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum AccountError {
    /// Input rejected before anything was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend refused the operation; the message is user-facing.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl AccountError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_session_expired())
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::Rejected(message) => message.clone(),
            Self::Fetch(err) => err.detail_message(),
        }
    }
}

/// Sign-up form as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub network_id: Option<i64>,
    pub church_id: Option<i64>,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub network_id: i64,
    pub church_id: i64,
}

fn check_length(field: &str, value: &str) -> Result<(), AccountError> {
    let len = value.chars().count();
    if len < MIN_CREDENTIAL_LEN {
        return Err(AccountError::Validation(format!(
            "{field} must be at least {MIN_CREDENTIAL_LEN} characters long."
        )));
    }
    if len > MAX_CREDENTIAL_LEN {
        return Err(AccountError::Validation(format!(
            "{field} cannot exceed {MAX_CREDENTIAL_LEN} characters."
        )));
    }
    Ok(())
}

impl Registration {
    /// Trim every field and check it, returning the request to send.
    pub fn validate(&self) -> Result<RegisterRequest, AccountError> {
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();
        let username = self.username.trim();
        let password = self.password.trim();
        let confirm_password = self.confirm_password.trim();

        let (Some(network_id), Some(church_id)) = (self.network_id, self.church_id) else {
            return Err(missing_fields());
        };
        if [first_name, last_name, username, password].contains(&"") {
            return Err(missing_fields());
        }

        check_length("Username", username)?;
        check_length("Password", password)?;
        if password != confirm_password {
            return Err(AccountError::Validation(
                "Passwords do not match".to_string(),
            ));
        }

        Ok(RegisterRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
            network_id,
            church_id,
        })
    }
}

fn missing_fields() -> AccountError {
    AccountError::Validation("Please fill in all required fields".to_string())
}

/// Body of `POST /auth/change-password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

impl PasswordChange {
    pub fn new(current: &str, new: &str, confirm: &str) -> Self {
        Self {
            current_password: current.trim().to_string(),
            new_password: new.trim().to_string(),
            confirm_new_password: confirm.trim().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: Option<String>,
}

/// Translate a failed password change into the message the form shows.
fn password_change_error(err: FetchError) -> AccountError {
    if err.is_session_expired() {
        return AccountError::Fetch(err);
    }
    let message = match &err {
        FetchError::Client { status, response } => {
            let detail = response
                .as_ref()
                .and_then(|response| response.json::<DetailBody>().ok())
                .and_then(|body| body.detail);
            match (*status, detail.as_deref()) {
                (StatusCode::BAD_REQUEST, Some("Current password is incorrect")) => {
                    "Current password is incorrect."
                }
                (StatusCode::BAD_REQUEST, Some("Passwords do not match")) => {
                    "Passwords do not match."
                }
                (StatusCode::BAD_REQUEST, _) => "Bad request. Please check your input.",
                (StatusCode::CONFLICT, _) => {
                    "New password must be different from your current password."
                }
                (StatusCode::UNPROCESSABLE_ENTITY, _) => {
                    "Password does not meet the required format."
                }
                _ => "Something went wrong. Please try again.",
            }
        }
        FetchError::Network { .. } | FetchError::Server { .. } | FetchError::SessionExpired => {
            "Something went wrong. Please try again."
        }
    };
    tracing::debug!("password change rejected: {err}");
    AccountError::Rejected(message.to_string())
}

impl ApiClient {
    /// Log in and load the account behind the new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthUser, AccountError> {
        let response = self
            .unauth()
            .send_json(
                Method::POST,
                LOGIN_PATH,
                &LoginRequest { username, password },
            )
            .await?;

        // Cookie deployments may answer with an empty body.
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::network(format!("failed to read login response: {err}")))?;
        if let Ok(tokens) = serde_json::from_slice::<TokenBody>(&body) {
            self.session().absorb(tokens);
        }

        let user: AuthUser = self.auth().get_json(ME_PATH).await?;
        tracing::info!(username = %user.username, role = %user.role, "logged in");
        self.session().set_user(Some(user.clone()));
        Ok(user)
    }

    /// End the session on the server. Local state is cleared either way.
    pub async fn logout(&self) -> Result<(), AccountError> {
        let result = self.auth().request(ApiRequest::post(LOGOUT_PATH)).await;
        self.session().clear();
        result?;
        Ok(())
    }

    pub async fn register(&self, registration: &Registration) -> Result<(), AccountError> {
        let request = registration.validate()?;
        self.unauth()
            .send_json(Method::POST, REGISTER_PATH, &request)
            .await?;
        tracing::info!(username = %request.username, "registered account");
        Ok(())
    }

    /// The logged-in user, or `None` when there is no usable session.
    ///
    /// Raises the [`ApiClient::slow_backend`] flag while the backend takes
    /// longer than [`SLOW_BACKEND_THRESHOLD`] to answer.
    pub async fn current_user(&self) -> Result<Option<AuthUser>, AccountError> {
        let fetch = self.auth().get_json::<AuthUser>(ME_PATH);
        tokio::pin!(fetch);

        let result = tokio::select! {
            result = &mut fetch => result,
            () = tokio::time::sleep(SLOW_BACKEND_THRESHOLD) => {
                tracing::info!("backend is slow to respond; it may be starting up");
                self.set_slow_backend(true);
                fetch.await
            }
        };
        self.set_slow_backend(false);

        match result {
            Ok(user) => {
                self.session().set_user(Some(user.clone()));
                Ok(Some(user))
            }
            Err(err) => {
                tracing::debug!("no current user: {err}");
                self.session().set_user(None);
                Ok(None)
            }
        }
    }

    /// Change the password; the session ends on success.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), AccountError> {
        let request = ApiRequest::post(CHANGE_PASSWORD_PATH)
            .json(change)
            .map_err(|err| FetchError::network(format!("failed to encode request body: {err}")))?;
        self.auth()
            .request(request)
            .await
            .map_err(password_change_error)?;

        tracing::info!("password changed; clearing session");
        self.session().clear();
        Ok(())
    }

    pub async fn networks(&self) -> Result<Vec<Network>, AccountError> {
        self.unauth()
            .get_json(NETWORKS_PATH)
            .await
            .map_err(AccountError::from)
    }

    pub async fn network_churches(&self, network_id: i64) -> Result<Vec<Church>, AccountError> {
        let path = format!("{NETWORKS_PATH}/{network_id}/churches");
        self.unauth()
            .get_json(&path)
            .await
            .map_err(AccountError::from)
    }
}
