//! Admin user management: listing a network's accounts, inspecting one
//! account and its accesses, and editing it. Every call goes through the
//! authenticated client.

use crate::account::AccountError;
use crate::account::NETWORKS_PATH;
use crate::api::ApiClient;
use crate::error::FetchError;
use crate::models::User;
use crate::models::UserAccesses;
use crate::models::UserUpdate;
use crate::models::UserWithAccesses;
use crate::transport::ApiRequest;
use crate::transport::decode_json;

pub const USERS_PATH: &str = "/users";

const UPDATE_FAILED_MESSAGE: &str = "Failed to update user";

/// A rejected update shows the backend `detail`, or a generic message.
fn update_error(err: FetchError) -> AccountError {
    match &err {
        FetchError::Client { response, .. } => {
            let detail = response
                .as_ref()
                .and_then(|response| response.json::<serde_json::Value>().ok())
                .and_then(|body| body.get("detail")?.as_str().map(str::to_string));
            tracing::debug!("user update rejected: {err}");
            AccountError::Rejected(detail.unwrap_or_else(|| UPDATE_FAILED_MESSAGE.to_string()))
        }
        FetchError::Network { .. } | FetchError::Server { .. } | FetchError::SessionExpired => {
            AccountError::Fetch(err)
        }
    }
}

impl ApiClient {
    /// Accounts in `network_id`, each with its accesses.
    pub async fn network_users(
        &self,
        network_id: i64,
    ) -> Result<Vec<UserWithAccesses>, AccountError> {
        let path = format!("{NETWORKS_PATH}/{network_id}/users");
        self.auth()
            .get_json(&path)
            .await
            .map_err(AccountError::from)
    }

    pub async fn user(&self, user_id: i64) -> Result<User, AccountError> {
        let path = format!("{USERS_PATH}/{user_id}");
        self.auth()
            .get_json(&path)
            .await
            .map_err(AccountError::from)
    }

    pub async fn user_access(&self, user_id: i64) -> Result<UserAccesses, AccountError> {
        let path = format!("{USERS_PATH}/{user_id}/access");
        self.auth()
            .get_json(&path)
            .await
            .map_err(AccountError::from)
    }

    /// Apply `update` and return the account as the backend now has it.
    pub async fn update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
    ) -> Result<User, AccountError> {
        let request = ApiRequest::put(format!("{USERS_PATH}/{user_id}"))
            .json(update)
            .map_err(|err| FetchError::network(format!("failed to encode request body: {err}")))?;
        let response = self.auth().request(request).await.map_err(update_error)?;
        let user: User = decode_json(response).await?;
        tracing::info!(user_id, username = %user.username, role = %user.role, "updated user");
        Ok(user)
    }
}
