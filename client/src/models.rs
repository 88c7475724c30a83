//! Account payloads exchanged with the backend.

use serde::Deserialize;
use serde::Serialize;

/// Permission level of a dashboard account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UserRole {
    Unapproved,
    Normal,
    Editor,
    Admin,
}

impl UserRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unapproved => "Unapproved",
            Self::Normal => "Normal",
            Self::Editor => "Editor",
            Self::Admin => "Admin",
        }
    }

    /// Admins manage other accounts.
    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }

    pub fn is_approved(self) -> bool {
        self != Self::Unapproved
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for UserRole {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unapproved),
            1 => Ok(Self::Normal),
            2 => Ok(Self::Editor),
            3 => Ok(Self::Admin),
            other => Err(format!("unknown user role {other}")),
        }
    }
}

impl From<UserRole> for u8 {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Unapproved => 0,
            UserRole::Normal => 1,
            UserRole::Editor => 2,
            UserRole::Admin => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Church {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// The logged-in user, as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub network: Network,
    pub church: Church,
}

impl AuthUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An account as seen by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: String,
    pub network: Network,
    pub church: Church,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAccess {
    pub access_id: i64,
    pub network_id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurchAccess {
    pub access_id: i64,
    pub church_id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurchActivityAccess {
    pub access_id: i64,
    pub church_activity_id: i64,
    pub name: String,
    pub slug: String,
}

/// What a user may see, by network, church and church activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccesses {
    #[serde(default)]
    pub networks: Vec<NetworkAccess>,
    #[serde(default)]
    pub churches: Vec<ChurchAccess>,
    #[serde(default)]
    pub church_activities: Vec<ChurchActivityAccess>,
}

impl UserAccesses {
    /// Names of every access entry, networks first.
    pub fn names(&self) -> Vec<&str> {
        self.networks
            .iter()
            .map(|access| access.name.as_str())
            .chain(self.churches.iter().map(|access| access.name.as_str()))
            .chain(
                self.church_activities
                    .iter()
                    .map(|access| access.name.as_str()),
            )
            .collect()
    }
}

/// Entry of `GET /networks/{id}/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithAccesses {
    #[serde(flatten)]
    pub user: User,
    pub accesses: UserAccesses,
}

/// Body of `PUT /users/{id}`. Unset optional fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub church_id: Option<i64>,
}

impl UserUpdate {
    /// An update that keeps every field of `user` as it is.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: None,
            network_id: None,
            church_id: None,
        }
    }
}

/// Tokens some backend deployments return from login and refresh.
///
/// Cookie-based deployments return neither field.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TokenBody {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
