//! Process-wide credential state.
//!
//! The session owns the cookie jar every request goes through, an
//! optional bearer/refresh token pair for deployments that hand out
//! tokens instead of cookies, and the cached current user.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use reqwest::cookie::Jar;

use crate::models::AuthUser;
use crate::models::TokenBody;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default)]
pub struct Session {
    jar: Arc<Jar>,
    tokens: RwLock<Option<TokenPair>>,
    user: RwLock<Option<AuthUser>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookie store shared with the HTTP client.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens().map(|tokens| tokens.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens().and_then(|tokens| tokens.refresh_token)
    }

    pub fn set_tokens(&self, tokens: Option<TokenPair>) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    /// Merge tokens from a login or refresh response.
    ///
    /// A response without an access token leaves the stored pair alone;
    /// a missing refresh token keeps the previous one.
    pub(crate) fn absorb(&self, body: TokenBody) {
        let Some(access_token) = body.access_token else {
            return;
        };
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let refresh_token = body
            .refresh_token
            .or_else(|| tokens.as_ref().and_then(|t| t.refresh_token.clone()));
        *tokens = Some(TokenPair {
            access_token,
            refresh_token,
        });
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_user(&self, user: Option<AuthUser>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Forget tokens and the cached user.
    ///
    /// Cookies are owned by the server; it expires them on logout or
    /// refresh failure.
    pub fn clear(&self) {
        self.set_tokens(None);
        self.set_user(None);
    }
}
