//! Google OAuth2 consent flow for linking a user's Drive.
//!
//! The consent callback is a plain browser redirect with no gateway session,
//! so the user id travels inside the OAuth `state` parameter as a short-lived
//! signed token (see [`state`]).

pub mod endpoints;
pub mod state;

use async_trait::async_trait;
use url::Url;

use crate::error::GatewayError;

pub use endpoints::GoogleOauth;

/// What a code exchange yielded. Google omits `refresh_token` on repeat consent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTokens {
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[async_trait]
pub trait OauthFlow: Send + Sync {
    /// Consent page URL carrying `state` verbatim.
    fn authorize_url(&self, state: &str) -> Result<Url, GatewayError>;

    async fn exchange_code(&self, code: &str) -> Result<LinkTokens, GatewayError>;

    /// Trade a stored refresh token for a fresh access token.
    async fn access_token(&self, refresh_token: &str) -> Result<String, GatewayError>;
}
