use crate::config::{DRIVE_SCOPE, DriveConfig, DriveOauthSettings};
use crate::error::GatewayError;

use super::{LinkTokens, OauthFlow};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Google OAuth endpoints bound to the gateway's Drive client registration.
pub struct GoogleOauth {
    client: DriveOauth2Client,
    http: reqwest::Client,
}

impl GoogleOauth {
    pub fn new(settings: &DriveOauthSettings, drive: &DriveConfig) -> Result<Self, GatewayError> {
        let client = OAuth2Client::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(drive.auth_url.to_string())?)
            .set_token_uri(TokenUrl::new(drive.token_url.to_string())?)
            .set_redirect_uri(RedirectUrl::new(settings.redirect_uri.to_string())?);
        // Token endpoints must not follow redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, http })
    }
}

#[async_trait]
impl OauthFlow for GoogleOauth {
    fn authorize_url(&self, state: &str) -> Result<Url, GatewayError> {
        let state = state.to_string();
        let (url, _csrf) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .add_extra_param("include_granted_scopes", "true")
            .url();
        Ok(Url::parse(url.as_str())?)
    }

    async fn exchange_code(&self, code: &str) -> Result<LinkTokens, GatewayError> {
        let token: BasicTokenResponse = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await?;
        let payload = serde_json::to_value(&token)?;
        debug!(
            has_refresh_token = payload.get("refresh_token").is_some(),
            "authorization code exchanged"
        );
        let field = |name: &str| payload.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(LinkTokens {
            refresh_token: field("refresh_token").filter(|s| !s.is_empty()),
            scope: field("scope"),
            token_type: field("token_type"),
        })
    }

    async fn access_token(&self, refresh_token: &str) -> Result<String, GatewayError> {
        let refresh = RefreshToken::new(refresh_token.to_string());
        let token = (|| async {
            let token: BasicTokenResponse = self
                .client
                .exchange_refresh_token(&refresh)
                .request_async(&self.http)
                .await?;
            Ok::<_, GatewayError>(token)
        })
        .retry(default_retry_policy())
        .when(|e: &GatewayError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("Google token refresh retrying after {}, sleeping {:?}", err, dur);
        })
        .await?;
        info!("Drive access token refreshed");
        Ok(token.access_token().secret().to_string())
    }
}

pub(super) type DriveOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
