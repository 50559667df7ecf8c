//! Gateway configuration.
//!
//! Assembled once at startup from built-in defaults, an optional `config.toml`
//! and `GATEWAY_*` environment variables (`__` separates sections, e.g.
//! `GATEWAY_UPSTREAM__BASE_URL`). The resulting [`Config`] is validated and
//! then shared read-only through the router state.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::GatewayError;
use crate::upstream::types::ChatMode;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "GATEWAY_";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3/";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
    pub drive: DriveConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub loglevel: String,
    pub database_url: String,
    /// Maximum accepted body for multipart uploads (Drive, PDF, page images).
    pub upload_limit_bytes: usize,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            loglevel: "info".to_string(),
            database_url: "sqlite:docscan.db".to_string(),
            upload_limit_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Which bearer-token issuer this deployment trusts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// HS256 tokens signed with `auth.jwt_secret`, issued by `/auth/login`.
    #[default]
    Local,
    /// Tokens issued by an external identity provider, checked against its JWKS.
    IdentityProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub strategy: AuthStrategy,
    /// Signs local login tokens and the Drive OAuth `state` parameter.
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub demo_user_id: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwks_url: Url,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: AuthStrategy::Local,
            jwt_secret: String::new(),
            token_ttl_hours: 24 * 7,
            demo_user_id: "user_1".to_string(),
            issuer: None,
            audience: None,
            jwks_url: parse_const_url(FIREBASE_JWKS_URL),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: Url,
    pub internal_token: String,
    pub timeout_secs: u64,
    /// Handwriting cleanup runs for minutes, not seconds.
    pub handwriting_timeout_secs: u64,
    pub ocr_languages: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: parse_const_url("http://127.0.0.1:8000/"),
            internal_token: String::new(),
            timeout_secs: 30,
            handwriting_timeout_secs: 300,
            ocr_languages: vec!["vi".to_string(), "en".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<Url>,
    pub app_folder_name: String,
    pub api_base: Url,
    pub upload_base: Url,
    pub auth_url: Url,
    pub token_url: Url,
    pub requests_per_second: u32,
    pub page_size: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            app_folder_name: "DocScanService".to_string(),
            api_base: parse_const_url(DRIVE_API_BASE),
            upload_base: parse_const_url(DRIVE_UPLOAD_BASE),
            auth_url: parse_const_url(GOOGLE_AUTH_URL),
            token_url: parse_const_url(GOOGLE_TOKEN_URI),
            requests_per_second: 10,
            page_size: 200,
        }
    }
}

/// Drive OAuth settings, present only when every piece is configured.
#[derive(Debug, Clone)]
pub struct DriveOauthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
}

impl DriveConfig {
    pub fn oauth(&self) -> Option<DriveOauthSettings> {
        Some(DriveOauthSettings {
            client_id: self.client_id.clone().filter(|s| !s.is_empty())?,
            client_secret: self.client_secret.clone().filter(|s| !s.is_empty())?,
            redirect_uri: self.redirect_uri.clone()?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Mode sent upstream when the caller names neither a mode nor any doc ids.
    pub default_mode: ChatMode,
}

impl Config {
    /// Load from `config.toml` (if present) and the environment, then validate.
    pub fn load() -> Result<Self, GatewayError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, GatewayError> {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(GatewayError::Config("auth.jwt_secret is required".into()));
        }
        if self.upstream.internal_token.trim().is_empty() {
            return Err(GatewayError::Config(
                "upstream.internal_token is required".into(),
            ));
        }
        if self.auth.strategy == AuthStrategy::IdentityProvider && self.auth.audience.is_none() {
            return Err(GatewayError::Config(
                "auth.audience is required for the identity_provider strategy".into(),
            ));
        }
        let d = &self.drive;
        let oauth_parts = [
            d.client_id.is_some(),
            d.client_secret.is_some(),
            d.redirect_uri.is_some(),
        ];
        if oauth_parts.iter().any(|p| *p) && d.oauth().is_none() {
            return Err(GatewayError::Config(
                "drive.client_id, drive.client_secret and drive.redirect_uri must be set together"
                    .into(),
            ));
        }
        if d.page_size == 0 || d.requests_per_second == 0 {
            return Err(GatewayError::Config(
                "drive.page_size and drive.requests_per_second must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_const_url(s: &str) -> Url {
    // Only called with compile-time constants.
    Url::parse(s).unwrap_or_else(|e| panic!("invalid built-in url {s}: {e}"))
}
