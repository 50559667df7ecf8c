use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use serde_json::Value;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, ThisError)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthenticated(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(
        "Google did not return a refresh_token. Re-link by revoking access for this app in Google Account → Security → Third-party access, then try again."
    )]
    RefreshTokenNotIssued,

    #[error("Drive not linked for this user")]
    NotLinked,

    #[error("{0} is not configured on this gateway")]
    FeatureDisabled(&'static str),

    #[error("Upstream responded with status {status}")]
    Upstream { status: StatusCode, body: Value },

    #[error("Drive API error ({status}): {message}")]
    Drive { status: StatusCode, message: String },

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Transport-level failures worth another attempt (timeouts, refused connections).
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Reqwest(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Oauth2Token(_) => true,
            GatewayError::Drive { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for GatewayError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => GatewayError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                GatewayError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => {
                GatewayError::Json(parse_err.into_inner())
            }
            RequestTokenError::Other(s) => GatewayError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            GatewayError::Unauthenticated(e) => (StatusCode::UNAUTHORIZED, ApiErrorBody::new(e)),
            GatewayError::BadRequest(_)
            | GatewayError::InvalidState(_)
            | GatewayError::RefreshTokenNotIssued => {
                (StatusCode::BAD_REQUEST, ApiErrorBody::new(&self))
            }
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, ApiErrorBody::new(&self)),
            GatewayError::NotLinked => (StatusCode::CONFLICT, ApiErrorBody::new(&self)),
            GatewayError::FeatureDisabled(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiErrorBody::new(&self))
            }
            GatewayError::Upstream { status, body } => (
                status,
                ApiErrorBody {
                    error: "Upstream processing service rejected the request".to_string(),
                    detail: Some(body),
                },
            ),
            GatewayError::Drive { ref message, .. } => {
                let detail = Some(Value::String(message.clone()));
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorBody {
                        error: "Drive API request failed".to_string(),
                        detail,
                    },
                )
            }
            GatewayError::Reqwest(e) => {
                let message = if e.is_timeout() {
                    "Upstream service timed out"
                } else {
                    "Upstream service is unavailable"
                };
                (StatusCode::BAD_GATEWAY, ApiErrorBody::new(message))
            }
            GatewayError::Oauth2Token(_) | GatewayError::Oauth2Server { .. } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody::new("Google OAuth token exchange failed"),
            ),
            e @ (GatewayError::UrlParse(_)
            | GatewayError::Json(_)
            | GatewayError::Database(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_)) => {
                error!(error = %e, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody::new("Internal Server Error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Error body returned to clients: `{ "error": ..., "detail"?: ... }`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiErrorBody {
    fn new(message: impl ToString) -> Self {
        Self {
            error: message.to_string(),
            detail: None,
        }
    }
}
