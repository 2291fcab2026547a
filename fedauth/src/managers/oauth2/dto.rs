//! DTOs for the portal's token and info endpoints

use fedauth_clock::UnixTime;
use serde::Deserialize;

use crate::{AccessToken, RefreshToken};

/// A response from an OAuth2 token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: AccessToken,
    /// Lifetime in seconds
    pub expires_in: f64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub ssl: Option<bool>,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    /// Lifetime in seconds
    #[serde(default)]
    pub refresh_token_expires_in: Option<f64>,
}

/// A response from a `generateToken` endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateTokenResponse {
    pub token: AccessToken,
    pub expires: UnixTime,
}

/// Authentication details advertised by a server or portal
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthInfo {
    #[serde(default)]
    pub token_services_url: Option<String>,
}

/// The body of `/rest/info` and `/sharing/rest/info`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InfoResponse {
    #[serde(default)]
    pub owning_system_url: Option<String>,
    #[serde(default)]
    pub auth_info: Option<AuthInfo>,
}

impl InfoResponse {
    pub fn token_services_url(self) -> Option<String> {
        self.auth_info.and_then(|a| a.token_services_url)
    }
}

/// The body of `oauth2/revokeToken`
#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

/// The body of `oauth2/exchangeToken`
#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeTokenResponse {
    pub token: AccessToken,
}
