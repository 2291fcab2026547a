//! Authentication managers
//!
//! A manager hands out a token appropriate for a given URL and, where it holds
//! refresh material, can mint a new one when the platform rejects the current
//! token. The [`Client`][crate::Client] consults the manager attached to each
//! request.

use async_trait::async_trait;
use std::fmt;

use crate::{transport::CredentialsMode, AccessToken, Error, TokenRequestCode};

mod api_key;
mod app_credentials;
mod federation;
mod identity;
pub mod oauth2;
mod pending;
mod snapshot;

pub use api_key::ApiKeyManager;
pub use app_credentials::{AppCredentialsManager, AppCredentialsOptions};
pub use identity::{
    AuthorizeOptions, Credential, IdentityManager, IdentityOptions, Provider, ServerInfo,
};
pub use snapshot::Snapshot;

/// The portal used when none is configured
pub const DEFAULT_PORTAL: &str = "https://www.arcgis.com/sharing/rest";

/// A source of tokens for outgoing requests
#[async_trait]
pub trait AuthenticationManager: fmt::Debug + Send + Sync {
    /// The portal this manager authenticates against
    fn portal(&self) -> &str;

    /// Gets a token suitable for a request to `url`
    async fn get_token(&self, url: &str) -> Result<AccessToken, Error>;

    /// Whether this manager can obtain a new token without user interaction
    fn can_refresh(&self) -> bool {
        false
    }

    /// Obtains new credentials, replacing the current token
    async fn refresh_credentials(&self) -> Result<(), Error> {
        Err(Error::token_request(
            TokenRequestCode::TokenRefreshFailed,
            "Unable to refresh token.",
        ))
    }

    /// The cookie policy for requests to `url`, if the manager has an opinion
    fn domain_credentials(&self, _url: &str) -> Option<CredentialsMode> {
        None
    }

    /// Records that the server hosting `url` answered an anonymous request
    ///
    /// Called after a request succeeded anonymously because no token could
    /// be obtained for it.
    fn trust_anonymous_server(&self, _url: &str) {}
}
