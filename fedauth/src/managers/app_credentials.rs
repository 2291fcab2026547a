use std::{fmt, sync::Arc};

use async_trait::async_trait;
use fedauth_clock::UnixTime;
use parking_lot::Mutex;

use super::{
    oauth2,
    pending::{share, Pending},
    AuthenticationManager, DEFAULT_PORTAL,
};
use crate::{
    urls, AccessToken, Authentication, Client, ClientId, ClientSecret, Error, Params,
    TokenRequestCode,
};

/// Default lifetime requested for application tokens, in minutes
pub const DEFAULT_APP_TOKEN_DURATION: u32 = 7200;

/// Settings for an [`AppCredentialsManager`]
#[derive(Clone, Debug)]
pub struct AppCredentialsOptions {
    /// The application's client ID
    pub client_id: ClientId,
    /// The application's client secret
    pub client_secret: ClientSecret,
    /// An existing token
    pub token: Option<AccessToken>,
    /// When the existing token expires
    pub expires: Option<UnixTime>,
    /// The portal's sharing URL; defaults to the public cloud
    pub portal: Option<String>,
    /// Requested token lifetime, in minutes
    pub duration: Option<u32>,
}

impl AppCredentialsOptions {
    /// Options for the given application credentials
    pub fn new(client_id: ClientId, client_secret: ClientSecret) -> Self {
        Self {
            client_id,
            client_secret,
            token: None,
            expires: None,
            portal: None,
            duration: None,
        }
    }
}

#[derive(Default)]
struct State {
    token: Option<AccessToken>,
    expires: Option<UnixTime>,
    pending: Option<Pending<AccessToken>>,
}

#[derive(Debug)]
struct Inner {
    client: Client,
    client_id: ClientId,
    client_secret: ClientSecret,
    portal: String,
    duration: u32,
    state: Mutex<State>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("token", &self.token)
            .field("expires", &self.expires)
            .field("refreshing", &self.pending.is_some())
            .finish()
    }
}

/// Authenticates as an application using the client credentials grant
///
/// Clones share the same token. Concurrent requests that need a new token
/// share a single refresh.
#[derive(Clone, Debug)]
pub struct AppCredentialsManager {
    inner: Arc<Inner>,
}

impl AppCredentialsManager {
    /// Constructs a manager from application credentials
    pub fn new(client: Client, options: AppCredentialsOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                client_id: options.client_id,
                client_secret: options.client_secret,
                portal: urls::clean_url(options.portal.as_deref().unwrap_or(DEFAULT_PORTAL))
                    .to_owned(),
                duration: options.duration.unwrap_or(DEFAULT_APP_TOKEN_DURATION),
                state: Mutex::new(State {
                    token: options.token,
                    expires: options.expires,
                    pending: None,
                }),
            }),
        }
    }

    /// The current token
    pub fn token(&self) -> Option<AccessToken> {
        self.inner.state.lock().token.clone()
    }

    /// When the current token expires
    pub fn expires(&self) -> Option<UnixTime> {
        self.inner.state.lock().expires
    }

    /// Returns the current token if unexpired, otherwise refreshes it
    pub async fn get_token(&self) -> Result<AccessToken, Error> {
        let pending = {
            let mut state = self.inner.state.lock();
            let now = self.inner.client.now();
            if let (Some(token), Some(expires)) = (&state.token, state.expires) {
                if expires > now {
                    return Ok(token.clone());
                }
            }
            self.refresh(&mut state)
        };
        pending.await
    }

    /// Obtains a new token, joining a refresh already in flight
    pub async fn refresh_token(&self) -> Result<AccessToken, Error> {
        let pending = self.refresh(&mut self.inner.state.lock());
        pending.await
    }

    fn refresh(&self, state: &mut State) -> Pending<AccessToken> {
        if let Some(pending) = &state.pending {
            return pending.clone();
        }

        let this = self.clone();
        let pending = share(async move {
            let result = this.request_token().await;
            let mut state = this.inner.state.lock();
            state.pending = None;
            let bundle = result?;
            state.token = Some(bundle.token.clone());
            state.expires = Some(bundle.expires);
            Ok(bundle.token)
        });
        state.pending = Some(pending.clone());
        pending
    }

    #[tracing::instrument(
        err,
        skip(self),
        fields(client_id = %self.inner.client_id, portal = %self.inner.portal),
    )]
    async fn request_token(&self) -> Result<oauth2::TokenBundle, Error> {
        let params = Params::new()
            .with("client_id", self.inner.client_id.as_str())
            .with("client_secret", self.inner.client_secret.as_str())
            .with("grant_type", "client_credentials")
            .with("expiration", self.inner.duration);
        let url = format!("{}/oauth2/token/", self.inner.portal);

        oauth2::fetch_token(&self.inner.client, &url, params)
            .await
            .map_err(|e| e.into_token_request(TokenRequestCode::TokenRefreshFailed))
    }
}

#[async_trait]
impl AuthenticationManager for AppCredentialsManager {
    fn portal(&self) -> &str {
        &self.inner.portal
    }

    async fn get_token(&self, _url: &str) -> Result<AccessToken, Error> {
        AppCredentialsManager::get_token(self).await
    }

    fn can_refresh(&self) -> bool {
        true
    }

    async fn refresh_credentials(&self) -> Result<(), Error> {
        self.refresh_token().await.map(drop)
    }
}

impl From<AppCredentialsManager> for Authentication {
    fn from(manager: AppCredentialsManager) -> Self {
        Self::Manager(Arc::new(manager))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::test_support::{client, sent_params, MockTransport, NOW};

    fn manager(transport: &MockTransport) -> AppCredentialsManager {
        let (client, _) = client(transport);
        AppCredentialsManager::new(
            client,
            AppCredentialsOptions::new(
                ClientId::from_static("app"),
                ClientSecret::from_static("s3cr3t"),
            ),
        )
    }

    #[tokio::test]
    async fn requests_a_client_credentials_token() {
        let transport = MockTransport::new();
        transport.on("/oauth2/token/", json!({"access_token": "A1", "expires_in": 7200}));
        let manager = manager(&transport);

        let token = manager.get_token().await.unwrap();

        assert_eq!(token.as_str(), "A1");
        assert_eq!(
            manager.expires(),
            Some(NOW + Duration::from_secs(7200) - oauth2::EXPIRY_MARGIN)
        );
        let request = transport.last("/oauth2/token/").unwrap();
        assert!(request.url.starts_with(DEFAULT_PORTAL));
        let params = sent_params(&request);
        assert_eq!(params["grant_type"], "client_credentials");
        assert_eq!(params["client_secret"], "s3cr3t");
        assert_eq!(params["expiration"], "7200");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_request() {
        let transport = MockTransport::new();
        transport.on("/oauth2/token/", json!({"access_token": "A1", "expires_in": 7200}));
        let manager = manager(&transport);
        transport.hold();

        let calls = async {
            futures::join!(
                manager.get_token(),
                manager.get_token(),
                manager.refresh_token(),
            )
        };
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(transport.count("/oauth2/token/"), 1);
            transport.release();
        };
        let ((a, b, c), ()) = futures::join!(calls, release);

        assert_eq!(a.unwrap().as_str(), "A1");
        assert_eq!(b.unwrap().as_str(), "A1");
        assert_eq!(c.unwrap().as_str(), "A1");
        assert_eq!(transport.count("/oauth2/token/"), 1);

        manager.get_token().await.unwrap();
        assert_eq!(transport.count("/oauth2/token/"), 1);
    }

    #[tokio::test]
    async fn failures_do_not_block_later_attempts() {
        let transport = MockTransport::new();
        transport
            .on("/oauth2/token/", json!({"error": {"code": 400, "message": "Invalid client_secret"}}))
            .on("/oauth2/token/", json!({"access_token": "A1", "expires_in": 7200}));
        let manager = manager(&transport);

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(err.token_request_code(), Some(TokenRequestCode::TokenRefreshFailed));
        assert!(manager.token().is_none());

        let token = manager.get_token().await.unwrap();
        assert_eq!(token.as_str(), "A1");
        assert_eq!(transport.count("/oauth2/token/"), 2);
    }

    #[tokio::test]
    async fn unexpired_tokens_are_reused() {
        let transport = MockTransport::new();
        let (client, _) = client(&transport);
        let mut options = AppCredentialsOptions::new(
            ClientId::from_static("app"),
            ClientSecret::from_static("s3cr3t"),
        );
        options.token = Some(AccessToken::from_static("A0"));
        options.expires = Some(NOW + Duration::from_secs(60));
        let manager = AppCredentialsManager::new(client, options);

        assert_eq!(manager.get_token().await.unwrap().as_str(), "A0");
        assert!(transport.requests().is_empty());
    }
}
