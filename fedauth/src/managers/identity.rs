use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use fedauth_clock::UnixTime;
use http::Method;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    oauth2::{self, TokenBundle},
    pending::{share, Pending, PendingKey},
    AuthenticationManager, DEFAULT_PORTAL,
};
use crate::{
    platform, transport::CredentialsMode, urls, AccessToken, Authentication, Client, ClientId,
    ClientIdRef, Error, Params, Password, RefreshToken, RequestOptions, TokenRequestCode,
};

/// Default lifetime requested for generated tokens, in minutes
pub const DEFAULT_TOKEN_DURATION: u32 = 20160;

const AUTHORIZE_PORTAL: &str = "https://arcgis.com/sharing/rest";
const REFRESH_TOKEN_EXCHANGE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

/// The identity provider a user signed in with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The portal's own accounts
    #[default]
    Arcgis,
    /// Facebook
    Facebook,
    /// Google
    Google,
    /// GitHub
    Github,
    /// Apple
    Apple,
}

/// Settings for constructing an [`IdentityManager`]
#[derive(Clone, Debug, Default)]
pub struct IdentityOptions {
    /// The registered application's client ID
    pub client_id: Option<ClientId>,
    /// A refresh token
    pub refresh_token: Option<RefreshToken>,
    /// When the refresh token expires
    pub refresh_token_expires: Option<UnixTime>,
    /// The user's name
    pub username: Option<String>,
    /// The user's password
    pub password: Option<Password>,
    /// An access token
    pub token: Option<AccessToken>,
    /// When the access token expires
    pub token_expires: Option<UnixTime>,
    /// The portal's sharing URL; defaults to the public cloud
    pub portal: Option<String>,
    /// Whether the organization requires HTTPS
    pub ssl: Option<bool>,
    /// The identity provider
    pub provider: Option<Provider>,
    /// Lifetime of generated tokens, in minutes
    pub token_duration: Option<u32>,
    /// The application's redirect URI
    pub redirect_uri: Option<String>,
    /// A stand-alone server these credentials belong to
    pub server: Option<String>,
}

/// Settings for the server-side authorization code flow
#[derive(Clone, Debug)]
pub struct AuthorizeOptions {
    /// The registered application's client ID
    pub client_id: ClientId,
    /// The URI the portal redirects back to
    pub redirect_uri: String,
    /// The portal; `https://arcgis.com/sharing/rest` when authorizing and
    /// the public cloud portal when exchanging codes
    pub portal: Option<String>,
    /// Requested lifetime of the refresh token, in minutes
    pub expiration: Option<u32>,
    /// Opaque state echoed back by the portal
    pub state: Option<String>,
    /// A PKCE code verifier, passed through to the token endpoint
    pub code_verifier: Option<String>,
}

impl AuthorizeOptions {
    /// Options for the given application
    pub fn new(client_id: ClientId, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id,
            redirect_uri: redirect_uri.into(),
            portal: None,
            expiration: None,
            state: None,
            code_verifier: None,
        }
    }
}

/// Credentials in the shape used by JavaScript mapping clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// When the token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<UnixTime>,
    /// The portal or server the token belongs to
    pub server: String,
    /// Whether the organization requires HTTPS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    /// The access token
    pub token: AccessToken,
    /// The user's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Describes where a [`Credential`] came from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Whether the credential belongs to a stand-alone server
    #[serde(default)]
    pub has_server: bool,
    /// The server URL
    #[serde(default)]
    pub server: String,
}

#[derive(Clone, Debug)]
pub(super) struct FederatedServer {
    pub token: Option<AccessToken>,
    pub expires: Option<UnixTime>,
}

impl FederatedServer {
    pub fn usable_token(&self, now: UnixTime) -> Option<&AccessToken> {
        match (&self.token, self.expires) {
            (Some(token), Some(expires)) if !expired_at(expires, now) => Some(token),
            _ => None,
        }
    }
}

/// A token is expired from the instant of its recorded expiry
#[inline]
pub(super) fn expired_at(expires: UnixTime, now: UnixTime) -> bool {
    expires <= now
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Lookup {
    User,
    Portal,
}

impl Lookup {
    fn path(self) -> &'static str {
        match self {
            Self::User => "community/self",
            Self::Portal => "portals/self",
        }
    }
}

struct Refreshed {
    token: AccessToken,
    expires: Option<UnixTime>,
    refresh: Option<(Option<RefreshToken>, Option<UnixTime>)>,
}

#[derive(Default)]
pub(super) struct State {
    pub token: Option<AccessToken>,
    pub token_expires: Option<UnixTime>,
    pub refresh_token: Option<RefreshToken>,
    pub refresh_token_expires: Option<UnixTime>,
    pub federated_servers: HashMap<String, FederatedServer>,
    pub trusted_domains: Option<Vec<String>>,
    pub pending: HashMap<PendingKey, Pending<AccessToken>>,
    user: Option<Arc<Value>>,
    portal_info: Option<Arc<Value>>,
    lookups: HashMap<Lookup, Pending<Arc<Value>>>,
    /// Bumped whenever new credentials are applied
    generation: u64,
}

impl State {
    fn usable_token(&self, now: UnixTime) -> Option<AccessToken> {
        let token = self.token.as_ref()?;
        match self.token_expires {
            Some(expires) if expired_at(expires, now) => None,
            _ => Some(token.clone()),
        }
    }

    pub fn token_expired(&self, now: UnixTime) -> bool {
        self.token.is_some() && self.token_expires.map_or(false, |e| expired_at(e, now))
    }

    fn memo(&mut self, lookup: Lookup) -> &mut Option<Arc<Value>> {
        match lookup {
            Lookup::User => &mut self.user,
            Lookup::Portal => &mut self.portal_info,
        }
    }

    fn apply(&mut self, refreshed: Refreshed) -> AccessToken {
        self.token = Some(refreshed.token.clone());
        self.token_expires = refreshed.expires;
        if let Some((refresh_token, refresh_token_expires)) = refreshed.refresh {
            self.refresh_token = refresh_token;
            self.refresh_token_expires = refresh_token_expires;
        }
        self.user = None;
        self.portal_info = None;
        self.lookups.clear();
        self.generation += 1;
        refreshed.token
    }
}

pub(super) struct Inner {
    pub client: Client,
    pub portal: String,
    pub client_id: Option<ClientId>,
    pub redirect_uri: Option<String>,
    pub ssl: Option<bool>,
    pub provider: Provider,
    pub token_duration: u32,
    pub server: Option<String>,
    pub registered_root: Option<String>,
    pub username: Option<String>,
    pub password: Option<Password>,
    pub state: Mutex<State>,
}

/// Manages the credentials of a single user across a portal and the servers
/// federated with it
///
/// Clones share the same credentials and caches. Concurrent requests that
/// need a new token share a single refresh.
#[derive(Clone)]
pub struct IdentityManager {
    pub(super) inner: Arc<Inner>,
}

impl fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("IdentityManager")
            .field("portal", &self.inner.portal)
            .field("server", &self.inner.server)
            .field("client_id", &self.inner.client_id)
            .field("username", &self.inner.username)
            .field("token", &state.token)
            .field("token_expires", &state.token_expires)
            .field("refresh_token", &state.refresh_token)
            .field("federated_servers", &state.federated_servers.len())
            .finish_non_exhaustive()
    }
}

impl IdentityManager {
    /// Constructs a manager from known credentials
    ///
    /// A `server` given in the options is trusted explicitly and seeded with
    /// the given token.
    pub fn new(client: Client, options: IdentityOptions) -> Self {
        let portal = options
            .portal
            .as_deref()
            .map(urls::clean_url)
            .unwrap_or(DEFAULT_PORTAL)
            .to_owned();

        let registered_root = options.server.as_deref().map(urls::server_root_url);
        let mut federated_servers = HashMap::new();
        if let Some(root) = &registered_root {
            federated_servers.insert(
                root.clone(),
                FederatedServer {
                    token: options.token.clone(),
                    expires: options.token_expires,
                },
            );
        }

        let state = State {
            token: options.token,
            token_expires: options.token_expires,
            refresh_token: options.refresh_token,
            refresh_token_expires: options.refresh_token_expires,
            federated_servers,
            ..State::default()
        };

        Self {
            inner: Arc::new(Inner {
                client,
                portal,
                client_id: options.client_id,
                redirect_uri: options.redirect_uri,
                ssl: options.ssl,
                provider: options.provider.unwrap_or_default(),
                token_duration: options.token_duration.unwrap_or(DEFAULT_TOKEN_DURATION),
                server: options.server,
                registered_root,
                username: options.username,
                password: options.password,
                state: Mutex::new(state),
            }),
        }
    }

    /// Constructs a manager from a token and confirms it by fetching the user
    pub async fn from_token(client: Client, options: IdentityOptions) -> Result<Self, Error> {
        let manager = Self::new(client, options);
        manager.get_user().await?;
        Ok(manager)
    }

    /// Signs in with a username and password
    ///
    /// Intended for applications without a user interface.
    pub async fn sign_in(client: Client, options: IdentityOptions) -> Result<Self, Error> {
        let manager = Self::new(client, options);
        manager.get_user().await?;
        Ok(manager)
    }

    /// Builds the URL to redirect a user to for the authorization code flow
    pub fn authorize_url(options: &AuthorizeOptions) -> String {
        let portal = urls::clean_url(options.portal.as_deref().unwrap_or(AUTHORIZE_PORTAL));
        let params = Params::new()
            .with("client_id", options.client_id.as_str())
            .with(
                "expiration",
                options.expiration.unwrap_or(DEFAULT_TOKEN_DURATION),
            )
            .with("response_type", "code")
            .with("redirect_uri", &options.redirect_uri)
            .with("state", options.state.clone());
        format!(
            "{}/oauth2/authorize?{}",
            portal,
            params.encode_query_string()
        )
    }

    /// Completes the authorization code flow
    pub async fn exchange_authorization_code(
        client: Client,
        options: &AuthorizeOptions,
        code: &str,
    ) -> Result<Self, Error> {
        let portal = urls::clean_url(options.portal.as_deref().unwrap_or(DEFAULT_PORTAL)).to_owned();
        let params = Params::new()
            .with("grant_type", "authorization_code")
            .with("client_id", options.client_id.as_str())
            .with("redirect_uri", &options.redirect_uri)
            .with("code", code)
            .with("code_verifier", options.code_verifier.clone());

        let bundle = oauth2::fetch_token(&client, &format!("{}/oauth2/token", portal), params)
            .await
            .map_err(|e| e.into_token_request(TokenRequestCode::RefreshTokenExchangeFailed))?;

        Ok(Self::from_bundle(
            client,
            bundle,
            IdentityOptions {
                client_id: Some(options.client_id.clone()),
                portal: Some(portal),
                redirect_uri: Some(options.redirect_uri.clone()),
                ..IdentityOptions::default()
            },
        ))
    }

    /// Constructs a manager from the tokens returned by a token endpoint
    pub fn from_bundle(client: Client, bundle: TokenBundle, options: IdentityOptions) -> Self {
        Self::new(
            client,
            IdentityOptions {
                ssl: Some(bundle.ssl),
                refresh_token: bundle.refresh_token,
                refresh_token_expires: bundle.refresh_token_expires,
                token: Some(bundle.token),
                token_expires: Some(bundle.expires),
                username: bundle.username,
                ..options
            },
        )
    }

    /// Constructs a manager from a credential issued to a JavaScript client
    ///
    /// Missing `ssl` defaults to `true` and a missing expiry to two hours.
    pub fn from_credential(client: Client, credential: Credential, server_info: &ServerInfo) -> Self {
        let ssl = credential.ssl.unwrap_or(true);
        let expires = credential
            .expires
            .unwrap_or_else(|| client.now() + DEFAULT_CREDENTIAL_LIFETIME);

        let (portal, server) = if server_info.has_server {
            (None, Some(credential.server))
        } else {
            let portal = if credential.server.contains("sharing/rest") {
                credential.server
            } else {
                format!("{}/sharing/rest", credential.server)
            };
            (Some(urls::clean_url(&portal).to_owned()), None)
        };

        Self::new(
            client,
            IdentityOptions {
                portal,
                server,
                ssl: Some(ssl),
                token: Some(credential.token),
                username: credential.user_id,
                token_expires: Some(expires),
                ..IdentityOptions::default()
            },
        )
    }

    /// The credential in the shape used by JavaScript mapping clients
    ///
    /// Returns `None` when no token is held.
    pub fn to_credential(&self) -> Option<Credential> {
        let (token, expires) = {
            let state = self.inner.state.lock();
            (state.token.clone()?, state.token_expires)
        };
        Some(Credential {
            expires,
            server: self
                .inner
                .server
                .clone()
                .unwrap_or_else(|| self.inner.portal.clone()),
            ssl: self.inner.ssl,
            token,
            user_id: self.username(),
        })
    }

    /// The client used for requests
    #[inline]
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// The portal's sharing URL
    #[inline]
    pub fn portal(&self) -> &str {
        &self.inner.portal
    }

    /// The stand-alone server these credentials belong to
    #[inline]
    pub fn server(&self) -> Option<&str> {
        self.inner.server.as_deref()
    }

    /// The registered application's client ID
    #[inline]
    pub fn client_id(&self) -> Option<&ClientIdRef> {
        self.inner.client_id.as_deref()
    }

    /// The application's redirect URI
    #[inline]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.inner.redirect_uri.as_deref()
    }

    /// Whether the organization requires HTTPS
    #[inline]
    pub fn ssl(&self) -> Option<bool> {
        self.inner.ssl
    }

    /// The identity provider
    #[inline]
    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    /// Lifetime of generated tokens, in minutes
    #[inline]
    pub fn token_duration(&self) -> u32 {
        self.inner.token_duration
    }

    /// The current access token
    pub fn token(&self) -> Option<AccessToken> {
        self.inner.state.lock().token.clone()
    }

    /// When the current access token expires
    pub fn token_expires(&self) -> Option<UnixTime> {
        self.inner.state.lock().token_expires
    }

    /// The current refresh token
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.inner.state.lock().refresh_token.clone()
    }

    /// When the current refresh token expires
    pub fn refresh_token_expires(&self) -> Option<UnixTime> {
        self.inner.state.lock().refresh_token_expires
    }

    /// The configured username, or the name of the fetched user
    pub fn username(&self) -> Option<String> {
        if let Some(username) = &self.inner.username {
            return Some(username.clone());
        }
        let state = self.inner.state.lock();
        state
            .user
            .as_ref()
            .and_then(|u| u.get("username"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Whether new tokens can be obtained without user interaction
    pub fn can_refresh(&self) -> bool {
        if self.username().is_some() && self.inner.password.is_some() {
            return true;
        }
        self.inner.client_id.is_some() && self.inner.state.lock().refresh_token.is_some()
    }

    /// Replaces the current token with one obtained elsewhere
    pub fn update_token(&self, token: AccessToken, expires: Option<UnixTime>) {
        let mut state = self.inner.state.lock();
        state.token = Some(token);
        state.token_expires = expires;
    }

    /// Gets a token suitable for a request to `url`
    ///
    /// Requests to the portal, or to public cloud hosts in the portal's
    /// environment, use the portal token. Anything else is resolved as a
    /// federated server.
    pub async fn get_token(&self, url: &str) -> Result<AccessToken, Error> {
        if urls::can_use_online_token(&self.inner.portal, url)
            || urls::is_portal_url(&self.inner.portal, url)
        {
            self.fresh_token().await
        } else {
            self.get_token_for_server(url).await
        }
    }

    /// Returns the current token if unexpired, otherwise refreshes it
    async fn fresh_token(&self) -> Result<AccessToken, Error> {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some(token) = state.usable_token(self.inner.client.now()) {
                return Ok(token);
            }
            self.portal_refresh(&mut state)
        };
        pending.await
    }

    /// Obtains a new portal token
    ///
    /// Joins a refresh already in flight rather than starting another.
    pub async fn refresh_credentials(&self) -> Result<AccessToken, Error> {
        let pending = self.portal_refresh(&mut self.inner.state.lock());
        pending.await
    }

    pub(super) fn portal_refresh(&self, state: &mut State) -> Pending<AccessToken> {
        if let Some(pending) = state.pending.get(&PendingKey::Portal) {
            tracing::trace!("joining pending credential refresh");
            return pending.clone();
        }

        let this = self.clone();
        let pending = share(async move {
            let result = this.perform_refresh().await;
            let mut state = this.inner.state.lock();
            state.pending.remove(&PendingKey::Portal);
            Ok(state.apply(result?))
        });
        state.pending.insert(PendingKey::Portal, pending.clone());
        pending
    }

    #[tracing::instrument(err, skip(self), fields(portal = %self.inner.portal))]
    async fn perform_refresh(&self) -> Result<Refreshed, Error> {
        let (refresh_token, refresh_token_expires) = {
            let state = self.inner.state.lock();
            (state.refresh_token.clone(), state.refresh_token_expires)
        };

        if let (Some(username), Some(password)) = (self.username(), &self.inner.password) {
            return self
                .refresh_with_username_and_password(&username, password)
                .await
                .map_err(|e| e.into_token_request(TokenRequestCode::TokenRefreshFailed));
        }

        if let (Some(client_id), Some(refresh_token)) = (&self.inner.client_id, refresh_token) {
            let now = self.inner.client.now();
            let exchange = refresh_token_expires
                .map_or(false, |e| e - REFRESH_TOKEN_EXCHANGE_WINDOW < now);
            return if exchange {
                self.exchange_refresh_token(client_id, &refresh_token)
                    .await
                    .map_err(|e| e.into_token_request(TokenRequestCode::RefreshTokenExchangeFailed))
            } else {
                self.refresh_with_refresh_token(client_id, &refresh_token)
                    .await
                    .map_err(|e| e.into_token_request(TokenRequestCode::TokenRefreshFailed))
            };
        }

        Err(Error::token_request(
            TokenRequestCode::TokenRefreshFailed,
            "Unable to refresh token. No refresh token or password present.",
        ))
    }

    async fn refresh_with_username_and_password(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<Refreshed, Error> {
        let client = &self.inner.client;
        let params = Params::new()
            .with("username", username)
            .with("password", password.as_str())
            .with("expiration", self.inner.token_duration)
            .with("client", "referer")
            .with("referer", client.defaults().referer_str());

        let url = match &self.inner.server {
            Some(server) => {
                let info_url = format!("{}/rest/info", urls::server_root_url(server));
                oauth2::fetch_info(client, &info_url, RequestOptions::new())
                    .await?
                    .token_services_url()
                    .ok_or_else(|| {
                        Error::request(
                            Some(format!("{} does not advertise a token service", server)),
                            None,
                        )
                    })?
            }
            None => format!("{}/generateToken", self.inner.portal),
        };

        let (token, expires) = oauth2::generate_token(client, &url, params).await?;
        Ok(Refreshed {
            token,
            expires: Some(expires),
            refresh: None,
        })
    }

    async fn refresh_with_refresh_token(
        &self,
        client_id: &ClientId,
        refresh_token: &RefreshToken,
    ) -> Result<Refreshed, Error> {
        let params = Params::new()
            .with("client_id", client_id.as_str())
            .with("refresh_token", refresh_token.as_str())
            .with("grant_type", "refresh_token");
        let url = format!("{}/oauth2/token", self.inner.portal);

        let bundle = oauth2::fetch_token(&self.inner.client, &url, params).await?;
        Ok(Refreshed {
            token: bundle.token,
            expires: Some(bundle.expires),
            refresh: None,
        })
    }

    async fn exchange_refresh_token(
        &self,
        client_id: &ClientId,
        refresh_token: &RefreshToken,
    ) -> Result<Refreshed, Error> {
        tracing::debug!("refresh token close to expiry, exchanging it");
        let params = Params::new()
            .with("client_id", client_id.as_str())
            .with("refresh_token", refresh_token.as_str())
            .with("redirect_uri", self.inner.redirect_uri.clone())
            .with("grant_type", "exchange_refresh_token");
        let url = format!("{}/oauth2/token", self.inner.portal);

        let bundle = oauth2::fetch_token(&self.inner.client, &url, params).await?;
        Ok(Refreshed {
            token: bundle.token,
            expires: Some(bundle.expires),
            refresh: Some((bundle.refresh_token, bundle.refresh_token_expires)),
        })
    }

    /// The signed-in user (`community/self`), fetched once
    pub async fn get_user(&self) -> Result<Arc<Value>, Error> {
        self.lookup(Lookup::User).await
    }

    /// The user's portal (`portals/self`), fetched once
    pub async fn get_portal(&self) -> Result<Arc<Value>, Error> {
        self.lookup(Lookup::Portal).await
    }

    /// The configured username, or the name of the signed-in user
    pub async fn get_username(&self) -> Result<String, Error> {
        if let Some(username) = self.username() {
            return Ok(username);
        }
        let user = self.get_user().await?;
        user.get("username")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::request(Some("user has no username".to_owned()), None))
    }

    async fn lookup(&self, lookup: Lookup) -> Result<Arc<Value>, Error> {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.memo(lookup) {
                return Ok(value.clone());
            }
            match state.lookups.get(&lookup) {
                Some(pending) => pending.clone(),
                None => {
                    let this = self.clone();
                    let generation = state.generation;
                    let pending = share(async move {
                        let url = format!("{}/{}", this.inner.portal, lookup.path());
                        let options = RequestOptions::new()
                            .with_method(Method::GET)
                            .with_authentication(this.clone());
                        let result = this.inner.client.request_json(&url, options).await.map(Arc::new);

                        let mut state = this.inner.state.lock();
                        if state.generation != generation {
                            tracing::debug!(?lookup, "credentials changed during lookup, not caching it");
                            return result;
                        }
                        state.lookups.remove(&lookup);
                        if let Ok(value) = &result {
                            *state.memo(lookup) = Some(value.clone());
                        }
                        result
                    });
                    state.lookups.insert(lookup, pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Checks whether the user may use the application `client_id`
    pub async fn validate_app_access(&self, client_id: &ClientIdRef) -> Result<Value, Error> {
        let token = self.get_token(&self.inner.portal).await?;
        platform::validate_app_access(&self.inner.client, &token, client_id, Some(&self.inner.portal))
            .await
    }

    /// Revokes the refresh token, or the access token if there is none
    pub async fn destroy(&self) -> Result<(), Error> {
        let token = {
            let state = self.inner.state.lock();
            state
                .refresh_token
                .as_ref()
                .map(|t| t.as_str().to_owned())
                .or_else(|| state.token.as_ref().map(|t| t.as_str().to_owned()))
                .unwrap_or_default()
        };
        platform::revoke_token(
            &self.inner.client,
            Some(&self.inner.portal),
            self.client_id(),
            &token,
        )
        .await
    }

    /// Signs the user out by revoking their tokens
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.destroy().await
    }

    /// The cookie policy for a request to `url`
    ///
    /// Cookies are included only for the portal's authorized cross-origin
    /// domains.
    pub fn get_domain_credentials(&self, url: &str) -> CredentialsMode {
        let state = self.inner.state.lock();
        match &state.trusted_domains {
            Some(domains) if domains.iter().any(|d| url.starts_with(d.as_str())) => {
                CredentialsMode::Include
            }
            _ => CredentialsMode::SameOrigin,
        }
    }
}

impl From<IdentityManager> for Authentication {
    fn from(manager: IdentityManager) -> Self {
        Self::Manager(Arc::new(manager))
    }
}

#[async_trait]
impl AuthenticationManager for IdentityManager {
    fn portal(&self) -> &str {
        &self.inner.portal
    }

    async fn get_token(&self, url: &str) -> Result<AccessToken, Error> {
        IdentityManager::get_token(self, url).await
    }

    fn can_refresh(&self) -> bool {
        IdentityManager::can_refresh(self)
    }

    async fn refresh_credentials(&self) -> Result<(), Error> {
        IdentityManager::refresh_credentials(self).await.map(drop)
    }

    fn domain_credentials(&self, url: &str) -> Option<CredentialsMode> {
        Some(self.get_domain_credentials(url))
    }

    fn trust_anonymous_server(&self, url: &str) {
        self.trust_anonymously(url)
    }
}
