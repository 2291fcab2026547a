//! Token resolution for servers federated with the portal

use std::time::Duration;

use serde_json::Value;

use super::{
    identity::{FederatedServer, IdentityManager},
    oauth2::{self, EXPIRY_MARGIN},
    pending::{share, PendingKey},
};
use crate::{urls, AccessToken, Error, Params, RequestOptions, TokenRequestCode};

/// How long a server that answered anonymously is remembered
const ANONYMOUS_TRUST: Duration = Duration::from_secs(24 * 60 * 60);

impl IdentityManager {
    /// Gets a token for a server outside the portal
    ///
    /// The server must either be owned by a portal federated with ours or
    /// have been given explicitly when constructing the manager. Resolved
    /// tokens are cached per server root until they expire.
    pub async fn get_token_for_server(&self, url: &str) -> Result<AccessToken, Error> {
        let root = urls::server_root_url(url);

        let pending = {
            let mut state = self.inner.state.lock();
            let now = self.inner.client.now();
            if let Some(token) = state
                .federated_servers
                .get(&root)
                .and_then(|s| s.usable_token(now))
            {
                return Ok(token.clone());
            }

            let key = PendingKey::Server(root.clone());
            match state.pending.get(&key) {
                Some(pending) => {
                    tracing::trace!(root = %root, "joining pending federation");
                    pending.clone()
                }
                None => {
                    let this = self.clone();
                    let url = url.to_owned();
                    let pending = share(async move {
                        let result = this.resolve_server(&root, &url).await;
                        let mut state = this.inner.state.lock();
                        state.pending.remove(&PendingKey::Server(root.clone()));
                        let server = result?;
                        let token = server.token.clone().unwrap_or_else(AccessToken::anonymous);
                        state.federated_servers.insert(root, server);
                        Ok(token)
                    });
                    state.pending.insert(key, pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    #[tracing::instrument(err, skip(self, url), fields(portal = %self.inner.portal))]
    async fn resolve_server(&self, root: &str, url: &str) -> Result<FederatedServer, Error> {
        self.fetch_authorized_domains().await?;

        let client = &self.inner.client;
        let info = oauth2::fetch_info(
            client,
            &format!("{}/rest/info", root),
            RequestOptions::new().with_credentials(self.get_domain_credentials(url)),
        )
        .await?;

        let token_services_url = if let Some(owner) = &info.owning_system_url {
            if !urls::is_federated(owner, &self.inner.portal) {
                return Err(Error::token_request(
                    TokenRequestCode::NotFederated,
                    format!("{} is not federated with {}.", url, self.inner.portal),
                ));
            }
            tracing::debug!(owner = %owner, "server is federated, asking its owner for a token service");
            oauth2::fetch_info(
                client,
                &format!("{}/sharing/rest/info", owner),
                RequestOptions::new(),
            )
            .await?
            .token_services_url()
        } else if info.auth_info.is_some() && self.is_registered_server(root) {
            tracing::debug!("server is explicitly trusted, using its own token service");
            info.token_services_url()
        } else {
            return Err(Error::token_request(
                TokenRequestCode::NotFederated,
                format!(
                    "{} is not federated with any portal and is not explicitly trusted.",
                    url
                ),
            ));
        };

        let token_services_url = token_services_url.ok_or_else(|| {
            Error::token_request(
                TokenRequestCode::GenerateTokenForServerFailed,
                format!("{} does not advertise a token service", root),
            )
        })?;

        let expired = self
            .inner
            .state
            .lock()
            .token_expired(client.now());
        if expired {
            tracing::debug!("portal token expired, refreshing before generating a server token");
            let token = self.refresh_credentials().await?;
            if self.inner.server.is_some() {
                return Ok(FederatedServer {
                    token: Some(token),
                    expires: self.token_expires(),
                });
            }
        }

        self.generate_token_for_server(&token_services_url, root).await
    }

    fn is_registered_server(&self, root: &str) -> bool {
        self.inner.registered_root.as_deref() == Some(root)
    }

    /// Exchanges the portal token for a token scoped to `server_url`
    ///
    /// The reported expiry is brought forward by five minutes.
    pub(super) async fn generate_token_for_server(
        &self,
        token_services_url: &str,
        server_url: &str,
    ) -> Result<FederatedServer, Error> {
        let params = Params::new()
            .with("token", self.token().map(|t| t.as_str().to_owned()))
            .with("serverUrl", server_url)
            .with("expiration", self.inner.token_duration);

        let (token, expires) =
            oauth2::generate_token(&self.inner.client, token_services_url, params)
                .await
                .map_err(|e| e.into_token_request(TokenRequestCode::GenerateTokenForServerFailed))?;

        Ok(FederatedServer {
            token: Some(token),
            expires: Some(expires - EXPIRY_MARGIN),
        })
    }

    /// Loads the portal's authorized cross-origin domains
    ///
    /// Skipped for managers bound to a stand-alone server. The domains are
    /// loaded once.
    pub async fn fetch_authorized_domains(&self) -> Result<(), Error> {
        if self.inner.server.is_some() || self.inner.state.lock().trusted_domains.is_some() {
            return Ok(());
        }

        let portal = self.get_portal().await?;
        let domains: Vec<String> = portal
            .get("authorizedCrossOriginDomains")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|d| !d.starts_with("http://"))
            .map(|d| {
                if d.starts_with("https://") {
                    d.to_owned()
                } else {
                    format!("https://{}", d)
                }
            })
            .collect();

        tracing::debug!(count = domains.len(), "loaded authorized cross-origin domains");
        self.inner.state.lock().trusted_domains = Some(domains);
        Ok(())
    }

    /// Remembers that the server hosting `url` accepts anonymous requests
    pub(super) fn trust_anonymously(&self, url: &str) {
        let root = urls::server_root_url(url);
        let expires = self.inner.client.now() + ANONYMOUS_TRUST;
        tracing::debug!(root = %root, "server answered anonymously, skipping federation for a day");
        self.inner.state.lock().federated_servers.insert(
            root,
            FederatedServer {
                token: Some(AccessToken::anonymous()),
                expires: Some(expires),
            },
        );
    }
}
