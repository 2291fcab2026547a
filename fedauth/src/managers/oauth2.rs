//! Token endpoint helpers shared by the managers

use std::time::Duration;

use fedauth_clock::UnixTime;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{AccessToken, Client, Error, Params, RefreshToken, RequestOptions};

pub(crate) mod dto;

/// How long before a reported expiry a token is treated as expired
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// The tokens returned by an OAuth2 token endpoint
#[derive(Clone, Debug)]
pub struct TokenBundle {
    /// The access token
    pub token: AccessToken,
    /// When the access token should be considered expired
    pub expires: UnixTime,
    /// The user the tokens were issued to, if reported
    pub username: Option<String>,
    /// Whether the organization requires HTTPS
    pub ssl: bool,
    /// A refresh token, if one was issued
    pub refresh_token: Option<RefreshToken>,
    /// When the refresh token should be considered expired
    pub refresh_token_expires: Option<UnixTime>,
}

/// Computes an expiry `lifetime_secs` from `now`, less the safety margin
pub(crate) fn expiry_after(now: UnixTime, lifetime_secs: f64) -> UnixTime {
    UnixTime::from_millis_f64(
        now.as_millis() as f64 + lifetime_secs * 1000.0 - EXPIRY_MARGIN.as_millis() as f64,
    )
}

pub(crate) fn parse<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| {
        Error::request(Some(format!("unexpected {} response: {}", what, e)), None)
            .with_response(value)
    })
}

/// Requests tokens from an OAuth2 token endpoint
///
/// Expiries are computed from the reported lifetimes, less a five minute
/// margin.
#[tracing::instrument(
    err,
    skip(client, params),
    fields(
        token_url = %url,
        grant_type = params.get_str("grant_type").unwrap_or_default(),
    ),
)]
pub async fn fetch_token(client: &Client, url: &str, params: Params) -> Result<TokenBundle, Error> {
    tracing::trace!("requesting token from portal");

    let response = client
        .request_json(url, RequestOptions::new().with_params(params))
        .await?;
    let resp: dto::TokenResponse = parse(response, "token")?;
    let now = client.now();

    let bundle = TokenBundle {
        token: resp.access_token,
        expires: expiry_after(now, resp.expires_in),
        username: resp.username,
        ssl: resp.ssl == Some(true),
        refresh_token: resp.refresh_token,
        refresh_token_expires: resp
            .refresh_token_expires_in
            .filter(|&secs| secs > 0.0)
            .map(|secs| expiry_after(now, secs)),
    };

    tracing::info!(
        has_refresh_token = bundle.refresh_token.is_some(),
        expires = bundle.expires.as_millis(),
        "received new tokens"
    );

    Ok(bundle)
}

/// Requests a token from a `generateToken` endpoint
///
/// The reported expiry is returned as is.
#[tracing::instrument(err, skip(client, params), fields(token_url = %url))]
pub(crate) async fn generate_token(
    client: &Client,
    url: &str,
    params: Params,
) -> Result<(AccessToken, UnixTime), Error> {
    let response = client
        .request_json(url, RequestOptions::new().with_params(params))
        .await?;
    let resp: dto::GenerateTokenResponse = parse(response, "generateToken")?;
    tracing::debug!(expires = resp.expires.as_millis(), "generated token");
    Ok((resp.token, resp.expires))
}

/// Fetches a server or portal's `info` document
pub(crate) async fn fetch_info(
    client: &Client,
    url: &str,
    options: RequestOptions,
) -> Result<dto::InfoResponse, Error> {
    let response = client.request_json(url, options).await?;
    parse(response, "info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiries_subtract_the_margin() {
        let now = UnixTime(1_000_000_000);
        assert_eq!(expiry_after(now, 3600.0), UnixTime(1_000_000_000 + 3_600_000 - 300_000));
    }

    #[test]
    fn short_lifetimes_clamp_at_the_epoch() {
        assert_eq!(expiry_after(UnixTime(0), 60.0), UnixTime(0));
    }
}
