//! One-shot calls to the portal's OAuth2 endpoints

use http::{HeaderName, HeaderValue, Method};
use serde_json::Value;

use crate::{
    managers::{
        oauth2::{dto, parse},
        DEFAULT_PORTAL,
    },
    urls, AccessToken, AccessTokenRef, Client, ClientIdRef, Error, ErrorCode, RequestOptions,
};

const CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("x-esri-auth-client-id");
const REDIRECT_URI_HEADER: HeaderName = HeaderName::from_static("x-esri-auth-redirect-uri");

fn portal_or_default(portal: Option<&str>) -> &str {
    urls::clean_url(portal.unwrap_or(DEFAULT_PORTAL))
}

/// Revokes a refresh token or access token
///
/// The portal must answer with `success: true`.
#[tracing::instrument(err, skip(client, token))]
pub async fn revoke_token(
    client: &Client,
    portal: Option<&str>,
    client_id: Option<&ClientIdRef>,
    token: &str,
) -> Result<(), Error> {
    let url = format!("{}/oauth2/revokeToken/", portal_or_default(portal));
    let options = RequestOptions::new()
        .with_method(Method::POST)
        .with_param("client_id", client_id.map(ClientIdRef::as_str))
        .with_param("auth_token", token);

    let response = client.request_json(&url, options).await?;
    let resp: dto::SuccessResponse = parse(response.clone(), "revokeToken")?;
    if !resp.success {
        return Err(
            Error::request(Some("Unable to revoke token".to_owned()), ErrorCode::from(500))
                .with_response(response),
        );
    }

    tracing::info!("revoked token");
    Ok(())
}

/// Checks whether the owner of `token` may use the application `client_id`
pub async fn validate_app_access(
    client: &Client,
    token: &AccessTokenRef,
    client_id: &ClientIdRef,
    portal: Option<&str>,
) -> Result<Value, Error> {
    let url = format!("{}/oauth2/validateAppAccess", portal_or_default(portal));
    let options = RequestOptions::new()
        .with_method(Method::POST)
        .with_param("f", "json")
        .with_param("client_id", client_id.as_str())
        .with_param("token", token.as_str());
    client.request_json(&url, options).await
}

/// Exchanges a token for one scoped to the application `client_id`
pub async fn exchange_token(
    client: &Client,
    token: &AccessTokenRef,
    client_id: &ClientIdRef,
    portal: Option<&str>,
) -> Result<AccessToken, Error> {
    let url = format!("{}/oauth2/exchangeToken", portal_or_default(portal));
    let options = RequestOptions::new()
        .with_method(Method::POST)
        .with_param("f", "json")
        .with_param("client_id", client_id.as_str())
        .with_param("token", token.as_str());
    let response = client.request_json(&url, options).await?;
    let resp: dto::ExchangeTokenResponse = parse(response, "exchangeToken")?;
    Ok(resp.token)
}

/// Asks the portal for a token using the session cookie of a signed-in user
///
/// Cookies are sent cross-origin for this call.
pub async fn platform_self(
    client: &Client,
    client_id: &ClientIdRef,
    redirect_uri: &str,
    portal: Option<&str>,
) -> Result<Value, Error> {
    let url = format!("{}/oauth2/platformSelf?f=json", portal_or_default(portal));
    let client_id = HeaderValue::from_str(client_id.as_str())
        .map_err(|e| Error::request(Some(format!("invalid client id: {}", e)), None))?;
    let redirect_uri = HeaderValue::from_str(redirect_uri)
        .map_err(|e| Error::request(Some(format!("invalid redirect uri: {}", e)), None))?;

    let options = RequestOptions::new()
        .with_method(Method::POST)
        .with_header(CLIENT_ID_HEADER, client_id)
        .with_header(REDIRECT_URI_HEADER, redirect_uri)
        .with_param("f", "json");
    client.request_json(&url, options).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        test_support::{client, sent_params, MockTransport},
        transport::CredentialsMode,
        AccessToken, ClientId,
    };

    const PORTAL: &str = "https://gis.example.com/portal/sharing/rest";

    #[tokio::test]
    async fn exchanges_tokens_for_an_application() {
        let transport = MockTransport::new();
        transport.on("/oauth2/exchangeToken", json!({"token": "X1"}));
        let (client, _) = client(&transport);

        let token = exchange_token(
            &client,
            &AccessToken::from_static("T1"),
            &ClientId::from_static("app"),
            Some(PORTAL),
        )
        .await
        .unwrap();

        assert_eq!(token.as_str(), "X1");
        let params = sent_params(&transport.last("/oauth2/exchangeToken").unwrap());
        assert_eq!(params["client_id"], "app");
        assert_eq!(params["token"], "T1");
    }

    #[tokio::test]
    async fn validates_app_access_against_the_default_portal() {
        let transport = MockTransport::new();
        transport.on("/oauth2/validateAppAccess", json!({"valid": true}));
        let (client, _) = client(&transport);

        let result = validate_app_access(
            &client,
            &AccessToken::from_static("T1"),
            &ClientId::from_static("app"),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result["valid"], true);
        let request = transport.last("/oauth2/validateAppAccess").unwrap();
        assert!(request.url.starts_with(DEFAULT_PORTAL));
    }

    #[tokio::test]
    async fn platform_self_sends_cookies() {
        let transport = MockTransport::new();
        transport.on("/oauth2/platformSelf", json!({"token": "T1", "username": "casey"}));
        let (client, _) = client(&transport);

        let result = platform_self(
            &client,
            &ClientId::from_static("app"),
            "https://app.example.com/callback",
            Some(PORTAL),
        )
        .await
        .unwrap();

        assert_eq!(result["username"], "casey");
        let request = transport.last("/oauth2/platformSelf").unwrap();
        assert_eq!(request.credentials, CredentialsMode::Include);
        assert_eq!(request.headers[CLIENT_ID_HEADER], "app");
        assert_eq!(
            request.headers[REDIRECT_URI_HEADER],
            "https://app.example.com/callback"
        );
    }

    #[tokio::test]
    async fn revocation_requires_success() {
        let transport = MockTransport::new();
        transport.on("/oauth2/revokeToken/", json!({}));
        let (client, _) = client(&transport);

        let err = revoke_token(&client, Some(PORTAL), None, "R1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::from(500));
        let params = sent_params(&transport.last("/oauth2/revokeToken/").unwrap());
        assert_eq!(params["auth_token"], "R1");
        assert!(!params.contains_key("client_id"));
    }
}
