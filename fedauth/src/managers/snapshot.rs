//! Persisting an identity manager's durable state

use fedauth_clock::UnixTime;
use serde::{Deserialize, Serialize};

use super::identity::{IdentityManager, IdentityOptions};
use crate::{AccessToken, Client, ClientId, Password, RefreshToken};

/// The durable state of an [`IdentityManager`]
///
/// Serializes to camelCase JSON with times as milliseconds since the epoch.
/// Absent values are omitted. Caches and in-flight requests are not part of
/// a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The registered application's client ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// The refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    /// When the refresh token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires: Option<UnixTime>,
    /// The user's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// The user's password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Password>,
    /// The access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<AccessToken>,
    /// When the access token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires: Option<UnixTime>,
    /// The portal's sharing URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<String>,
    /// Whether the organization requires HTTPS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    /// Lifetime of generated tokens, in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_duration: Option<u32>,
    /// The application's redirect URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// A stand-alone server the credentials belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl From<Snapshot> for IdentityOptions {
    fn from(s: Snapshot) -> Self {
        Self {
            client_id: s.client_id,
            refresh_token: s.refresh_token,
            refresh_token_expires: s.refresh_token_expires,
            username: s.username,
            password: s.password,
            token: s.token,
            token_expires: s.token_expires,
            portal: s.portal,
            ssl: s.ssl,
            provider: None,
            token_duration: s.token_duration,
            redirect_uri: s.redirect_uri,
            server: s.server,
        }
    }
}

impl IdentityManager {
    /// Captures the durable state of this manager
    pub fn to_snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        Snapshot {
            client_id: self.inner.client_id.clone(),
            refresh_token: state.refresh_token.clone(),
            refresh_token_expires: state.refresh_token_expires,
            username: self.inner.username.clone(),
            password: self.inner.password.clone(),
            token: state.token.clone(),
            token_expires: state.token_expires,
            portal: Some(self.inner.portal.clone()),
            ssl: self.inner.ssl,
            token_duration: Some(self.inner.token_duration),
            redirect_uri: self.inner.redirect_uri.clone(),
            server: self.inner.server.clone(),
        }
    }

    /// Rebuilds a manager from a snapshot
    pub fn from_snapshot(client: Client, snapshot: Snapshot) -> Self {
        Self::new(client, snapshot.into())
    }

    /// Serializes the durable state as JSON
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_snapshot())
    }

    /// Rebuilds a manager from JSON produced by [`IdentityManager::serialize`]
    pub fn deserialize(client: Client, json: &str) -> Result<Self, serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(client, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::{client, MockTransport, NOW};

    #[test]
    fn serializes_in_camel_case_without_absent_values() {
        let transport = MockTransport::new();
        let (client, _) = client(&transport);
        let manager = IdentityManager::new(
            client,
            IdentityOptions {
                client_id: Some(ClientId::from_static("app")),
                refresh_token: Some(RefreshToken::from_static("R1")),
                refresh_token_expires: Some(NOW + Duration::from_secs(3600)),
                token: Some(AccessToken::from_static("T1")),
                portal: Some("https://gis.example.com/portal/sharing/rest".to_owned()),
                ..IdentityOptions::default()
            },
        );

        let json: Value = serde_json::from_str(&manager.serialize().unwrap()).unwrap();

        assert_eq!(
            json,
            json!({
                "clientId": "app",
                "refreshToken": "R1",
                "refreshTokenExpires": 1_700_003_600_000_u64,
                "token": "T1",
                "portal": "https://gis.example.com/portal/sharing/rest",
                "tokenDuration": 20160
            })
        );
    }

    #[test]
    fn restores_a_working_manager() {
        let transport = MockTransport::new();
        let (client, _) = client(&transport);
        let json = r#"{
            "username": "casey",
            "password": "hunter2",
            "token": "T1",
            "tokenExpires": 1700003600000,
            "ssl": true,
            "server": "https://gis.example.com/arcgis"
        }"#;

        let manager = IdentityManager::deserialize(client.clone(), json).unwrap();

        assert_eq!(manager.portal(), crate::managers::DEFAULT_PORTAL);
        assert_eq!(manager.username().as_deref(), Some("casey"));
        assert_eq!(manager.token_expires(), Some(NOW + Duration::from_secs(3600)));
        assert_eq!(manager.server(), Some("https://gis.example.com/arcgis"));
        assert!(manager.can_refresh());

        let again = IdentityManager::from_snapshot(client, manager.to_snapshot());
        assert_eq!(again.to_snapshot(), manager.to_snapshot());
    }

    #[test]
    fn rejects_malformed_json() {
        let transport = MockTransport::new();
        let (client, _) = client(&transport);
        assert!(IdentityManager::deserialize(client, "{\"token\": 5}").is_err());
    }
}
