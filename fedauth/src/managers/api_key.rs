use std::sync::Arc;

use async_trait::async_trait;

use super::{AuthenticationManager, DEFAULT_PORTAL};
use crate::{AccessToken, ApiKey, Authentication, Error};

/// Authenticates every request with a fixed API key
#[derive(Clone, Debug)]
pub struct ApiKeyManager {
    key: ApiKey,
    portal: String,
}

impl ApiKeyManager {
    /// Wraps an API key
    pub fn new(key: ApiKey) -> Self {
        Self {
            key,
            portal: DEFAULT_PORTAL.to_owned(),
        }
    }

    /// The API key
    #[inline]
    pub fn key(&self) -> &ApiKey {
        &self.key
    }
}

#[async_trait]
impl AuthenticationManager for ApiKeyManager {
    fn portal(&self) -> &str {
        &self.portal
    }

    async fn get_token(&self, _url: &str) -> Result<AccessToken, Error> {
        Ok(AccessToken::new(self.key.as_str().to_owned()))
    }
}

impl From<ApiKeyManager> for Authentication {
    fn from(manager: ApiKeyManager) -> Self {
        Self::Manager(Arc::new(manager))
    }
}
