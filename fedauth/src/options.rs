//! Request configuration
//!
//! Defaults that apply to every request are held in [`RequestDefaults`] and
//! owned by a [`Client`][crate::Client]. Per-request settings are described
//! by [`RequestOptions`].

use std::{fmt, sync::Arc, time::Duration};

use http::{header, HeaderMap, HeaderName, HeaderValue, Method};

use crate::{
    managers::AuthenticationManager, params::ParamValue, transport::CredentialsMode, AccessToken,
    Params,
};

/// The `referer` sent when a request does not specify one
///
/// Tokens generated with a username and password are bound to this referer.
pub const DEFAULT_REFERER: &str = concat!("fedauth/", env!("CARGO_PKG_VERSION"));

/// How a request should be authenticated
#[derive(Clone, Default)]
pub enum Authentication {
    /// Send the request anonymously
    #[default]
    None,
    /// Send a raw token as is
    Token(AccessToken),
    /// Ask a manager for an appropriate token
    Manager(Arc<dyn AuthenticationManager>),
}

impl Authentication {
    /// Wraps an authentication manager
    pub fn manager(manager: impl AuthenticationManager + 'static) -> Self {
        Self::Manager(Arc::new(manager))
    }

    /// The manager, if one is attached
    pub fn as_manager(&self) -> Option<&Arc<dyn AuthenticationManager>> {
        match self {
            Self::Manager(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Token(t) => f.debug_tuple("Token").field(t).finish(),
            Self::Manager(m) => f.debug_tuple("Manager").field(m).finish(),
        }
    }
}

impl From<AccessToken> for Authentication {
    fn from(token: AccessToken) -> Self {
        Self::Token(token)
    }
}

/// Settings for a single request
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// The HTTP method; the client default is used when absent
    pub http_method: Option<Method>,
    /// Request parameters
    pub params: Params,
    /// Additional headers, applied over the client defaults
    pub headers: HeaderMap,
    /// How the request should be authenticated
    pub authentication: Authentication,
    /// Return the transport response without parsing or error checks
    pub raw_response: bool,
    /// Send the token in a header rather than the query string on `GET`
    pub hide_token: bool,
    /// Switch `GET` to `POST` when the URL would exceed this length
    pub max_url_length: Option<usize>,
    /// The cookie policy for the request
    pub credentials: Option<CredentialsMode>,
    /// A timeout passed through to the transport
    pub timeout: Option<Duration>,
    /// Do not warn about raw OAuth tokens
    pub suppress_warnings: bool,
}

impl RequestOptions {
    /// Options with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method
    pub fn with_method(mut self, method: Method) -> Self {
        self.http_method = Some(method);
        self
    }

    /// Replaces the parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Adds a single parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Adds a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the authentication
    pub fn with_authentication(mut self, authentication: impl Into<Authentication>) -> Self {
        self.authentication = authentication.into();
        self
    }

    /// Returns the transport response untouched
    pub fn raw(mut self) -> Self {
        self.raw_response = true;
        self
    }

    /// Sends the token as a bearer header on `GET` requests
    pub fn hiding_token(mut self) -> Self {
        self.hide_token = true;
        self
    }

    /// Sets the maximum URL length before switching to `POST`
    pub fn with_max_url_length(mut self, max: usize) -> Self {
        self.max_url_length = Some(max);
        self
    }

    /// Sets the cookie policy
    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets a timeout passed through to the transport
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Defaults applied to every request made through a client
#[derive(Clone, Debug)]
pub struct RequestDefaults {
    /// The HTTP method used when a request does not specify one
    pub http_method: Method,
    /// Parameters merged beneath every request's parameters
    pub params: Params,
    /// Headers merged beneath every request's headers
    pub headers: HeaderMap,
    /// The `referer` header sent when none is specified
    pub referer: HeaderValue,
}

impl Default for RequestDefaults {
    /// `POST` requests asking for JSON (`f=json`) with the crate's referer
    fn default() -> Self {
        Self {
            http_method: Method::POST,
            params: Params::new().with("f", "json"),
            headers: HeaderMap::new(),
            referer: HeaderValue::from_static(DEFAULT_REFERER),
        }
    }
}

impl RequestDefaults {
    /// Adds a default header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a default parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Replaces the default referer
    pub fn with_referer(mut self, referer: HeaderValue) -> Self {
        self.referer = referer;
        self
    }

    /// The referer as text, for use as a `referer` parameter
    pub fn referer_str(&self) -> &str {
        self.referer.to_str().unwrap_or(DEFAULT_REFERER)
    }

    pub(crate) fn merged_headers(&self, request: &HeaderMap) -> HeaderMap {
        let mut headers = self.headers.clone();
        for (name, value) in request {
            headers.insert(name.clone(), value.clone());
        }
        if !headers.contains_key(header::REFERER) {
            headers.insert(header::REFERER, self.referer.clone());
        }
        headers
    }
}
