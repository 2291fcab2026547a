//! Errors surfaced by requests and token management
//!
//! Every failure is reported as a single [`Error`] carrying an [`ErrorKind`]
//! together with the diagnostics the platform returned. Callers match on the
//! kind rather than on distinct error types.

use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

use crate::{transport::TransportError, RequestOptions};

/// Code used by request errors when the service did not report one
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR_CODE";

/// Code used by authentication errors when the service did not report one
pub const AUTHENTICATION_ERROR_CODE: &str = "AUTHENTICATION_ERROR_CODE";

/// The reason that a token could not be obtained
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenRequestCode {
    /// A request for a new access token failed
    TokenRefreshFailed,
    /// A request for a token for a federated server failed
    GenerateTokenForServerFailed,
    /// A request to exchange a refresh token for a new one failed
    RefreshTokenExchangeFailed,
    /// The server is not federated with the portal
    NotFederated,
    /// The failure is not otherwise classified
    UnknownErrorCode,
}

impl TokenRequestCode {
    /// The wire name of this code
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            Self::GenerateTokenForServerFailed => "GENERATE_TOKEN_FOR_SERVER_FAILED",
            Self::RefreshTokenExchangeFailed => "REFRESH_TOKEN_EXCHANGE_FAILED",
            Self::NotFederated => "NOT_FEDERATED",
            Self::UnknownErrorCode => UNKNOWN_ERROR_CODE,
        }
    }
}

impl fmt::Display for TokenRequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A structured failure reported by the remote service
    Request,
    /// The token used for the request was invalid or expired
    Authentication,
    /// The refresh or federation machinery could not produce a token
    TokenRequest(TokenRequestCode),
    /// The user denied an interactive authorization request
    AccessDenied,
    /// The transport failed before a response was received
    Transport,
}

/// An error code as reported by the platform
///
/// Services report both numeric (`498`) and symbolic (`"GWM_0003"`) codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A numeric code
    Number(i64),
    /// A symbolic code
    Text(String),
}

impl ErrorCode {
    /// The numeric value of the code, if it has one
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) => t.parse().ok(),
        }
    }

    pub(crate) fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Self::Number),
            serde_json::Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for ErrorCode {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<TokenRequestCode> for ErrorCode {
    fn from(c: TokenRequestCode) -> Self {
        Self::Text(c.as_str().to_owned())
    }
}

type Source = Arc<dyn StdError + Send + Sync + 'static>;

/// An error from a request or from the token machinery
///
/// Errors are cheap to clone so that a single failed refresh can be reported
/// to every caller waiting on it.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    original_message: String,
    code: ErrorCode,
    response: Option<Arc<serde_json::Value>>,
    url: Option<String>,
    options: Option<Arc<RequestOptions>>,
    #[source]
    source: Option<Source>,
}

impl Error {
    fn with_kind(kind: ErrorKind, message: Option<String>, code: Option<ErrorCode>) -> Self {
        let (default_message, default_code) = match kind {
            ErrorKind::Authentication => ("AUTHENTICATION_ERROR", AUTHENTICATION_ERROR_CODE),
            ErrorKind::TokenRequest(c) => ("UNKNOWN_ERROR", c.as_str()),
            ErrorKind::AccessDenied => (
                "The user has denied your authorization request.",
                UNKNOWN_ERROR_CODE,
            ),
            ErrorKind::Request | ErrorKind::Transport => ("UNKNOWN_ERROR", UNKNOWN_ERROR_CODE),
        };

        let original_message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_message.to_owned());
        let code = code.unwrap_or_else(|| ErrorCode::from(default_code));

        let message = match kind {
            ErrorKind::TokenRequest(_) => format!("{}: {}", code, original_message),
            ErrorKind::AccessDenied | ErrorKind::Transport => original_message.clone(),
            _ if code == ErrorCode::from(default_code) => original_message.clone(),
            _ => format!("{}: {}", code, original_message),
        };

        Self {
            kind,
            message,
            original_message,
            code,
            response: None,
            url: None,
            options: None,
            source: None,
        }
    }

    /// A structured failure reported by the remote service
    pub fn request(message: impl Into<Option<String>>, code: impl Into<Option<ErrorCode>>) -> Self {
        Self::with_kind(ErrorKind::Request, message.into(), code.into())
    }

    /// An invalid or expired token
    pub fn authentication(
        message: impl Into<Option<String>>,
        code: impl Into<Option<ErrorCode>>,
    ) -> Self {
        Self::with_kind(ErrorKind::Authentication, message.into(), code.into())
    }

    /// A failure to obtain a token
    pub fn token_request(code: TokenRequestCode, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::TokenRequest(code), Some(message.into()), None)
    }

    /// The user denied an interactive authorization request
    pub fn access_denied() -> Self {
        Self::with_kind(ErrorKind::AccessDenied, None, None)
    }

    /// A transport failure
    pub fn transport(source: impl Into<TransportError>) -> Self {
        let source: Source = Arc::from(source.into());
        let mut err = Self::with_kind(ErrorKind::Transport, Some(source.to_string()), None);
        err.source = Some(source);
        err
    }

    /// Re-labels a failure as a token request failure, keeping its diagnostics
    pub(crate) fn into_token_request(self, code: TokenRequestCode) -> Self {
        let mut err = Self::with_kind(
            ErrorKind::TokenRequest(code),
            Some(self.message.clone()),
            None,
        );
        err.response = self.response.clone();
        err.url = self.url.clone();
        err.options = self.options.clone();
        err.source = Some(Arc::new(self));
        err
    }

    /// Attaches the raw service response
    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.response = Some(Arc::new(response));
        self
    }

    /// Attaches the request context
    pub fn with_request(mut self, url: impl Into<String>, options: Arc<RequestOptions>) -> Self {
        self.url = Some(url.into());
        self.options = Some(options);
        self
    }

    /// The category of this error
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether this error reports an invalid or expired token
    #[inline]
    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }

    /// The token request code, if this is a token request failure
    pub fn token_request_code(&self) -> Option<TokenRequestCode> {
        match self.kind {
            ErrorKind::TokenRequest(c) => Some(c),
            _ => None,
        }
    }

    /// The full message, prefixed with the code where one is known
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The message as reported, without the code prefix
    #[inline]
    pub fn original_message(&self) -> &str {
        &self.original_message
    }

    /// The error code
    #[inline]
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// The raw service response that produced this error
    #[inline]
    pub fn response(&self) -> Option<&serde_json::Value> {
        self.response.as_deref()
    }

    /// The URL of the failed request
    #[inline]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The options of the failed request
    #[inline]
    pub fn options(&self) -> Option<&RequestOptions> {
        self.options.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_prefixes_known_codes() {
        let err = Error::request(Some("Item does not exist".to_owned()), ErrorCode::from(400));
        assert_eq!(err.to_string(), "400: Item does not exist");
        assert_eq!(err.original_message(), "Item does not exist");
    }

    #[test]
    fn request_error_defaults_to_unknown() {
        let err = Error::request(None, None);
        assert_eq!(err.to_string(), "UNKNOWN_ERROR");
        assert_eq!(err.code(), &ErrorCode::from(UNKNOWN_ERROR_CODE));
    }

    #[test]
    fn authentication_error_defaults() {
        let err = Error::authentication(None, None);
        assert_eq!(err.to_string(), "AUTHENTICATION_ERROR");
        assert!(err.is_authentication());

        let err = Error::authentication(Some("Invalid token.".to_owned()), ErrorCode::from(498));
        assert_eq!(err.to_string(), "498: Invalid token.");
    }

    #[test]
    fn token_request_errors_always_carry_their_code() {
        let err = Error::token_request(TokenRequestCode::NotFederated, "not federated");
        assert_eq!(err.to_string(), "NOT_FEDERATED: not federated");
        assert_eq!(err.token_request_code(), Some(TokenRequestCode::NotFederated));
    }

    #[test]
    fn relabelled_errors_keep_their_cause() {
        let err = Error::request(Some("bad".to_owned()), ErrorCode::from(400))
            .with_response(serde_json::json!({"error": {"code": 400}}))
            .into_token_request(TokenRequestCode::TokenRefreshFailed);

        assert_eq!(err.to_string(), "TOKEN_REFRESH_FAILED: 400: bad");
        assert!(err.response().is_some());
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn numeric_codes_parse_from_text() {
        assert_eq!(ErrorCode::from("499").as_number(), Some(499));
        assert_eq!(ErrorCode::from("GWM_0003").as_number(), None);
    }
}
