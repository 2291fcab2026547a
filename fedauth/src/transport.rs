//! The HTTP transport boundary
//!
//! The core never opens connections itself. Requests are handed to a
//! [`Transport`] which returns the status, headers, and body of the response.

use std::{error, fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use crate::params::FileParam;

/// Whether cookies should accompany a request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CredentialsMode {
    /// Only send cookies to the same origin
    #[default]
    SameOrigin,
    /// Send cookies cross-origin
    Include,
    /// Never send cookies
    Omit,
}

/// A single part of a multipart body
#[derive(Clone, Debug, PartialEq)]
pub enum FormPart {
    /// A text field
    Text {
        /// The field name
        name: String,
        /// The field value
        value: String,
    },
    /// A file field
    File {
        /// The field name
        name: String,
        /// The file name to report
        file_name: String,
        /// The file content
        file: FileParam,
    },
}

/// The body of an outgoing request
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// A URL-encoded form
    Form(String),
    /// A multipart form
    Multipart(Vec<FormPart>),
}

/// A request handed to the transport
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// The HTTP method
    pub method: Method,
    /// The full request URL, including any query string
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// The request body
    pub body: Option<RequestBody>,
    /// The cookie policy for this request
    pub credentials: CredentialsMode,
    /// An optional timeout, passed through untouched
    pub timeout: Option<Duration>,
}

/// A response returned by the transport
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// The response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// The response body
    pub body: Bytes,
}

impl TransportResponse {
    /// Constructs a response from a status and body
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    #[inline]
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// The canonical reason phrase for the status
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Parses the body as JSON
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Decodes the body as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The raw body
    #[inline]
    pub fn blob(&self) -> Bytes {
        self.body.clone()
    }
}

/// The error type produced by transports
pub type TransportError = Box<dyn error::Error + Send + Sync + 'static>;

/// A capability to perform HTTP requests
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Sends a request and returns the response
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
