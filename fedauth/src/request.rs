//! The request dispatcher
//!
//! A [`Client`] attaches a token to each request, hands it to the transport,
//! and classifies the platform's response. Authentication failures made with
//! a refreshable manager are retried once after refreshing credentials.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use fedauth_clock::{Clock, System, UnixTime};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;

use crate::{
    managers::AuthenticationManager,
    params::EncodedParam,
    transport::{CredentialsMode, FormPart, RequestBody, Transport, TransportRequest, TransportResponse},
    AccessToken, Authentication, Error, ErrorCode, Params, RequestDefaults, RequestOptions,
};

const HIDDEN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-esri-authorization");
const CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("x-esri-auth-client-id");
const FORM_URLENCODED: HeaderValue = HeaderValue::from_static("application/x-www-form-urlencoded");

/// A clock shared between a client and the managers built on it
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// The parsed body of a response
#[derive(Clone, Debug)]
pub enum ResponseBody {
    /// A JSON body (`f=json` or `f=geojson`)
    Json(Value),
    /// A text body (`f=html` or `f=text`)
    Text(String),
    /// Any other format
    Blob(Bytes),
    /// The untouched transport response
    Raw(TransportResponse),
}

impl ResponseBody {
    /// The JSON body, if this is one
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Dispatches requests to the platform
///
/// Clones share the transport and defaults.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    defaults: Arc<RequestDefaults>,
    clock: SharedClock,
    warned_raw_token: Arc<AtomicBool>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Constructs a client over a transport with the default settings
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Constructs a client over a shared transport
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            defaults: Arc::new(RequestDefaults::default()),
            clock: Arc::new(System),
            warned_raw_token: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the request defaults
    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    /// Replaces the clock used to judge token expiry
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The request defaults
    #[inline]
    pub fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    /// The current time according to this client's clock
    #[inline]
    pub fn now(&self) -> UnixTime {
        self.clock.now()
    }

    /// Sends a request, retrying once after refreshing credentials if the
    /// platform rejects the token
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<ResponseBody, Error> {
        let options = Arc::new(options);
        match self.internal_request(url, &options).await {
            Err(err) if err.is_authentication() => match options.authentication.as_manager() {
                Some(manager) if manager.can_refresh() => {
                    self.retry_after_refresh(url, &options, manager.as_ref(), err)
                        .await
                }
                _ => Err(err),
            },
            other => other,
        }
    }

    /// Sends a request expecting a JSON response
    pub async fn request_json(&self, url: &str, options: RequestOptions) -> Result<Value, Error> {
        match self.request(url, options).await? {
            ResponseBody::Json(v) => Ok(v),
            _ => Err(Error::request(
                Some(format!("expected a JSON response from {}", url)),
                None,
            )),
        }
    }

    #[tracing::instrument(err, skip(self, options, manager, original), fields(url = %url))]
    async fn retry_after_refresh(
        &self,
        url: &str,
        options: &Arc<RequestOptions>,
        manager: &dyn AuthenticationManager,
        original: Error,
    ) -> Result<ResponseBody, Error> {
        tracing::debug!(error = %original, "token rejected, refreshing credentials");
        manager.refresh_credentials().await?;

        match self.internal_request(url, options).await {
            Err(err) if err.kind() == original.kind() && err.message() == original.message() => {
                tracing::warn!("request rejected again after refreshing credentials");
                Err(original)
            }
            other => other,
        }
    }

    /// Sends a single request without the authentication retry
    pub async fn internal_request(
        &self,
        url: &str,
        options: &Arc<RequestOptions>,
    ) -> Result<ResponseBody, Error> {
        let mut method = options
            .http_method
            .clone()
            .unwrap_or_else(|| self.defaults.http_method.clone());
        let mut params = Params::new()
            .with("f", "json")
            .merge(&self.defaults.params)
            .merge(&options.params);
        let option_headers = self.defaults.merged_headers(&options.headers);

        let mut credentials = options.credentials.unwrap_or_default();
        if option_headers.contains_key(CLIENT_ID_HEADER) && url.contains("/oauth2/platformSelf") {
            credentials = CredentialsMode::Include;
        }

        let mut token_error = None;
        let token = match &options.authentication {
            Authentication::None => None,
            Authentication::Token(token) => {
                self.warn_raw_token(token, options);
                Some(token.clone())
            }
            Authentication::Manager(manager) => match manager.get_token(url).await {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::debug!(url, error = %err, "no token available, sending request anonymously");
                    token_error = Some(err.with_request(url, options.clone()));
                    None
                }
            },
        }
        .filter(|t| !t.is_anonymous());

        if let Some(token) = &token {
            params.insert("token", token.as_str());
        }
        if let Some(mode) = options
            .authentication
            .as_manager()
            .and_then(|m| m.domain_credentials(url))
        {
            credentials = mode;
        }

        let mut headers = HeaderMap::new();
        let mut request_url = url.to_owned();

        if method == Method::GET {
            let hidden = token.as_ref().filter(|_| options.hide_token);
            if let Some(token) = hidden {
                headers.insert(HIDDEN_TOKEN_HEADER, bearer(token)?);
                params.remove("token");
            }

            let query = params.encode_query_string();
            let full_url = if query.is_empty() {
                url.to_owned()
            } else {
                format!("{}?{}", url, query)
            };

            if options.max_url_length.map_or(false, |max| full_url.len() > max) {
                tracing::debug!(url, len = full_url.len(), "url too long, switching to POST");
                method = Method::POST;
                if let Some(token) = hidden {
                    params.insert("token", token.as_str());
                    headers.remove(HIDDEN_TOKEN_HEADER);
                }
            } else {
                request_url = full_url;
            }
        }

        let force_form_data = is_update_resources(url);
        let multipart = params.requires_form_data() || force_form_data;
        let body = (method == Method::POST).then(|| encode_body(&params, multipart));

        for (name, value) in &option_headers {
            headers.insert(name.clone(), value.clone());
        }
        if !multipart {
            headers.insert(header::CONTENT_TYPE, FORM_URLENCODED);
        }

        let request = TransportRequest {
            method,
            url: request_url.clone(),
            headers,
            body,
            credentials,
            timeout: options.timeout,
        };

        tracing::trace!(method = %request.method, url = %request.url, "sending request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| Error::transport(e).with_request(request_url.as_str(), options.clone()))?;
        tracing::debug!(status = response.status.as_u16(), "received response");

        if !response.ok() {
            return Err(Error::request(
                Some(response.status_text().to_owned()),
                ErrorCode::from(format!("HTTP {}", response.status.as_u16())),
            )
            .with_request(request_url, options.clone()));
        }

        if options.raw_response {
            return Ok(ResponseBody::Raw(response));
        }

        match params.get_str("f").unwrap_or("json") {
            "json" | "geojson" => {
                let json = response.json().map_err(|e| {
                    Error::request(Some(format!("unable to parse response: {}", e)), None)
                        .with_request(request_url.as_str(), options.clone())
                })?;
                let anonymous_fallback = token_error.is_some();
                let json = check_for_errors(json, url, options, token_error)?;

                if anonymous_fallback {
                    if let Some(manager) = options.authentication.as_manager() {
                        manager.trust_anonymous_server(url);
                    }
                }
                Ok(ResponseBody::Json(json))
            }
            "html" | "text" => Ok(ResponseBody::Text(response.text())),
            _ => Ok(ResponseBody::Blob(response.blob())),
        }
    }

    fn warn_raw_token(&self, token: &AccessToken, options: &RequestOptions) {
        if options.suppress_warnings || token.as_str().starts_with("AAPK") {
            return;
        }
        if !self.warned_raw_token.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "using a raw token for authentication; tokens will not be refreshed when they expire"
            );
        }
    }
}

fn bearer(token: &AccessToken) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
        .map_err(|e| Error::request(Some(format!("invalid token: {}", e)), None))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Whether `url` targets an item's `updateResources` operation
fn is_update_resources(url: &str) -> bool {
    url.match_indices("/items/").any(|(idx, m)| {
        let rest = &url[idx + m.len()..];
        rest.find("/updateResources").map_or(false, |pos| pos > 0)
    })
}

fn encode_body(params: &Params, multipart: bool) -> RequestBody {
    if !multipart {
        return RequestBody::Form(params.encode_query_string());
    }

    let file_name = params.get_str("fileName");
    let mut parts = Vec::new();
    for (name, value) in params.process() {
        match value {
            EncodedParam::Text(value) => parts.push(FormPart::Text { name, value }),
            EncodedParam::Repeated(values) => parts.extend(values.into_iter().map(|value| {
                FormPart::Text {
                    name: name.clone(),
                    value,
                }
            })),
            EncodedParam::File(file) => {
                let file_name = file_name
                    .map(str::to_owned)
                    .or_else(|| file.name.clone())
                    .unwrap_or_else(|| name.clone());
                parts.push(FormPart::File {
                    name,
                    file_name,
                    file,
                })
            }
        }
    }
    RequestBody::Multipart(parts)
}

fn is_auth_code(value: Option<&Value>) -> bool {
    value
        .and_then(ErrorCode::from_json)
        .and_then(|c| c.as_number())
        .map_or(false, |n| n == 498 || n == 499)
}

/// Empty strings, zero, `false` and `null` do not signal an error
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Classifies a JSON response into success or a typed error
///
/// If the request went out anonymously because no token could be obtained,
/// `token_error` is reported in place of the platform's authentication error.
pub(crate) fn check_for_errors(
    response: Value,
    url: &str,
    options: &Arc<RequestOptions>,
    token_error: Option<Error>,
) -> Result<Value, Error> {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_owned);

    if let Some(code) = response.get("code").filter(|c| c.as_f64().map_or(false, |n| n >= 400.0)) {
        let message = text(response.get("message"));
        let code = ErrorCode::from_json(code);
        return Err(Error::request(message, code)
            .with_response(response)
            .with_request(url, options.clone()));
    }

    if let Some(error) = response.get("error").filter(|e| is_truthy(e)) {
        let message = text(error.get("message"));
        let code = error
            .get("messageCode")
            .and_then(ErrorCode::from_json)
            .or_else(|| error.get("code").and_then(ErrorCode::from_json));

        if is_auth_code(error.get("code")) || is_auth_code(error.get("messageCode")) {
            if let Some(err) = token_error {
                return Err(err);
            }
            return Err(Error::authentication(message, code)
                .with_response(response)
                .with_request(url, options.clone()));
        }

        return Err(Error::request(message, code)
            .with_response(response)
            .with_request(url, options.clone()));
    }

    if let Some(status) = response.get("status").and_then(Value::as_str) {
        if status == "failed" || status == "failure" {
            let status_message = response.get("statusMessage").and_then(Value::as_str);
            let parsed = status_message.and_then(|m| serde_json::from_str::<Value>(m).ok());
            let (message, code) = match parsed.filter(Value::is_object) {
                Some(parsed) => (
                    text(parsed.get("message")),
                    parsed.get("code").and_then(ErrorCode::from_json),
                ),
                None => (
                    status_message
                        .map(str::to_owned)
                        .or_else(|| text(response.get("message"))),
                    None,
                ),
            };
            return Err(Error::request(message, code)
                .with_response(response)
                .with_request(url, options.clone()));
        }
    }

    Ok(response)
}
