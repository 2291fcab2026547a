//! A [`reqwest`] transport for `fedauth`
//!
//! [`ReqwestTransport`] sends the requests prepared by a
//! [`fedauth::Client`] through a
//! [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware), so any
//! middleware stack (tracing, retries, caching) can sit underneath the
//! credential manager.
//!
//! ```
//! use fedauth::Client;
//! use fedauth_reqwest::ReqwestTransport;
//! use reqwest_middleware::ClientBuilder;
//!
//! let http = ClientBuilder::new(reqwest::Client::default()).build();
//! let client = Client::new(ReqwestTransport::new(http));
//! # drop(client);
//! ```
//!
//! Non-2xx responses are handed back to the client for classification. Only
//! failures to send a request or read its response are reported as
//! transport errors.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use async_trait::async_trait;
use fedauth::transport::{
    CredentialsMode, FormPart, RequestBody, Transport, TransportError, TransportRequest,
    TransportResponse,
};
use reqwest::{
    header,
    multipart::{Form, Part},
};
use reqwest_middleware::ClientWithMiddleware;

/// A failure to exchange a request with the remote service
#[derive(Debug, thiserror::Error)]
pub enum ReqwestTransportError {
    /// The request could not be sent
    #[error("request failed: {0}")]
    Send(#[source] reqwest_middleware::Error),
    /// The response body could not be read
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
    /// A multipart field carried an unparseable content type
    #[error("invalid content type for multipart field `{name}`")]
    ContentType {
        /// The field name
        name: String,
        /// The underlying error
        #[source]
        source: reqwest::Error,
    },
}

/// Sends `fedauth` requests with `reqwest`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
}

impl ReqwestTransport {
    /// Wraps a client and its middleware stack
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self { client }
    }

    /// The wrapped client
    #[inline]
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }

    async fn exchange(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, ReqwestTransportError> {
        let TransportRequest {
            method,
            url,
            mut headers,
            body,
            credentials,
            timeout,
        } = request;

        if credentials == CredentialsMode::Omit {
            headers.remove(header::COOKIE);
        }

        let mut builder = self.client.request(method, url.as_str()).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder = match body {
            Some(RequestBody::Form(form)) => builder.body(form),
            Some(RequestBody::Multipart(parts)) => builder.multipart(multipart_form(parts)?),
            None => builder,
        };

        let response = builder.send().await.map_err(ReqwestTransportError::Send)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(ReqwestTransportError::Body)?;

        tracing::debug!(status = status.as_u16(), len = body.len(), "received response");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from(reqwest::Client::default())
    }
}

impl From<ClientWithMiddleware> for ReqwestTransport {
    fn from(client: ClientWithMiddleware) -> Self {
        Self::new(client)
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::new(ClientWithMiddleware::from(client))
    }
}

fn multipart_form(parts: Vec<FormPart>) -> Result<Form, ReqwestTransportError> {
    parts.into_iter().try_fold(Form::new(), |form, part| match part {
        FormPart::Text { name, value } => Ok(form.text(name, value)),
        FormPart::File {
            name,
            file_name,
            file,
        } => {
            let mut part = Part::bytes(file.content.to_vec()).file_name(file_name);
            if let Some(content_type) = &file.content_type {
                part = part
                    .mime_str(content_type)
                    .map_err(|source| ReqwestTransportError::ContentType {
                        name: name.clone(),
                        source,
                    })?;
            }
            Ok(form.part(name, part))
        }
    })
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(
        skip_all,
        fields(
            method = %request.method,
            url = request.url.split('?').next().unwrap_or_default(),
        ),
    )]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        Ok(self.exchange(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use bytes::Bytes;
    use fedauth::{params::FileParam, Client, ErrorKind, RequestOptions};
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use reqwest::{Request, Response};
    use reqwest_middleware::{ClientBuilder, Middleware, Next, Result};
    use serde_json::json;

    use super::*;

    const URL: &str = "https://gis.example.com/server/rest/services/Parcels/FeatureServer/0";

    #[derive(Debug)]
    struct Seen {
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    }

    struct Recorder {
        status: StatusCode,
        reply: String,
        seen: Mutex<Vec<Seen>>,
    }

    impl Recorder {
        fn replying(status: StatusCode, reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                status,
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> Seen {
            self.seen.lock().unwrap().pop().expect("no request recorded")
        }
    }

    #[async_trait::async_trait]
    impl Middleware for Recorder {
        async fn handle(
            &self,
            req: Request,
            _: &mut http::Extensions,
            _: Next<'_>,
        ) -> Result<Response> {
            self.seen.lock().unwrap().push(Seen {
                method: req.method().clone(),
                url: req.url().to_string(),
                headers: req.headers().clone(),
                body: req.body().and_then(|b| b.as_bytes()).map(<[u8]>::to_vec),
                timeout: req.timeout().copied(),
            });

            Ok(http::Response::builder()
                .status(self.status)
                .body(self.reply.clone())
                .unwrap()
                .into())
        }
    }

    fn transport(recorder: &Arc<Recorder>) -> ReqwestTransport {
        ReqwestTransport::new(
            ClientBuilder::new(reqwest::Client::default())
                .with_arc(recorder.clone())
                .build(),
        )
    }

    fn request(method: Method, body: Option<RequestBody>) -> TransportRequest {
        TransportRequest {
            method,
            url: URL.to_owned(),
            headers: HeaderMap::new(),
            body,
            credentials: CredentialsMode::SameOrigin,
            timeout: None,
        }
    }

    mod when_sent_by_the_client {
        use super::*;

        #[tokio::test]
        async fn posts_form_encoded_parameters() {
            let recorder = Recorder::replying(StatusCode::OK, json!({"name": "Parcels"}));
            let client = Client::new(transport(&recorder));

            let layer = client
                .request_json(URL, RequestOptions::new().with_param("where", "1=1"))
                .await
                .unwrap();

            assert_eq!(layer["name"], "Parcels");
            let seen = recorder.last();
            assert_eq!(seen.method, Method::POST);
            assert_eq!(seen.url, URL);
            assert_eq!(seen.body.as_deref(), Some(&b"f=json&where=1%3D1"[..]));
            assert_eq!(
                seen.headers[header::CONTENT_TYPE],
                "application/x-www-form-urlencoded"
            );
        }

        #[tokio::test]
        async fn gets_carry_a_query_string() {
            let recorder = Recorder::replying(StatusCode::OK, json!({}));
            let client = Client::new(transport(&recorder));

            client
                .request_json(
                    URL,
                    RequestOptions::new()
                        .with_method(Method::GET)
                        .with_timeout(Duration::from_secs(5)),
                )
                .await
                .unwrap();

            let seen = recorder.last();
            assert_eq!(seen.method, Method::GET);
            assert_eq!(seen.url, format!("{}?f=json", URL));
            assert_eq!(seen.body, None);
            assert_eq!(seen.timeout, Some(Duration::from_secs(5)));
        }

        #[tokio::test]
        async fn error_statuses_are_classified_by_the_client() {
            let recorder = Recorder::replying(StatusCode::NOT_FOUND, json!({}));
            let client = Client::new(transport(&recorder));

            let err = client
                .request_json(URL, RequestOptions::new())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Request);
            assert_eq!(err.to_string(), "HTTP 404: Not Found");
        }
    }

    mod when_sent_directly {
        use super::*;

        #[tokio::test]
        async fn non_success_statuses_are_responses() {
            let recorder = Recorder::replying(StatusCode::INTERNAL_SERVER_ERROR, json!({}));

            let response = transport(&recorder)
                .send(request(Method::GET, None))
                .await
                .unwrap();

            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.body, Bytes::from_static(b"{}"));
        }

        #[tokio::test]
        async fn omitted_credentials_drop_cookies() {
            let recorder = Recorder::replying(StatusCode::OK, json!({}));
            let mut req = request(Method::GET, None);
            req.headers
                .insert(header::COOKIE, HeaderValue::from_static("session=abc"));
            req.credentials = CredentialsMode::Omit;

            transport(&recorder).send(req).await.unwrap();

            assert_eq!(recorder.last().headers.get(header::COOKIE), None);
        }

        #[tokio::test]
        async fn included_credentials_keep_cookies() {
            let recorder = Recorder::replying(StatusCode::OK, json!({}));
            let mut req = request(Method::GET, None);
            req.headers
                .insert(header::COOKIE, HeaderValue::from_static("session=abc"));
            req.credentials = CredentialsMode::Include;

            transport(&recorder).send(req).await.unwrap();

            assert_eq!(recorder.last().headers[header::COOKIE], "session=abc");
        }

        #[tokio::test]
        async fn multipart_bodies_are_sent_as_form_data() {
            let recorder = Recorder::replying(StatusCode::OK, json!({}));
            let body = RequestBody::Multipart(vec![
                FormPart::Text {
                    name: "f".to_owned(),
                    value: "json".to_owned(),
                },
                FormPart::File {
                    name: "file".to_owned(),
                    file_name: "notes.txt".to_owned(),
                    file: FileParam {
                        name: Some("notes.txt".to_owned()),
                        content_type: Some("text/plain".to_owned()),
                        content: Bytes::from_static(b"hello"),
                    },
                },
            ]);

            transport(&recorder)
                .send(request(Method::POST, Some(body)))
                .await
                .unwrap();

            let seen = recorder.last();
            let content_type = seen.headers[header::CONTENT_TYPE].to_str().unwrap();
            assert!(content_type.starts_with("multipart/form-data; boundary="));
        }

        #[tokio::test]
        async fn bad_part_content_types_are_transport_errors() {
            let recorder = Recorder::replying(StatusCode::OK, json!({}));
            let body = RequestBody::Multipart(vec![FormPart::File {
                name: "file".to_owned(),
                file_name: "notes.txt".to_owned(),
                file: FileParam {
                    name: None,
                    content_type: Some("not a mime type".to_owned()),
                    content: Bytes::from_static(b"hello"),
                },
            }]);

            let err = transport(&recorder)
                .send(request(Method::POST, Some(body)))
                .await
                .unwrap_err();

            assert_eq!(
                err.to_string(),
                "invalid content type for multipart field `file`"
            );
            assert!(recorder.seen.lock().unwrap().is_empty());
        }
    }
}
