//! Credential and session management for a federated sharing portal
//!
//! This library acquires, caches, and refreshes the tokens needed to talk to
//! a sharing portal and the servers federated with it. A single
//! [`IdentityManager`] can be handed to every request: it works out which
//! token a URL needs, discovers whether an unknown server trusts the portal,
//! and makes sure that concurrent requests needing a new token share one
//! refresh rather than stampeding the token endpoint.
//!
//! Requests are sent through a [`Client`], which attaches the token, hands the
//! request to a [`Transport`][transport::Transport], and classifies the
//! platform's response. When the platform reports that a token is invalid or
//! expired, the client refreshes the manager's credentials and retries the
//! request once.
//!
//! # General Flow
//!
//! ```
//! use fedauth::{
//!     managers::{IdentityManager, IdentityOptions},
//!     Client, Password, RequestOptions,
//! };
//! # #[derive(Debug)]
//! # struct Offline;
//! # #[async_trait::async_trait]
//! # impl fedauth::transport::Transport for Offline {
//! #     async fn send(
//! #         &self,
//! #         _: fedauth::transport::TransportRequest,
//! #     ) -> Result<fedauth::transport::TransportResponse, fedauth::transport::TransportError> {
//! #         Err("offline".into())
//! #     }
//! # }
//! # async fn run() -> Result<(), fedauth::Error> {
//! # let transport = Offline;
//!
//! let client = Client::new(transport);
//! let manager = IdentityManager::new(
//!     client.clone(),
//!     IdentityOptions {
//!         username: Some("casey".to_owned()),
//!         password: Some(Password::from_static("hunter2")),
//!         portal: Some("https://gis.example.com/portal/sharing/rest".to_owned()),
//!         ..IdentityOptions::default()
//!     },
//! );
//!
//! let layer = client
//!     .request_json(
//!         "https://gis.example.com/server/rest/services/Parcels/FeatureServer/0",
//!         RequestOptions::new().with_authentication(manager.clone()),
//!     )
//!     .await?;
//!
//! tracing::info!(name = ?layer.get("name"), "fetched layer");
//! # Ok(())
//! # }
//! ```
//!
//! The `fedauth_reqwest` crate provides a transport built on `reqwest`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod error;
pub mod managers;
mod options;
pub mod params;
pub mod platform;
mod request;
pub mod transport;
pub mod urls;

#[cfg(test)]
mod test_support;

pub use braids::*;
pub use error::{
    Error, ErrorCode, ErrorKind, TokenRequestCode, AUTHENTICATION_ERROR_CODE, UNKNOWN_ERROR_CODE,
};
pub use managers::{AuthenticationManager, IdentityManager};
pub use options::{Authentication, RequestDefaults, RequestOptions, DEFAULT_REFERER};
pub use params::{ParamValue, Params};
pub use request::{Client, ResponseBody, SharedClock};
