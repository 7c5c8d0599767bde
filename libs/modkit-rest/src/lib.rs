#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Composable REST calls for `ModKit`
//!
//! A [`Request`] pairs an absolute base URL with options shared by every
//! call. [`Request::make`] joins a reference onto the base URL, layers the
//! call's options over the base ones and sends the result:
//!
//! - query arguments and headers, additive or replacing
//! - basic auth and API key credentials
//! - explicit bodies or `multipart/form-data` forms with file attachments,
//!   optionally base64-transcoded
//! - per-call client, cancellation token, deadline and request dumps
//!
//! The answer is a fully buffered [`Response`] with text, JSON and file
//! accessors. Statuses outside 200, 201, 202, 204 and 304 are returned as
//! [`HttpError::Status`], which still carries the response.
//!
//! Calls without a configured client share a process-wide [`HttpClient`]
//! (plain HTTP and TLS, 60 second timeout covering the body read, transparent
//! decompression).
//!
//! # Example
//!
//! ```ignore
//! use modkit_rest::{File, Request, options::*};
//!
//! let api = Request::new("https://api.example.com/v1/", [auth("user", "secret")])?;
//!
//! let report = api
//!     .make(
//!         "reports",
//!         [put(), field_file_as_base64("file", [File::new("a.txt", "hi")])],
//!     )
//!     .await?
//!     .file()?;
//! ```

mod builder;
mod client;
mod config;
pub mod consts;
mod dump;
mod error;
mod form;
mod layers;
pub mod options;
mod request;
mod response;
pub mod security;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::{HttpClient, HttpTransport, TransportFuture, default_client};
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, HttpClientConfig,
    TlsRootConfig, TransportSecurity,
};
pub use error::{BoxError, HttpError, InvalidUriKind, StatusKind};
pub use form::File;
pub use layers::{UserAgentLayer, UserAgentService};
pub use options::RequestOption;
pub use request::Request;
pub use response::{LimitedBody, Response, ResponseBody};
