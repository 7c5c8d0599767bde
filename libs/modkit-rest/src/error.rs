use crate::response::Response;
use crate::security::ERROR_BODY_PREVIEW_LIMIT;
use bytes::Bytes;
use http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed source error carried by the diagnostic variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is not absolute (no scheme)
    MissingScheme,
}

/// Domain category of a non-success response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatusKind {
    /// 404
    NotFound,
    /// 403
    Forbidden,
    /// 401
    Unauthorized,
    /// 400 and 405
    BadRequest,
    /// Every other non-success status
    Unavailable,
}

impl StatusKind {
    /// Classify a status code.
    ///
    /// Returns `None` for the success set: 200, 201, 202, 204 and 304.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::ACCEPTED
            | StatusCode::NO_CONTENT
            | StatusCode::NOT_MODIFIED => None,
            StatusCode::NOT_FOUND => Some(Self::NotFound),
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            StatusCode::UNAUTHORIZED => Some(Self::Unauthorized),
            StatusCode::BAD_REQUEST | StatusCode::METHOD_NOT_ALLOWED => Some(Self::BadRequest),
            _ => Some(Self::Unavailable),
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad request",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// REST client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Base or target URL is malformed or not absolute
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    BadUrl {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// An option was given invalid arguments
    #[error("Invalid option '{option}': {reason}")]
    BadOption {
        /// Name of the option that rejected its arguments
        option: &'static str,
        /// What was wrong with them
        reason: String,
    },

    /// Request body or multipart form could not be built
    #[error("Failed to build request body: {0}")]
    BadBody(#[source] BoxError),

    /// Transport request could not be built or sent
    #[error("Request {method} {url} failed (content length {content_length}): {source}")]
    BadRequest {
        method: http::Method,
        url: String,
        content_length: u64,
        #[source]
        source: BoxError,
    },

    /// Response could not be read or decoded
    ///
    /// `body` holds the raw bytes received so far for diagnostics.
    #[error("Invalid response: {reason}")]
    BadResponse {
        reason: String,
        body: Bytes,
        #[source]
        source: Option<BoxError>,
    },

    /// Exchange succeeded but the status is outside the success set
    ///
    /// The full response is kept so the caller can still inspect the body.
    #[error("HTTP {status} ({kind}): {}", body_preview(.response))]
    Status {
        kind: StatusKind,
        status: StatusCode,
        response: Box<Response>,
    },

    /// Single request attempt timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Call was cancelled through its cancellation token
    #[error("Request cancelled")]
    Cancelled,

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// Invalid header value in client configuration
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

impl HttpError {
    pub(crate) fn bad_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::BadOption {
            option,
            reason: reason.into(),
        }
    }

    /// Status category when this is a [`HttpError::Status`] error.
    #[must_use]
    pub fn status_kind(&self) -> Option<StatusKind> {
        match self {
            Self::Status { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Response attached to a [`HttpError::Status`] error.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Status { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Take the response out of a [`HttpError::Status`] error.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Status { response, .. } => Some(*response),
            _ => None,
        }
    }
}

fn body_preview(response: &Response) -> String {
    let body = response.body();
    let end = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
