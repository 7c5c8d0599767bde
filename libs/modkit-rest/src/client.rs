use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;

/// Future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send + 'a>>;

/// Type-erased tower stack behind [`HttpClient`].
pub type ClientService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Performs one HTTP round trip for [`Request::make`](crate::Request::make).
///
/// Implement it to route calls through a custom client or a test double. The
/// response body is drained by the caller, so implementations may stream it.
pub trait HttpTransport: Send + Sync {
    /// Send `request` and return the response head with a streaming body.
    fn execute(&self, request: Request<Full<Bytes>>) -> TransportFuture<'_>;

    /// Deadline for a whole exchange, body included, when the call sets none.
    fn request_timeout(&self) -> Option<Duration> {
        None
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn execute(&self, request: Request<Full<Bytes>>) -> TransportFuture<'_> {
        (**self).execute(request)
    }

    fn request_timeout(&self) -> Option<Duration> {
        (**self).request_timeout()
    }
}

/// HTTP client with tower middleware stack
///
/// The stack applies a per-request timeout, a default `User-Agent`,
/// transparent decompression and a response size limit on top of a pooled
/// hyper client. Non-2xx statuses are returned as responses; mapping them to
/// errors is left to [`Response::error`](crate::Response::error).
///
/// `HttpClient` is `Clone + Send + Sync`; clones share the connection pool.
/// Building one spawns nothing, so it can be created outside a runtime.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: ClientService,
    pub(crate) transport_security: TransportSecurity,
    pub(crate) request_timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Check the request URI against the transport security mode.
    fn validate_uri(&self, uri: &http::Uri) -> Result<(), HttpError> {
        if uri.authority().is_none() {
            return Err(HttpError::BadUrl {
                url: uri.to_string(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(()),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(()),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::BadUrl {
                url: uri.to_string(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }
}

impl HttpTransport for HttpClient {
    fn execute(&self, request: Request<Full<Bytes>>) -> TransportFuture<'_> {
        Box::pin(async move {
            self.validate_uri(request.uri())?;
            self.service.clone().oneshot(request).await
        })
    }

    fn request_timeout(&self) -> Option<Duration> {
        Some(self.request_timeout)
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("transport_security", &self.transport_security)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// Process-wide client used by calls that configure none.
///
/// Built on first use with [`HttpClientConfig::default`](crate::HttpClientConfig)
/// and shared afterwards. Unlike [`HttpClient::new`] it also serves `http://`
/// URLs, since [`Request::new`](crate::Request::new) accepts any absolute
/// base URL.
///
/// # Errors
/// Returns an error if the first initialization fails; later calls retry it.
pub fn default_client() -> Result<HttpClient, HttpError> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client.clone());
    }
    let client = HttpClientBuilder::new()
        .transport(TransportSecurity::AllowInsecureHttp)
        .build()?;
    tracing::debug!("default REST client initialized");
    Ok(DEFAULT_CLIENT.get_or_init(|| client).clone())
}
