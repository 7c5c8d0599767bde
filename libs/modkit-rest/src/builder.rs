use crate::client::{ClientService, HttpClient};
use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::UserAgentLayer;
use crate::response::{LimitedBody, ResponseBody};
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Builder for constructing an [`HttpClient`] with a layered tower middleware stack.
#[derive(Debug, Clone, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature, so release binaries cannot enable it by accident.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_rest::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Set the TLS root certificate source
    #[must_use]
    pub fn tls_roots(mut self, tls_roots: TlsRootConfig) -> Self {
        self.config.tls_roots = tls_roots;
        self
    }

    /// Set the idle connection timeout for the connection pool
    ///
    /// Set to `None` to keep hyper-util's default.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    ///
    /// `0` disables connection reuse.
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the HTTP client with all configured layers
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or the user agent is not a
    /// valid header value
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "plain HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 http:// traffic is not encrypted"
            );
        }

        let timeout = self.config.request_timeout;
        let max_body_size = self.config.max_body_size;

        let https = tls::https_connector(self.config.tls_roots, self.config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout only takes effect with a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;

        // Request flow: Timeout → UserAgent → Decompression → hyper client.
        // The size limit counts decompressed bytes.
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(move |response| limit_response(response, max_body_size))
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let service: ClientService = BoxCloneSyncService::new(service);

        tracing::debug!(
            ?timeout,
            max_body_size,
            transport = ?self.config.transport,
            tls_roots = ?self.config.tls_roots,
            "REST client built"
        );

        Ok(HttpClient {
            service,
            transport_security: self.config.transport,
            request_timeout: timeout,
        })
    }
}

/// Map tower errors to `HttpError` with the actual timeout duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompressed body behind a [`LimitedBody`].
fn limit_response<B>(response: Response<B>, limit: usize) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let body: ResponseBody = body.map_err(Into::into).boxed();
    let limited: ResponseBody = LimitedBody::new(body, limit).map_err(Into::into).boxed();
    Response::from_parts(parts, limited)
}
