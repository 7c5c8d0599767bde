use std::time::Duration;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-rest/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout of the process-wide default client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on buffered response bodies (32 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Configuration of the default [`HttpClient`](crate::HttpClient)
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout (default: 60 seconds)
    ///
    /// The tower stack applies it up to the response head.
    /// [`Request::make`](crate::Request::make) applies it to the whole
    /// exchange, body included, when the call sets no `timeout` of its own.
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 32 MB)
    ///
    /// Applied to decompressed bytes while the response is buffered.
    pub max_body_size: usize,

    /// User-Agent header value, used when the request carries none
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    ///
    /// Use `AllowInsecureHttp` only for testing with local mock servers.
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
    }

    #[test]
    fn test_for_testing_config() {
        let config = HttpClientConfig::for_testing();
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_default_user_agent_has_version() {
        assert!(DEFAULT_USER_AGENT.starts_with("modkit-rest/"));
        assert!(DEFAULT_USER_AGENT.len() > "modkit-rest/".len());
    }
}
