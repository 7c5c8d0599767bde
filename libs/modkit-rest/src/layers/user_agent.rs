use crate::error::HttpError;
use http::header::USER_AGENT;
use http::{HeaderValue, Request};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Sets `User-Agent` on requests that do not carry one.
///
/// A `User-Agent` set through `replace_header` or `append_header` is kept.
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if `user_agent` is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        Ok(Self {
            user_agent: HeaderValue::from_str(user_agent.as_ref())?,
        })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, B> Service<Request<B>> for UserAgentService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn echo_user_agent(req: Request<()>) -> Result<Option<HeaderValue>, Infallible> {
        Ok(req.headers().get(USER_AGENT).cloned())
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let service = UserAgentLayer::try_new("modkit-rest/test")
            .unwrap()
            .layer(service_fn(echo_user_agent));

        let req = Request::get("https://example.com").body(()).unwrap();
        let seen = service.oneshot(req).await.unwrap();
        assert_eq!(seen.unwrap(), "modkit-rest/test");
    }

    #[tokio::test]
    async fn test_caller_user_agent_kept() {
        let service = UserAgentLayer::try_new("modkit-rest/test")
            .unwrap()
            .layer(service_fn(echo_user_agent));

        let req = Request::get("https://example.com")
            .header(USER_AGENT, "caller/2.0")
            .body(())
            .unwrap();
        let seen = service.oneshot(req).await.unwrap();
        assert_eq!(seen.unwrap(), "caller/2.0");
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        assert!(matches!(
            UserAgentLayer::try_new("bad\x00agent"),
            Err(HttpError::InvalidHeaderValue(_))
        ));
    }
}
