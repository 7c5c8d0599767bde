//! Base request and per-call execution.

use crate::client::{HttpTransport, default_client};
use crate::consts::{MIME_UNKNOWN, forbids_form_body};
use crate::dump;
use crate::error::{HttpError, InvalidUriKind};
use crate::form;
use crate::options::{self, BasicAuth, Options, RequestOption};
use crate::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::HeaderMap;
use http_body_util::Full;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Reusable base request: an absolute base URL plus shared options.
///
/// Each [`make`](Self::make) call joins a reference onto the base URL and
/// layers its own options over the base ones. The base is never mutated, so
/// one `Request` can serve concurrent calls.
///
/// ```ignore
/// use modkit_rest::{Request, options::*};
///
/// let api = Request::new("https://api.example.com/base/", [api_key("secret")])?;
/// let resp = api.make("items", [append_arg("page", "2")]).await?;
/// let items: Vec<Item> = resp.json()?;
/// ```
///
/// Body and form options only take effect per call; on a base request they
/// are ignored.
#[derive(Clone, Debug)]
pub struct Request {
    base: Url,
    options: Arc<Options>,
}

impl Request {
    /// Resolve `options` and validate `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BadOption` for the first invalid option, or
    /// `HttpError::BadUrl` when `base_url` is not an absolute URL with a host.
    pub fn new(
        base_url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Self, HttpError> {
        let options = options::resolve(options)?;
        let base = parse_base(base_url)?;

        if options.body.is_some() || options.has_form() {
            tracing::warn!(
                base_url = %base,
                "body and form options on a base request are ignored; pass them to make()"
            );
        }

        Ok(Self {
            base,
            options: Arc::new(options),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Send one request for `reference` relative to the base URL.
    ///
    /// The reference is appended to the base path with exactly one `/`
    /// between them. Query arguments and headers are merged in four stages:
    /// base additive, base replacing, call additive, call replacing.
    ///
    /// # Errors
    ///
    /// - `HttpError::BadOption` when a call option is invalid; nothing is sent.
    /// - `HttpError::BadUrl` or `HttpError::BadBody` when the request cannot be built.
    /// - `HttpError::BadRequest` for transport failures, cancellation and deadlines.
    ///   Without a `timeout` option the client's request timeout bounds the
    ///   whole exchange, body included.
    /// - `HttpError::BadResponse` when the body cannot be read.
    /// - `HttpError::Status` for a status outside the success set; the error
    ///   holds the full response.
    pub async fn make(
        &self,
        reference: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, HttpError> {
        let call = options::resolve(options)?;
        let request = self.build(reference, &call)?;

        let method = request.method().clone();
        let url = request.uri().to_string();
        let content_length = u64::try_from(request.body().len()).unwrap_or(u64::MAX);
        let bad_request = |source: HttpError| HttpError::BadRequest {
            method: method.clone(),
            url: url.clone(),
            content_length,
            source: Box::new(source),
        };

        let transport = self.transport(&call).map_err(bad_request)?;

        if self.options.debug || call.debug {
            tracing::info!(target: "modkit_rest::dump", "{}", dump::render(&request));
        }

        let request = request.map(Full::new);
        let exchange = async {
            let response = transport.execute(request).await.map_err(bad_request)?;
            Response::read(url.clone(), response).await
        };

        let cancel = call.cancel.as_ref().or(self.options.cancel.as_ref());
        let deadline = call
            .timeout
            .or(self.options.timeout)
            .or_else(|| transport.request_timeout());
        let response = guarded(cancel, deadline, exchange)
            .await
            .map_err(bad_request)??;

        tracing::debug!(%method, %url, status = response.code(), "REST call completed");
        response.error_for_status()
    }

    /// Assemble the outgoing request without sending it.
    fn build(&self, reference: &str, call: &Options) -> Result<http::Request<Bytes>, HttpError> {
        let base = &*self.options;

        let mut multipart_type = None;
        let body = if let Some(body) = &call.body {
            body.clone()
        } else if call.has_form() && !forbids_form_body(&call.method) {
            let encoded = form::encode(&call.fields, &call.files)?;
            multipart_type = Some(encoded.content_type);
            encoded.body
        } else {
            Bytes::new()
        };

        let mut url = self.join(reference)?;
        let mut args = existing_args(&self.base, &url);
        for stage in [base, call] {
            for (name, values) in &stage.append_args {
                args.entry(name.clone()).or_default().extend(values.iter().cloned());
            }
            for (name, value) in &stage.replace_args {
                args.insert(name.clone(), vec![value.clone()]);
            }
        }
        set_query(&mut url, &args);

        let mut headers = HeaderMap::new();
        for stage in [base, call] {
            for (name, value) in &stage.append_headers {
                headers.append(name.clone(), value.clone());
            }
            for (name, value) in &stage.replace_headers {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(content_type) = multipart_type {
            headers.insert(CONTENT_TYPE, content_type);
        }
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(MIME_UNKNOWN));

        if let Some(credentials) = call.auth.as_ref().or(base.auth.as_ref()) {
            headers.insert(AUTHORIZATION, basic_auth(credentials)?);
        }

        let content_length = u64::try_from(body.len()).unwrap_or(u64::MAX);
        let mut request = http::Request::builder()
            .method(call.method.clone())
            .uri(url.as_str())
            .body(body)
            .map_err(|e| HttpError::BadRequest {
                method: call.method.clone(),
                url: url.to_string(),
                content_length,
                source: Box::new(e),
            })?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// `base` without query and trailing slashes, one `/`, then `reference`
    /// without surrounding whitespace and leading slashes.
    fn join(&self, reference: &str) -> Result<Url, HttpError> {
        let mut base = self.base.clone();
        base.set_query(None);
        base.set_fragment(None);

        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            reference.trim().trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| HttpError::BadUrl {
            url: joined.clone(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        url.set_fragment(None);
        Ok(url)
    }

    fn transport(&self, call: &Options) -> Result<Arc<dyn HttpTransport>, HttpError> {
        if let Some(client) = call.client.as_ref().or(self.options.client.as_ref()) {
            return Ok(Arc::clone(client));
        }
        Ok(Arc::new(default_client()?))
    }
}

fn parse_base(base_url: &str) -> Result<Url, HttpError> {
    let base = Url::parse(base_url.trim()).map_err(|e| HttpError::BadUrl {
        url: base_url.to_owned(),
        kind: match e {
            url::ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            _ => InvalidUriKind::ParseError,
        },
        reason: e.to_string(),
    })?;

    if !base.has_host() {
        return Err(HttpError::BadUrl {
            url: base_url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "base URL must be absolute with a host".to_owned(),
        });
    }
    Ok(base)
}

/// Query pairs already present on the base URL and the reference.
fn existing_args(base: &Url, joined: &Url) -> BTreeMap<String, Vec<String>> {
    let mut args: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in base.query_pairs().chain(joined.query_pairs()) {
        args.entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    args
}

/// Encode `args` sorted by name; no query at all when empty.
fn set_query(url: &mut Url, args: &BTreeMap<String, Vec<String>>) {
    if args.is_empty() {
        url.set_query(None);
        return;
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, values) in args {
        for value in values {
            serializer.append_pair(name, value);
        }
    }
    url.set_query(Some(&serializer.finish()));
}

fn basic_auth(credentials: &BasicAuth) -> Result<HeaderValue, HttpError> {
    let token = STANDARD.encode(format!("{}:{}", credentials.user, credentials.password));
    let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Run `exchange` under the call's cancellation token and deadline.
///
/// A token cancelled before the call starts wins without polling `exchange`.
async fn guarded<F: Future>(
    cancel: Option<&CancellationToken>,
    deadline: Option<Duration>,
    exchange: F,
) -> Result<F::Output, HttpError> {
    let timed = async {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .map_err(|_| HttpError::Timeout(deadline)),
            None => Ok(exchange.await),
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(HttpError::Cancelled),
            output = timed => output,
        },
        None => timed.await,
    }
}
