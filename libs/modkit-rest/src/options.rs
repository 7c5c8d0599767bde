//! Request options and their resolution into a single configuration.
//!
//! Every option is a validated mutation of [`Options`]. A sequence of options
//! is resolved by a strict left fold that stops at the first invalid one, so
//! nothing reaches the network when any option is rejected.

use crate::client::HttpTransport;
use crate::consts::{HEADER_X_API_KEY, MIME_JSON};
use crate::error::HttpError;
use crate::form::File;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type ApplyFn = Box<dyn FnOnce(&mut Options) -> Result<(), HttpError> + Send>;

/// A single configuration change for a base request or a call.
///
/// Built by the functions of this module (`append_arg`, `put`, `field_file`, ...)
/// and consumed by [`Request::new`](crate::Request::new) and
/// [`Request::make`](crate::Request::make).
#[must_use = "options do nothing until passed to Request::new or Request::make"]
pub struct RequestOption {
    name: &'static str,
    apply: ApplyFn,
}

impl RequestOption {
    fn new(
        name: &'static str,
        apply: impl FnOnce(&mut Options) -> Result<(), HttpError> + Send + 'static,
    ) -> Self {
        Self {
            name,
            apply: Box::new(apply),
        }
    }

    /// Name of the option, as reported in [`HttpError::BadOption`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOption")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub(crate) user: String,
    pub(crate) password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolved configuration of a base request or of one call.
#[derive(Clone)]
pub struct Options {
    pub(crate) method: Method,
    pub(crate) append_args: BTreeMap<String, Vec<String>>,
    pub(crate) replace_args: BTreeMap<String, String>,
    pub(crate) append_headers: HeaderMap,
    pub(crate) replace_headers: HeaderMap,
    pub(crate) auth: Option<BasicAuth>,
    pub(crate) body: Option<Bytes>,
    pub(crate) fields: BTreeMap<String, Bytes>,
    pub(crate) files: BTreeMap<String, Vec<File>>,
    pub(crate) client: Option<Arc<dyn HttpTransport>>,
    pub(crate) debug: bool,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            method: Method::GET,
            append_args: BTreeMap::new(),
            replace_args: BTreeMap::new(),
            append_headers: HeaderMap::new(),
            replace_headers: HeaderMap::new(),
            auth: None,
            body: None,
            fields: BTreeMap::new(),
            files: BTreeMap::new(),
            client: None,
            debug: false,
            cancel: None,
            timeout: None,
        }
    }
}

impl Options {
    /// Whether a form body would be produced for these options.
    pub(crate) fn has_form(&self) -> bool {
        !self.fields.is_empty() || !self.files.is_empty()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("method", &self.method)
            .field("append_args", &self.append_args)
            .field("replace_args", &self.replace_args)
            .field("append_headers", &self.append_headers)
            .field("replace_headers", &self.replace_headers)
            .field("auth", &self.auth)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("client", &self.client.is_some())
            .field("debug", &self.debug)
            .field("cancel", &self.cancel.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Apply options in order, stopping at the first invalid one.
///
/// # Errors
///
/// Returns the `HttpError::BadOption` of the first option that fails validation.
pub fn resolve(
    options: impl IntoIterator<Item = RequestOption>,
) -> Result<Options, HttpError> {
    options
        .into_iter()
        .try_fold(Options::default(), |mut resolved, option| {
            (option.apply)(&mut resolved)?;
            Ok(resolved)
        })
}

fn require(option: &'static str, what: &str, value: &str) -> Result<(), HttpError> {
    if value.is_empty() {
        return Err(HttpError::bad_option(option, format!("{what} must not be empty")));
    }
    Ok(())
}

fn header_pair(
    option: &'static str,
    name: &str,
    value: &str,
) -> Result<(HeaderName, HeaderValue), HttpError> {
    require(option, "header name", name)?;
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| HttpError::bad_option(option, format!("invalid header name: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| HttpError::bad_option(option, format!("invalid header value: {e}")))?;
    Ok((name, value))
}

/// Add a query value; values accumulate per name.
pub fn append_arg(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    RequestOption::new("append_arg", move |o| {
        require("append_arg", "argument name", &name)?;
        o.append_args.entry(name).or_default().push(value);
        Ok(())
    })
}

/// Set a query value, overwriting any earlier value of the same name.
pub fn replace_arg(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    RequestOption::new("replace_arg", move |o| {
        require("replace_arg", "argument name", &name)?;
        o.replace_args.insert(name, value);
        Ok(())
    })
}

/// Add a header value; values accumulate per name.
pub fn append_header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    RequestOption::new("append_header", move |o| {
        let (name, value) = header_pair("append_header", &name, &value)?;
        o.append_headers.append(name, value);
        Ok(())
    })
}

/// Set a header value, overwriting any earlier value of the same name.
pub fn replace_header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    RequestOption::new("replace_header", move |o| {
        let (name, value) = header_pair("replace_header", &name, &value)?;
        o.replace_headers.insert(name, value);
        Ok(())
    })
}

/// Send `key` in the `X-API-Key` header.
pub fn api_key(key: impl Into<String>) -> RequestOption {
    let key = key.into();
    RequestOption::new("api_key", move |o| {
        require("api_key", "key", &key)?;
        let (name, value) = header_pair("api_key", HEADER_X_API_KEY, &key)?;
        o.replace_headers.insert(name, value);
        Ok(())
    })
}

/// Basic-auth credentials. An empty user is rejected.
pub fn auth(user: impl Into<String>, password: impl Into<String>) -> RequestOption {
    let (user, password) = (user.into(), password.into());
    RequestOption::new("auth", move |o| {
        require("auth", "user", &user)?;
        o.auth = Some(BasicAuth { user, password });
        Ok(())
    })
}

/// HTTP method by name, e.g. `"PROPFIND"`.
pub fn method(method: impl Into<String>) -> RequestOption {
    let method = method.into();
    RequestOption::new("method", move |o| {
        require("method", "method", &method)?;
        o.method = Method::from_bytes(method.as_bytes())
            .map_err(|e| HttpError::bad_option("method", e.to_string()))?;
        Ok(())
    })
}

fn set_method(method: Method) -> RequestOption {
    RequestOption::new("method", move |o| {
        o.method = method;
        Ok(())
    })
}

pub fn get() -> RequestOption {
    set_method(Method::GET)
}

pub fn put() -> RequestOption {
    set_method(Method::PUT)
}

pub fn head() -> RequestOption {
    set_method(Method::HEAD)
}

pub fn post() -> RequestOption {
    set_method(Method::POST)
}

pub fn patch() -> RequestOption {
    set_method(Method::PATCH)
}

pub fn delete() -> RequestOption {
    set_method(Method::DELETE)
}

/// Explicit request body with its content type.
///
/// An explicit body always wins over form fields and is sent for every method.
pub fn body(mime: impl Into<String>, data: impl Into<Bytes>) -> RequestOption {
    let (mime, data) = (mime.into(), data.into());
    RequestOption::new("body", move |o| {
        require("body", "content type", &mime)?;
        let mime = HeaderValue::from_str(&mime)
            .map_err(|e| HttpError::bad_option("body", format!("invalid content type: {e}")))?;
        o.replace_headers.insert(CONTENT_TYPE, mime);
        o.body = Some(data);
        Ok(())
    })
}

/// Explicit JSON body; the value is serialized when the option is built.
pub fn json<T: Serialize + ?Sized>(value: &T) -> RequestOption {
    let encoded = serde_json::to_vec(value);
    RequestOption::new("json", move |o| {
        let data = encoded.map_err(|e| HttpError::bad_option("json", e.to_string()))?;
        o.replace_headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(MIME_JSON));
        o.body = Some(Bytes::from(data));
        Ok(())
    })
}

/// Plain form field with raw bytes.
pub fn field(name: impl Into<String>, data: impl Into<Bytes>) -> RequestOption {
    let (name, data) = (name.into(), data.into());
    RequestOption::new("field", move |o| {
        require("field", "field name", &name)?;
        o.fields.insert(name, data);
        Ok(())
    })
}

/// Plain form field with a string value.
pub fn field_str(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    RequestOption::new("field_str", move |o| {
        require("field_str", "field name", &name)?;
        o.fields.insert(name, Bytes::from(value));
        Ok(())
    })
}

/// Plain form field holding the JSON encoding of `value`.
pub fn field_json<T: Serialize + ?Sized>(name: impl Into<String>, value: &T) -> RequestOption {
    let name = name.into();
    let encoded = serde_json::to_vec(value);
    RequestOption::new("field_json", move |o| {
        require("field_json", "field name", &name)?;
        let data = encoded.map_err(|e| HttpError::bad_option("field_json", e.to_string()))?;
        o.fields.insert(name, Bytes::from(data));
        Ok(())
    })
}

fn attach(
    option: &'static str,
    field: String,
    files: Vec<File>,
    base64: bool,
) -> RequestOption {
    RequestOption::new(option, move |o| {
        require(option, "field name", &field)?;
        if files.is_empty() {
            return Err(HttpError::bad_option(option, "at least one file is required"));
        }
        if files.iter().any(|f| f.name.is_empty()) {
            return Err(HttpError::bad_option(option, "file name must not be empty"));
        }
        o.files
            .entry(field)
            .or_default()
            .extend(files.into_iter().map(|f| File { base64, ..f }));
        Ok(())
    })
}

/// Attach files to a form field.
pub fn field_file(
    field: impl Into<String>,
    files: impl IntoIterator<Item = File>,
) -> RequestOption {
    attach("field_file", field.into(), files.into_iter().collect(), false)
}

/// Attach files to a form field, transcoding their payload to base64.
pub fn field_file_as_base64(
    field: impl Into<String>,
    files: impl IntoIterator<Item = File>,
) -> RequestOption {
    attach(
        "field_file_as_base64",
        field.into(),
        files.into_iter().collect(),
        true,
    )
}

/// Use `transport` instead of the base request's or the default client.
pub fn client<T: HttpTransport + 'static>(transport: T) -> RequestOption {
    shared_client(Arc::new(transport))
}

/// Same as [`client`] for an already shared transport.
pub fn shared_client(transport: Arc<dyn HttpTransport>) -> RequestOption {
    RequestOption::new("client", move |o| {
        o.client = Some(transport);
        Ok(())
    })
}

/// Log a full dump of every outgoing request.
pub fn debug() -> RequestOption {
    RequestOption::new("debug", |o| {
        o.debug = true;
        Ok(())
    })
}

/// Abort the call when `token` is cancelled.
pub fn context(token: CancellationToken) -> RequestOption {
    RequestOption::new("context", move |o| {
        o.cancel = Some(token);
        Ok(())
    })
}

/// Deadline for the whole exchange, including body buffering.
pub fn timeout(deadline: Duration) -> RequestOption {
    RequestOption::new("timeout", move |o| {
        if deadline.is_zero() {
            return Err(HttpError::bad_option("timeout", "deadline must be non-zero"));
        }
        o.timeout = Some(deadline);
        Ok(())
    })
}
