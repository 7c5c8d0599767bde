//! Wire-style rendering of outgoing requests for the `debug` option.

use crate::consts::HEADER_X_API_KEY;
use bytes::Bytes;
use http::header::{AUTHORIZATION, COOKIE, HOST, PROXY_AUTHORIZATION};
use http::{HeaderName, HeaderValue, Request};
use std::borrow::Cow;

const REDACTED: &str = "<redacted>";

/// Render `request` as it would appear on an HTTP/1.1 connection.
///
/// Credentials are masked; the body is rendered lossily as UTF-8.
pub fn render(request: &Request<Bytes>) -> String {
    let uri = request.uri();
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut out = String::new();
    out.push_str(request.method().as_str());
    out.push(' ');
    out.push_str(target);
    out.push_str(" HTTP/1.1\r\n");
    if !request.headers().contains_key(HOST)
        && let Some(authority) = uri.authority()
    {
        push_header(&mut out, "Host", authority.as_str());
    }
    for (name, value) in request.headers() {
        push_header(&mut out, name.as_str(), &display_value(name, value));
    }
    out.push_str("\r\n");
    out.push_str(&String::from_utf8_lossy(request.body()));
    out
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn display_value<'a>(name: &HeaderName, value: &'a HeaderValue) -> Cow<'a, str> {
    if is_secret(name, value) {
        return REDACTED.into();
    }
    String::from_utf8_lossy(value.as_bytes())
}

fn is_secret(name: &HeaderName, value: &HeaderValue) -> bool {
    value.is_sensitive()
        || name == AUTHORIZATION
        || name == PROXY_AUTHORIZATION
        || name == COOKIE
        || name.as_str().eq_ignore_ascii_case(HEADER_X_API_KEY)
}
