use crate::consts::{HEADER_CONTENT_TRANSFER_ENCODING, MIME_UNKNOWN, TRANSFER_ENCODING_BASE64};
use crate::error::{BoxError, HttpError, StatusKind};
use crate::form::File;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

/// Boxed response body produced by an [`HttpTransport`](crate::HttpTransport).
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

pin_project! {
    /// Body wrapper that enforces size limits during streaming.
    ///
    /// Tracks bytes read and returns [`HttpError::BodyTooLarge`] once the
    /// limit is exceeded. The default client wraps every response in it.
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    /// Creates a new `LimitedBody` wrapping the given body with the specified limit.
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Returns the number of bytes read so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    /// Returns the configured size limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HttpError::Transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Fully buffered response of one call.
///
/// Holds the URL the request was sent to, the status, the headers and the
/// whole body. The connection is released before the value is handed out.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub(crate) fn new(url: String, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Drain `response` into memory.
    ///
    /// The body stream is dropped as soon as it is exhausted or fails.
    pub(crate) async fn read(
        url: String,
        response: http::Response<ResponseBody>,
    ) -> Result<Self, HttpError> {
        let (parts, body) = response.into_parts();

        let mut collected = Vec::new();
        let mut body = std::pin::pin!(body);

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| HttpError::BadResponse {
                reason: format!("failed to read response body from {url}"),
                body: Bytes::from(std::mem::take(&mut collected)),
                source: Some(e),
            })?;
            if let Some(chunk) = frame.data_ref() {
                collected.extend_from_slice(chunk);
            }
        }

        Ok(Self::new(url, parts.status, parts.headers, Bytes::from(collected)))
    }

    /// URL the request was sent to, query included.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Numeric status code.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body as text; invalid UTF-8 sequences are replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// `Content-Type` of the response, if present and readable.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Parsed `Last-Modified` header.
    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        let value = self.headers.get(LAST_MODIFIED)?.to_str().ok()?;
        httpdate::parse_http_date(value.trim()).ok()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BadResponse` carrying the raw body if decoding fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::BadResponse {
            reason: "failed to decode JSON body".to_owned(),
            body: self.body.clone(),
            source: Some(Box::new(e)),
        })
    }

    /// Interpret the response as a file attachment.
    ///
    /// The name comes from `Content-Disposition` (`filename*` wins over
    /// `filename`) and falls back to the last path segment of the request URL.
    /// A plain `filename` is percent-decoded, mirroring how uploads encode it.
    /// A body sent with `Content-Transfer-Encoding: base64` is decoded.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BadResponse` if the attachment headers cannot be
    /// parsed or the base64 payload is malformed.
    pub fn file(&self) -> Result<File, HttpError> {
        let disposition = self.header_str(CONTENT_DISPOSITION.as_str())?;
        let name = match disposition.map(disposition_filename).transpose() {
            Ok(Some(Some(name))) => name,
            Ok(_) => last_path_segment(&self.url),
            Err(reason) => return Err(self.bad_response(reason, None)),
        };

        let mime = self
            .header_str(CONTENT_TYPE.as_str())?
            .unwrap_or(MIME_UNKNOWN)
            .to_owned();

        let encoded = self
            .header_str(HEADER_CONTENT_TRANSFER_ENCODING)?
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(TRANSFER_ENCODING_BASE64));

        let data = if encoded {
            let compact: Vec<u8> = self
                .body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            let decoded = STANDARD.decode(compact).map_err(|e| {
                self.bad_response("malformed base64 payload".to_owned(), Some(Box::new(e)))
            })?;
            Bytes::from(decoded)
        } else {
            self.body.clone()
        };

        Ok(File {
            name,
            mime,
            data,
            base64: encoded,
        })
    }

    /// Map the status to a domain error.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Status` holding a copy of this response when the
    /// status is not one of 200, 201, 202, 204 or 304.
    pub fn error(&self) -> Result<(), HttpError> {
        match StatusKind::from_status(self.status) {
            None => Ok(()),
            Some(kind) => Err(HttpError::Status {
                kind,
                status: self.status,
                response: Box::new(self.clone()),
            }),
        }
    }

    /// Same as [`error`](Self::error) but hands the response back on success.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Status` owning this response for non-success statuses.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        match StatusKind::from_status(self.status) {
            None => Ok(self),
            Some(kind) => Err(HttpError::Status {
                kind,
                status: self.status,
                response: Box::new(self),
            }),
        }
    }

    fn header_str(&self, name: &str) -> Result<Option<&str>, HttpError> {
        self.headers
            .get(name)
            .map(|v| v.to_str())
            .transpose()
            .map_err(|e| self.bad_response(format!("unreadable {name} header"), Some(Box::new(e))))
    }

    fn bad_response(&self, reason: String, source: Option<BoxError>) -> HttpError {
        HttpError::BadResponse {
            reason,
            body: self.body.clone(),
            source,
        }
    }
}

/// Extract the file name from a `Content-Disposition` value.
///
/// `Ok(None)` means the header is well formed but names no file.
fn disposition_filename(value: &str) -> Result<Option<String>, String> {
    let (kind, mut rest) = value.split_once(';').unwrap_or((value, ""));
    if kind.trim().is_empty() {
        return Err(format!("missing disposition type in '{value}'"));
    }

    let mut plain = None;
    let mut extended = None;

    loop {
        rest = rest.trim_start_matches([' ', '\t', ';']);
        if rest.is_empty() {
            break;
        }

        let (name, tail) = rest
            .split_once('=')
            .ok_or_else(|| format!("parameter without value in '{value}'"))?;
        let name = name.trim().to_ascii_lowercase();
        let tail = tail.trim_start();

        let (param, remainder) = if let Some(quoted) = tail.strip_prefix('"') {
            unquote(quoted).ok_or_else(|| format!("unterminated quoted string in '{value}'"))?
        } else {
            let end = tail.find(';').unwrap_or(tail.len());
            (tail[..end].trim().to_owned(), &tail[end..])
        };
        rest = remainder;

        match name.as_str() {
            "filename" => plain = Some(decode_plain(param)),
            "filename*" => extended = Some(decode_extended(&param)?),
            _ => {}
        }
    }

    Ok(extended.or(plain).filter(|name| !name.is_empty()))
}

/// Read a quoted string (opening quote already consumed); returns the value
/// and the input after the closing quote.
fn unquote(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            '"' => return Some((value, &input[i + 1..])),
            c => value.push(c),
        }
    }
    None
}

/// Percent-decode a plain `filename`, as uploads encode it.
///
/// Values that do not decode to UTF-8 are kept as sent.
fn decode_plain(param: String) -> String {
    match urlencoding::decode(&param) {
        Ok(Cow::Owned(decoded)) => decoded,
        _ => param,
    }
}

/// Decode an RFC 5987 `charset'language'value` parameter.
fn decode_extended(param: &str) -> Result<String, String> {
    let mut parts = param.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("malformed extended parameter '{param}'"));
    };

    if charset.eq_ignore_ascii_case("utf-8") {
        urlencoding::decode(encoded)
            .map(Cow::into_owned)
            .map_err(|e| format!("invalid UTF-8 in '{param}': {e}"))
    } else {
        Ok(String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes())).into_owned())
    }
}

/// Last non-empty path segment of `url`, percent-decoded.
fn last_path_segment(url: &str) -> String {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_owned())
        .unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    urlencoding::decode(segment)
        .map_or_else(|_| segment.to_owned(), Cow::into_owned)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::consts::MIME_JSON;
    use http::{HeaderName, HeaderValue};
    use std::time::Duration;

    fn response(
        status: u16,
        headers: &[(&'static str, &'static str)],
        body: &'static str,
    ) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        Response::new(
            "https://api.example.com/base/some/".to_owned(),
            StatusCode::from_u16(status).unwrap(),
            map,
            Bytes::from_static(body.as_bytes()),
        )
    }

    #[test]
    fn test_accessors() {
        let resp = response(200, &[("content-type", MIME_JSON)], "hello");
        assert_eq!(resp.url(), "https://api.example.com/base/some/");
        assert_eq!(resp.code(), 200);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body(), "hello");
        assert_eq!(resp.text(), "hello");
        assert_eq!(resp.content_type(), Some(MIME_JSON));
        assert!(resp.error().is_ok());
        assert_eq!(resp.into_body(), "hello");
    }

    #[test]
    fn test_error_mapping_keeps_body() {
        let resp = response(403, &[], "suck a lemon!\n");
        let err = resp.error().unwrap_err();
        assert_eq!(err.status_kind(), Some(StatusKind::Forbidden));
        assert_eq!(err.response().unwrap().body(), "suck a lemon!\n");
        assert!(err.to_string().contains("suck a lemon!"));

        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.into_response().unwrap().code(), 403);
    }

    #[test]
    fn test_json_decode() {
        #[derive(serde::Deserialize)]
        struct Dummy {
            ololo: String,
        }

        let resp = response(200, &[], r#"{"ololo": "purpur"}"#);
        let dummy: Dummy = resp.json().unwrap();
        assert_eq!(dummy.ololo, "purpur");

        let resp = response(200, &[], "not json");
        match resp.json::<Dummy>() {
            Err(HttpError::BadResponse { body, source, .. }) => {
                assert_eq!(body, "not json");
                assert!(source.is_some());
            }
            Err(other) => panic!("expected BadResponse, got {other:?}"),
            Ok(_) => panic!("expected BadResponse, got a value"),
        }
    }

    #[test]
    fn test_file_base64_attachment() {
        let resp = response(
            200,
            &[
                ("content-disposition", r#"attachement; filename="some.json""#),
                ("content-type", MIME_JSON),
                (HEADER_CONTENT_TRANSFER_ENCODING, "Base64"),
            ],
            "eyJvbG9sbyI6ICJwdXJwdXIifQ==",
        );

        let file = resp.file().unwrap();
        assert_eq!(file.name, "some.json");
        assert_eq!(file.mime, MIME_JSON);
        assert_eq!(file.data, r#"{"ololo": "purpur"}"#);
        assert!(file.base64);
        // the response itself is not modified
        assert_eq!(resp.body(), "eyJvbG9sbyI6ICJwdXJwdXIifQ==");
    }

    #[test]
    fn test_file_without_disposition_uses_url() {
        let resp = response(200, &[], "raw");
        let file = resp.file().unwrap();
        assert_eq!(file.name, "some");
        assert_eq!(file.mime, MIME_UNKNOWN);
        assert_eq!(file.data, "raw");
        assert!(!file.base64);
    }

    #[test]
    fn test_file_extended_filename_wins() {
        let resp = response(
            200,
            &[(
                "content-disposition",
                "attachment; filename=\"fallback.txt\"; filename*=UTF-8''report%20%C3%A9.txt",
            )],
            "x",
        );
        assert_eq!(resp.file().unwrap().name, "report \u{e9}.txt");
    }

    #[test]
    fn test_file_escaped_quotes_and_token_value() {
        let resp = response(
            200,
            &[("content-disposition", r#"attachment; filename="a \"b\".txt""#)],
            "x",
        );
        assert_eq!(resp.file().unwrap().name, "a \"b\".txt");

        let resp = response(200, &[("content-disposition", "attachment; filename=plain.bin")], "x");
        assert_eq!(resp.file().unwrap().name, "plain.bin");
    }

    #[test]
    fn test_file_plain_filename_percent_decoded() {
        let resp = response(
            200,
            &[("content-disposition", r#"form-data; name="f"; filename="report%20a.txt""#)],
            "x",
        );
        assert_eq!(resp.file().unwrap().name, "report a.txt");

        let resp = response(200, &[("content-disposition", "attachment; filename=100%.txt")], "x");
        assert_eq!(resp.file().unwrap().name, "100%.txt");
    }

    #[test]
    fn test_file_disposition_without_name_uses_url() {
        let resp = response(200, &[("content-disposition", "inline")], "x");
        assert_eq!(resp.file().unwrap().name, "some");
    }

    #[test]
    fn test_file_malformed_headers() {
        let resp = response(
            200,
            &[("content-disposition", r#"attachment; filename="never closed"#)],
            "x",
        );
        assert!(matches!(resp.file(), Err(HttpError::BadResponse { .. })));

        let resp = response(200, &[("content-disposition", "; filename=x")], "x");
        assert!(matches!(resp.file(), Err(HttpError::BadResponse { .. })));

        let resp = response(200, &[(HEADER_CONTENT_TRANSFER_ENCODING, "base64")], "%%%not base64");
        assert!(matches!(resp.file(), Err(HttpError::BadResponse { .. })));
    }

    #[test]
    fn test_file_other_transfer_encoding_untouched() {
        let resp = response(
            200,
            &[(HEADER_CONTENT_TRANSFER_ENCODING, "quoted-printable")],
            "a=3Db",
        );
        let file = resp.file().unwrap();
        assert_eq!(file.data, "a=3Db");
        assert!(!file.base64);
    }

    #[test]
    fn test_last_modified() {
        let resp = response(200, &[("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")], "");
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        assert_eq!(resp.last_modified(), Some(expected));

        let resp = response(200, &[("last-modified", "yesterday")], "");
        assert_eq!(resp.last_modified(), None);
    }

    #[tokio::test]
    async fn test_read_buffers_body() {
        let body: ResponseBody = http_body_util::Full::new(Bytes::from("buffered"))
            .map_err(|never| match never {})
            .boxed();
        let inner = http::Response::builder()
            .status(StatusCode::CREATED)
            .header("x-test", "1")
            .body(body)
            .unwrap();

        let resp = Response::read("https://example.com/x".to_owned(), inner)
            .await
            .unwrap();
        assert_eq!(resp.code(), 201);
        assert_eq!(resp.headers()["x-test"], "1");
        assert_eq!(resp.body(), "buffered");
    }

    #[tokio::test]
    async fn test_read_enforces_limit() {
        let body: ResponseBody = http_body_util::Full::new(Bytes::from("x".repeat(64)))
            .map_err(|never| match never {})
            .boxed();
        let limited: ResponseBody = LimitedBody::new(body, 16).map_err(Into::into).boxed();
        let inner = http::Response::new(limited);

        let result = Response::read("https://example.com/x".to_owned(), inner).await;
        match result {
            Err(HttpError::BadResponse {
                source: Some(source),
                ..
            }) => {
                assert!(matches!(
                    source.downcast_ref::<HttpError>(),
                    Some(HttpError::BodyTooLarge { limit: 16, .. })
                ));
            }
            other => panic!("expected BadResponse, got {other:?}"),
        }
    }
}
