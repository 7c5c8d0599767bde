//! Header names and MIME types shared with the servers this crate talks to.
//!
//! The MIME strings are compared byte-for-byte by existing servers; do not
//! normalize them.

pub const HEADER_X_API_KEY: &str = "X-API-Key";
pub const HEADER_CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const HEADER_LAST_MODIFIED: &str = "Last-Modified";
pub const HEADER_AUTHORIZATION: &str = "Authorization";

pub const MIME_XML: &str = "text/xml; charset=utf-8";
pub const MIME_ZIP: &str = "application/zip; application/octet-stream";
pub const MIME_TGZ: &str = "application/tar+gzip; application/gzip; application/octet-stream";
pub const MIME_JSON: &str = "application/json; charset=utf-8";
pub const MIME_TEXT: &str = "text/html; charset=utf-8";
/// Fallback for bodies and attachments without a declared type.
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// Transfer encoding value marking a base64-transcoded payload.
pub const TRANSFER_ENCODING_BASE64: &str = "base64";

/// Methods that never carry a form body.
pub(crate) fn forbids_form_body(method: &http::Method) -> bool {
    method == http::Method::GET || method == http::Method::HEAD
}
