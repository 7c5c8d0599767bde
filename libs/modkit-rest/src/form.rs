//! `multipart/form-data` encoding of form fields and file attachments.

use crate::consts::{
    HEADER_CONTENT_DISPOSITION, HEADER_CONTENT_TRANSFER_ENCODING, MIME_UNKNOWN,
    TRANSFER_ENCODING_BASE64,
};
use crate::error::HttpError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::HeaderValue;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::BTreeMap;
use std::fmt;

const BOUNDARY_LEN: usize = 30;

/// A named file payload, sent as a form attachment or extracted from a response.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct File {
    /// File name; required for attachments
    pub name: String,
    /// MIME type; `application/octet-stream` is used when empty
    pub mime: String,
    /// Raw payload
    pub data: Bytes,
    /// Payload is base64-transcoded on the wire
    pub base64: bool,
}

impl File {
    /// File with a name and payload and no declared MIME type.
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    /// Declare the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Declared MIME type or the generic binary fallback.
    #[must_use]
    pub fn mime_or_default(&self) -> &str {
        if self.mime.is_empty() {
            MIME_UNKNOWN
        } else {
            &self.mime
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("data_len", &self.data.len())
            .field("base64", &self.base64)
            .finish()
    }
}

/// Encoded form body together with its outer content type.
#[derive(Debug)]
pub struct Multipart {
    pub(crate) body: Bytes,
    pub(crate) content_type: HeaderValue,
}

/// Encode plain fields (sorted by name) followed by file attachments.
///
/// # Errors
///
/// Returns `HttpError::BadBody` when a content type contains a line break or
/// the outer content type is not a valid header value.
pub fn encode(
    fields: &BTreeMap<String, Bytes>,
    files: &BTreeMap<String, Vec<File>>,
) -> Result<Multipart, HttpError> {
    let boundary: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect();
    encode_with_boundary(fields, files, &boundary)
}

fn encode_with_boundary(
    fields: &BTreeMap<String, Bytes>,
    files: &BTreeMap<String, Vec<File>>,
    boundary: &str,
) -> Result<Multipart, HttpError> {
    let mut out = Vec::new();

    for (name, data) in fields {
        open_part(&mut out, boundary);
        push_line(
            &mut out,
            &format!(
                "{HEADER_CONTENT_DISPOSITION}: form-data; name=\"{}\"",
                escape_quotes(name)
            ),
        );
        push_line(&mut out, "");
        out.extend_from_slice(data);
    }

    for (field, attachments) in files {
        for file in attachments {
            let mime = file.mime_or_default();
            if mime.contains(['\r', '\n']) {
                return Err(HttpError::BadBody(
                    format!("line break in content type of file '{}'", file.name).into(),
                ));
            }

            open_part(&mut out, boundary);
            push_line(
                &mut out,
                &format!(
                    "{HEADER_CONTENT_DISPOSITION}: form-data; name=\"{}\"; filename=\"{}\"",
                    escape_quotes(field),
                    escape_quotes(&urlencoding::encode(&file.name)),
                ),
            );
            push_line(&mut out, &format!("Content-Type: {mime}"));
            if file.base64 {
                push_line(
                    &mut out,
                    &format!("{HEADER_CONTENT_TRANSFER_ENCODING}: {TRANSFER_ENCODING_BASE64}"),
                );
                push_line(&mut out, "");
                out.extend_from_slice(STANDARD.encode(&file.data).as_bytes());
            } else {
                push_line(&mut out, "");
                out.extend_from_slice(&file.data);
            }
        }
    }

    if !out.is_empty() {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let content_type = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}"))
        .map_err(|e| HttpError::BadBody(Box::new(e)))?;

    Ok(Multipart {
        body: Bytes::from(out),
        content_type,
    })
}

fn open_part(out: &mut Vec<u8>, boundary: &str) {
    if !out.is_empty() {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Escape backslash and double quote for a quoted header parameter.
fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
