//! HTTP security utilities.

/// Maximum body preview size for error messages (8KB).
///
/// When a call returns a non-success status, the start of the response body
/// is rendered into the error message. This constant limits how much of the
/// body ends up in logs.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;
