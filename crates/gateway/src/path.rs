//! Backend path resolution and the allowlist check.
//!
//! The check runs on the percent-decoded path so encoded dot segments and
//! separators cannot slip past a prefix comparison. Anything that could be
//! reinterpreted by the backend (dot segments, empty segments, backslashes,
//! control characters, leftover percent escapes) is rejected outright rather
//! than rewritten.

use percent_encoding::percent_decode_str;

use crate::error::ProxyError;

/// A backend-relative path that passed the allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPath {
    /// As received, still percent-encoded. This is what gets forwarded.
    pub raw: String,
    /// Decoded form the checks ran on.
    pub decoded: String,
}

/// Strips `mount` from `inbound` and validates the remainder against
/// `allowed` prefixes.
pub fn resolve(inbound: &str, mount: &str, allowed: &[String]) -> Result<BackendPath, ProxyError> {
    let rest = inbound
        .strip_prefix(mount)
        .filter(|rest| rest.starts_with('/'))
        .ok_or(ProxyError::InvalidPath)?;

    let decoded = percent_decode_str(rest)
        .decode_utf8()
        .map_err(|_| ProxyError::InvalidPath)?;

    if decoded
        .chars()
        .any(|c| c == '\\' || c == '%' || c.is_control())
    {
        return Err(ProxyError::InvalidPath);
    }

    let segments: Vec<&str> = decoded[1..].split('/').collect();
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." | ".." => return Err(ProxyError::InvalidPath),
            // A trailing slash is fine; `//` is not.
            "" if i != last => return Err(ProxyError::InvalidPath),
            _ => {}
        }
    }

    if !allowed.iter().any(|prefix| decoded.starts_with(prefix.as_str())) {
        return Err(ProxyError::InvalidPath);
    }

    Ok(BackendPath {
        raw: rest.to_string(),
        decoded: decoded.into_owned(),
    })
}
