//! Outbound header construction.

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method};
use percent_encoding::percent_decode_str;
use tracing::warn;

use crate::config::ProxyConfig;

/// Methods whose body is forwarded.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Value of cookie `name` across all `Cookie` headers, percent-decoded.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| {
            let v = v.trim_matches('"');
            percent_decode_str(v).decode_utf8_lossy().into_owned()
        })
}

/// Builds the backend request headers from scratch. Only an explicit set
/// of headers is copied; the access key moves from its cookie into
/// `config.access_key_header`.
pub fn outbound(inbound: &HeaderMap, method: &Method, config: &ProxyConfig) -> HeaderMap {
    let mut out = HeaderMap::new();

    if carries_body(method) {
        if let Some(ct) = inbound.get(CONTENT_TYPE) {
            out.insert(CONTENT_TYPE, ct.clone());
        }
    }
    for name in [AUTHORIZATION, ACCEPT] {
        if let Some(value) = inbound.get(&name) {
            out.insert(name, value.clone());
        }
    }

    if let Some(key) = cookie_value(inbound, &config.access_key_cookie).filter(|k| !k.is_empty()) {
        match HeaderValue::from_str(&key) {
            Ok(mut value) => {
                value.set_sensitive(true);
                out.insert(config.access_key_header.clone(), value);
            }
            Err(_) => warn!("access key cookie is not a valid header value, not forwarding it"),
        }
    }

    out
}
