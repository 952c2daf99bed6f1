//! Inbound body handling.
//!
//! Multipart bodies are kept as raw bytes so the boundary survives
//! untouched; everything else is forwarded as text.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderMap;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundBody {
    Empty,
    Text(String),
    Raw(Bytes),
}

impl InboundBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_reqwest(self) -> Option<reqwest::Body> {
        match self {
            Self::Empty => None,
            Self::Text(text) => Some(text.into()),
            Self::Raw(bytes) => Some(bytes.into()),
        }
    }
}

pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"))
}

/// Rejects a declared `Content-Length` above `max` before reading anything.
pub fn enforce_body_limit(headers: &HeaderMap, max: usize) -> Result<(), ProxyError> {
    if let Some(value) = headers.get(CONTENT_LENGTH) {
        let length = value
            .to_str()
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or(ProxyError::InvalidBody)?;
        if length > max {
            return Err(ProxyError::BodyTooLarge);
        }
    }
    Ok(())
}

/// Reads the whole body, failing once it grows past `max` bytes.
pub async fn read(headers: &HeaderMap, body: Body, max: usize) -> Result<InboundBody, ProxyError> {
    enforce_body_limit(headers, max)?;

    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| ProxyError::InvalidBody)?;
        if buf.len() + chunk.len() > max {
            return Err(ProxyError::BodyTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }

    if buf.is_empty() {
        return Ok(InboundBody::Empty);
    }
    let bytes = buf.freeze();
    if is_multipart(headers) {
        Ok(InboundBody::Raw(bytes))
    } else {
        Ok(InboundBody::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(ct: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        h
    }

    #[tokio::test]
    async fn json_is_text() {
        let body = read(&headers("application/json"), Body::from(r#"{"a":1}"#), 64)
            .await
            .unwrap();
        assert_eq!(body.as_text(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn multipart_is_raw() {
        let payload: &'static [u8] = b"--xyz\r\ncontent-disposition: form-data\r\n\r\n\xff\xfe\r\n--xyz--";
        let body = read(
            &headers("multipart/form-data; boundary=xyz"),
            Body::from(payload),
            1024,
        )
        .await
        .unwrap();
        assert_eq!(body, InboundBody::Raw(Bytes::from_static(payload)));
    }

    #[tokio::test]
    async fn empty_body() {
        let body = read(&HeaderMap::new(), Body::empty(), 64).await.unwrap();
        assert_eq!(body, InboundBody::Empty);
        assert!(body.into_reqwest().is_none());
    }

    #[tokio::test]
    async fn oversized_streamed_body() {
        let result = read(&headers("text/plain"), Body::from("x".repeat(65)), 64).await;
        assert!(matches!(result, Err(ProxyError::BodyTooLarge)));
    }

    #[test]
    fn declared_length_limit() {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(enforce_body_limit(&h, 20).is_ok());

        h.insert(CONTENT_LENGTH, HeaderValue::from_static("128"));
        assert!(matches!(enforce_body_limit(&h, 64), Err(ProxyError::BodyTooLarge)));

        h.insert(CONTENT_LENGTH, HeaderValue::from_static("nope"));
        assert!(matches!(enforce_body_limit(&h, 64), Err(ProxyError::InvalidBody)));
    }
}
