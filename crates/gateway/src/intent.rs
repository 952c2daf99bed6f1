use axum::http::Method;
use serde_json::Value;

use crate::body::InboundBody;

/// Whether the caller asked for an event stream: a POST to one of
/// `streaming_paths` whose JSON body has `"stream": true`. Bodies that are
/// not JSON objects never stream.
pub fn wants_stream(
    method: &Method,
    backend_path: &str,
    body: &InboundBody,
    streaming_paths: &[String],
) -> bool {
    if *method != Method::POST || !streaming_paths.iter().any(|p| p == backend_path) {
        return false;
    }
    let Some(text) = body.as_text() else {
        return false;
    };
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("stream").and_then(Value::as_bool))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: &str = "/v1/chat/completions";

    fn paths() -> Vec<String> {
        vec![CHAT.into()]
    }

    fn text(s: &str) -> InboundBody {
        InboundBody::Text(s.into())
    }

    #[test]
    fn stream_true_on_chat_post() {
        let body = text(r#"{"model":"m","stream":true,"messages":[]}"#);
        assert!(wants_stream(&Method::POST, CHAT, &body, &paths()));
    }

    #[test]
    fn stream_false_or_missing() {
        for body in [r#"{"stream":false}"#, r#"{"model":"m"}"#, r#"{"stream":"true"}"#] {
            assert!(!wants_stream(&Method::POST, CHAT, &text(body), &paths()), "{body}");
        }
    }

    #[test]
    fn non_json_never_streams() {
        for body in ["stream: true", "", "[true]", "null"] {
            assert!(!wants_stream(&Method::POST, CHAT, &text(body), &paths()), "{body}");
        }
        assert!(!wants_stream(
            &Method::POST,
            CHAT,
            &InboundBody::Raw(bytes::Bytes::from_static(br#"{"stream":true}"#)),
            &paths()
        ));
        assert!(!wants_stream(&Method::POST, CHAT, &InboundBody::Empty, &paths()));
    }

    #[test]
    fn other_paths_and_methods_never_stream() {
        let body = text(r#"{"stream":true}"#);
        assert!(!wants_stream(&Method::POST, "/v1/completions", &body, &paths()));
        assert!(!wants_stream(&Method::PUT, CHAT, &body, &paths()));
        assert!(!wants_stream(&Method::GET, CHAT, &body, &paths()));
    }
}
