use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use vaultdeck_protocol::ErrorBody;

/// Failures the gateway answers itself. Backend error statuses are not
/// errors here; they are relayed.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid backend path")]
    InvalidPath,

    #[error("Invalid request body")]
    InvalidBody,

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Gateway timeout")]
    Timeout,

    #[error("Backend unavailable")]
    Unavailable,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPath | Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ProxyError::InvalidPath.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::BodyTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ProxyError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ProxyError::Unavailable.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn renders_json_error_body() {
        let resp = ProxyError::Timeout.into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"Gateway timeout"}"#);
    }
}
