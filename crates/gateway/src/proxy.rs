//! The forwarding handler.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, LOCATION};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info_span, warn};
use url::Url;
use uuid::Uuid;

use vaultdeck_protocol::ErrorBody;

use crate::body::{self, InboundBody};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::headers;
use crate::intent::wants_stream;
use crate::path::{self, BackendPath};
use crate::relay::{Relay, Stop, stop_signal};

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        // The backend is addressed directly; environment proxies do not apply.
        // Redirects go back to the caller so every hop passes the path policy.
        let client = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

/// Axum handler for every proxied method.
pub async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let span = info_span!(
        "proxy",
        request_id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    async move {
        match proxy(&state, req).await {
            Ok(resp) => resp,
            Err(e) => {
                match &e {
                    ProxyError::InvalidPath => warn!("rejected backend path"),
                    ProxyError::Timeout => warn!("backend timed out"),
                    other => debug!("proxy failed: {other}"),
                }
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn proxy(state: &ProxyState, req: Request) -> Result<Response, ProxyError> {
    let config = &state.config;
    let (parts, inbound_body) = req.into_parts();

    // Policy first: nothing below runs for a rejected path.
    let backend_path = path::resolve(
        parts.uri.path(),
        &config.mount_prefix,
        &config.allowed_prefixes,
    )?;

    let cancel = CancellationToken::new();
    // Fires when this future or the relayed body is dropped.
    let guard = cancel.clone().drop_guard();
    let mut stop = stop_signal(cancel.clone(), Instant::now() + config.timeout);

    let body = if headers::carries_body(&parts.method) {
        tokio::select! {
            body = body::read(&parts.headers, inbound_body, config.max_body_bytes) => body?,
            reason = &mut stop => return Err(stop_error(reason)),
        }
    } else {
        InboundBody::Empty
    };
    let streaming = wants_stream(
        &parts.method,
        &backend_path.decoded,
        &body,
        &config.streaming_paths,
    );

    let url = target_url(&config.backend_url, &backend_path, parts.uri.query())?;
    let mut outbound = state
        .client
        .request(parts.method.clone(), url)
        .headers(headers::outbound(&parts.headers, &parts.method, config));
    if let Some(body) = body.into_reqwest() {
        outbound = outbound.body(body);
    }
    debug!(streaming, "forwarding to backend");

    let response = tokio::select! {
        result = outbound.send() => result.map_err(|e| {
            warn!("backend request failed: {e}");
            ProxyError::Unavailable
        })?,
        reason = &mut stop => return Err(stop_error(reason)),
    };

    let status = response.status();
    if streaming && !status.is_redirection() {
        if !status.is_success() {
            return stream_error(response, &mut stop).await;
        }
        let mut resp = Response::new(relay_body(response, stop, guard));
        let headers = resp.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        return Ok(resp);
    }

    let kept: Vec<_> = [CONTENT_TYPE, LOCATION]
        .into_iter()
        .filter_map(|name| {
            let value = response.headers().get(&name).cloned()?;
            Some((name, value))
        })
        .collect();
    let mut resp = Response::new(relay_body(response, stop, guard));
    *resp.status_mut() = status;
    resp.headers_mut().extend(kept);
    Ok(resp)
}

fn target_url(base: &Url, path: &BackendPath, query: Option<&str>) -> Result<Url, ProxyError> {
    let mut target = format!("{}{}", base.as_str().trim_end_matches('/'), path.raw);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    Url::parse(&target).map_err(|e| {
        warn!("cannot build backend URL: {e}");
        ProxyError::InvalidPath
    })
}

fn relay_body(response: reqwest::Response, stop: BoxFuture<'static, Stop>, guard: DropGuard) -> Body {
    Body::from_stream(Relay::new(Box::pin(response.bytes_stream()), stop, guard))
}

fn stop_error(reason: Stop) -> ProxyError {
    match reason {
        Stop::Deadline => ProxyError::Timeout,
        Stop::Cancelled => ProxyError::Unavailable,
    }
}

/// A streaming request the backend refused: hand back its whole error body
/// as JSON under the backend's status.
async fn stream_error(
    response: reqwest::Response,
    stop: &mut BoxFuture<'static, Stop>,
) -> Result<Response, ProxyError> {
    let status = response.status();
    let text = tokio::select! {
        text = response.text() => text.map_err(|_| ProxyError::Unavailable)?,
        reason = stop => return Err(stop_error(reason)),
    };
    debug!(%status, "backend refused streaming request");

    let resp = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => (status, Json(json)).into_response(),
        Err(_) => (status, Json(ErrorBody::new(text))).into_response(),
    };
    Ok(resp)
}
