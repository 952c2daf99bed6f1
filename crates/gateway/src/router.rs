use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::proxy::{ProxyState, forward};

/// Router serving the proxy under its mount prefix, for
/// GET/POST/PUT/PATCH/DELETE.
pub fn router(state: ProxyState) -> Router {
    let route = format!("{}/{{*rest}}", state.config.mount_prefix);
    Router::new()
        .route(
            &route,
            get(forward)
                .post(forward)
                .put(forward)
                .patch(forward)
                .delete(forward),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
