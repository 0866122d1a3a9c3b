use crate::handlers::auth_handler::{self, AppState};
use crate::middleware::auth;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Install the global Prometheus recorder.
///
/// Fails if a recorder is already installed in this process; test harnesses
/// fall back to a standalone recorder in that case.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/me", get(auth_handler::handle_me))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        // Session lifecycle endpoints
        .route("/api/v1/auth/login", post(auth_handler::handle_login))
        .route("/api/v1/auth/refresh", post(auth_handler::handle_refresh))
        .route("/api/v1/auth/logout", post(auth_handler::handle_logout))
        // Authenticated surface
        .merge(protected)
        // Health check
        .route("/health", get(health_check))
        // Prometheus scrape endpoint
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
