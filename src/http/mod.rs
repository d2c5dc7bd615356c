//! Thin HTTP surface over the capture lifecycle, configuration, and query
//! engine. One handler per operation, a shared `AppState`, uniform JSON
//! error envelopes — the teacher's command-surface shape, wired through
//! `axum` instead of Tauri's IPC bridge.

pub mod auth;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.backend_cors_origins);

    let mutating = Router::new()
        .route("/capture/start", post(routes::capture::start))
        .route("/capture/stop", post(routes::capture::stop))
        .route("/config/filters", put(routes::config::put_filters))
        .route("/config/rules", post(routes::config::add_rule))
        .route("/config/rules/:protocol", axum::routing::delete(routes::config::remove_rule))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_token));

    let readonly = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/capture/status", get(routes::capture::status))
        .route("/capture/interfaces", get(routes::capture::interfaces))
        .route("/config/filters", get(routes::config::get_filters))
        .route("/config/rules", get(routes::config::get_rules))
        .route("/query/packets", get(routes::query::by_time_range))
        .route("/query/packets/by-source-ip", get(routes::query::by_source_ip))
        .route("/query/packets/by-protocol", get(routes::query::by_protocol))
        .route("/query/packets/by-port", get(routes::query::by_port))
        .route("/query/packets/by-region", get(routes::query::by_region))
        .route("/query/top-source-ips", get(routes::query::top_source_ips))
        .route("/query/protocol-distribution", get(routes::query::protocol_distribution))
        .route("/query/time-series", get(routes::query::time_series))
        .route("/query/traffic-summary", get(routes::query::traffic_summary));

    Router::new()
        .merge(mutating)
        .merge(readonly)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
    }
}
