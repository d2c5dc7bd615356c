//! Configuration endpoints: filter rules and port/protocol rules, backed by
//! the persisted YAML config file.

use crate::bpf::FilterRule;
use crate::error::AppError;
use crate::rules::PortProtocolRule;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

use crate::http::state::AppState;

pub async fn get_filters(State(state): State<Arc<AppState>>) -> Json<Vec<FilterRule>> {
    Json(state.filters.lock().unwrap().clone())
}

pub async fn put_filters(
    State(state): State<Arc<AppState>>,
    Json(filters): Json<Vec<FilterRule>>,
) -> Result<StatusCode, (StatusCode, Json<AppError>)> {
    for rule in &filters {
        rule.validate().map_err(|e| (StatusCode::BAD_REQUEST, Json(e)))?;
    }
    *state.filters.lock().unwrap() = filters;
    state.apply_filters();
    state
        .persist_config()
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))
}

pub async fn get_rules(State(state): State<Arc<AppState>>) -> Json<Vec<PortProtocolRule>> {
    Json(state.rules.lock().unwrap().rules().to_vec())
}

pub async fn add_rule(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<PortProtocolRule>,
) -> Result<StatusCode, (StatusCode, Json<AppError>)> {
    state
        .rules
        .lock()
        .unwrap()
        .add(rule.clone())
        .map_err(|e| (StatusCode::CONFLICT, Json(e)))?;
    for port in &rule.ports {
        state.pipeline.port_map().set(*port, rule.protocol.clone());
    }
    state
        .persist_config()
        .map(|()| StatusCode::CREATED)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))
}

pub async fn remove_rule(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(protocol): axum::extract::Path<String>,
) -> Result<StatusCode, (StatusCode, Json<AppError>)> {
    let freed_ports = state.rules.lock().unwrap().remove_protocol(&protocol);
    for port in freed_ports {
        state.pipeline.port_map().remove(port);
    }
    state
        .persist_config()
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))
}
