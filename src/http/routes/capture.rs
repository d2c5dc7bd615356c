//! Capture lifecycle endpoints: start, stop, status, and interface listing.

use crate::error::AppError;
use axum::extract::State;
use axum::response::Json;
use pcap::Device;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct CaptureStatus {
    pub running: bool,
    pub captured: u64,
    pub interface: String,
}

#[derive(Debug, Deserialize)]
pub struct StartCaptureRequest {
    pub interface: Option<String>,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<CaptureStatus> {
    let producer = state.producer.lock().unwrap();
    Json(CaptureStatus {
        running: producer.is_running(),
        captured: producer.captured_count(),
        interface: producer.interface(),
    })
}

pub async fn interfaces() -> Result<Json<Vec<String>>, Json<AppError>> {
    Device::list()
        .map(|devices| Json(devices.into_iter().map(|d| d.name).collect()))
        .map_err(|e| Json(AppError::Capture(e.to_string())))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartCaptureRequest>,
) -> Result<Json<CaptureStatus>, (axum::http::StatusCode, Json<AppError>)> {
    let mut producer = state.producer.lock().unwrap();
    if let Some(interface) = req.interface {
        producer.set_interface(interface);
    }
    producer
        .start()
        .map(|()| Json(CaptureStatus {
            running: producer.is_running(),
            captured: producer.captured_count(),
            interface: producer.interface(),
        }))
        .map_err(|e| (axum::http::StatusCode::BAD_REQUEST, Json(e)))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<CaptureStatus> {
    let mut producer = state.producer.lock().unwrap();
    producer.stop();
    Json(CaptureStatus {
        running: producer.is_running(),
        captured: producer.captured_count(),
        interface: producer.interface(),
    })
}
