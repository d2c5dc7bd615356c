//! Query endpoints over `CrudService`. Every list endpoint takes `page`,
//! `page_size`, and a time range, and returns the paginated envelope.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::http::state::AppState;
use crate::store::query::{Page, PacketDto, ProtocolDistributionEntry, TimeBucket, TopSourceIp, TrafficSummary};

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeQuery {
    #[serde(default)]
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct SourceIpQuery {
    pub ip: String,
    #[serde(flatten)]
    pub range: TimeRangeQuery,
}

#[derive(Debug, Deserialize)]
pub struct ProtocolQuery {
    pub protocol: String,
    #[serde(flatten)]
    pub range: TimeRangeQuery,
}

#[derive(Debug, Deserialize)]
pub struct PortQuery {
    pub port: i32,
    #[serde(flatten)]
    pub range: TimeRangeQuery,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub region: String,
    #[serde(flatten)]
    pub range: TimeRangeQuery,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    #[serde(flatten)]
    pub range: TimeRangeQuery,
    pub interval: f64,
}

fn clamp(page_size: i64) -> i64 {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

pub async fn by_time_range(State(state): State<Arc<AppState>>, Query(q): Query<TimeRangeQuery>) -> Json<Page<PacketDto>> {
    Json(state.crud.find_by_time_range(q.start, q.end, q.page, clamp(q.page_size)).await)
}

pub async fn by_source_ip(State(state): State<Arc<AppState>>, Query(q): Query<SourceIpQuery>) -> Json<Page<PacketDto>> {
    Json(state.crud.find_by_source_ip(&q.ip, q.range.start, q.range.end, q.range.page, clamp(q.range.page_size)).await)
}

pub async fn by_protocol(State(state): State<Arc<AppState>>, Query(q): Query<ProtocolQuery>) -> Json<Page<PacketDto>> {
    Json(
        state
            .crud
            .find_by_protocol(&q.protocol, q.range.start, q.range.end, q.range.page, clamp(q.range.page_size))
            .await,
    )
}

pub async fn by_port(State(state): State<Arc<AppState>>, Query(q): Query<PortQuery>) -> Json<Page<PacketDto>> {
    Json(state.crud.find_by_port(q.port, q.range.start, q.range.end, q.range.page, clamp(q.range.page_size)).await)
}

pub async fn by_region(State(state): State<Arc<AppState>>, Query(q): Query<RegionQuery>) -> Json<Page<PacketDto>> {
    Json(state.crud.find_by_region(&q.region, q.range.start, q.range.end, q.range.page, clamp(q.range.page_size)).await)
}

pub async fn top_source_ips(State(state): State<Arc<AppState>>, Query(q): Query<TimeRangeQuery>) -> Json<Page<TopSourceIp>> {
    Json(state.crud.top_source_ips(q.start, q.end, q.page, clamp(q.page_size)).await)
}

pub async fn protocol_distribution(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TimeRangeQuery>,
) -> Json<Page<ProtocolDistributionEntry>> {
    Json(state.crud.protocol_distribution(q.start, q.end, q.page, clamp(q.page_size)).await)
}

pub async fn time_series(State(state): State<Arc<AppState>>, Query(q): Query<TimeSeriesQuery>) -> Json<Page<TimeBucket>> {
    Json(
        state
            .crud
            .time_series(q.range.start, q.range.end, q.interval, q.range.page, clamp(q.range.page_size))
            .await,
    )
}

pub async fn traffic_summary(State(state): State<Arc<AppState>>, Query(q): Query<TimeRangeQuery>) -> Json<Page<TrafficSummary>> {
    Json(state.crud.traffic_summary(q.start, q.end).await)
}
