//! C8: the query engine. Composes `PipelineBuilder` pipelines and maps raw
//! aggregate results into DTOs, always wrapped in a paginated envelope.
//!
//! Grounded on `QueryExecutor` (one method per query, never raising through
//! the boundary) and the newer `CrudService` (percentage fields computed
//! against the *page* sum — see `DESIGN.md` open question 2).

use super::pipeline::PipelineBuilder;
use super::DocumentStore;
use bson::{doc, Document};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Uniform envelope every list query returns.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub data: Vec<T>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PacketDto {
    pub id: String,
    pub timestamp: f64,
    pub source_ip: String,
    pub source_port: i32,
    pub dest_port: i32,
    pub source_region: String,
    pub protocol: String,
    pub length: u32,
    pub is_handshake: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct TopSourceIp {
    pub source_ip: String,
    pub total_packets: i64,
    pub total_bytes: i64,
    pub source_region: String,
    pub percentage_packets: f64,
    pub percentage_bytes: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProtocolDistributionEntry {
    pub protocol: String,
    pub total_packets: i64,
    pub total_bytes: i64,
    pub percentage_count: f64,
    pub percentage_bytes: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct TimeBucket {
    pub start_time: f64,
    pub end_time: f64,
    pub total_packets: i64,
    pub total_bytes: i64,
}

#[derive(Debug, Serialize)]
pub struct TrafficSummary {
    pub start: f64,
    pub end: f64,
    pub top_source_ips: Vec<TopSourceIp>,
    pub protocol_distribution: Vec<ProtocolDistributionEntry>,
}

fn packet_from_doc(doc: &Document) -> Option<PacketDto> {
    Some(PacketDto {
        id: doc.get_str("_id").ok()?.to_string(),
        timestamp: doc.get_f64("timestamp").ok()?,
        source_ip: doc.get_str("source_ip").unwrap_or_default().to_string(),
        source_port: doc.get_i32("source_port").unwrap_or(-1),
        dest_port: doc.get_i32("dest_port").unwrap_or(-1),
        source_region: doc.get_str("source_region").unwrap_or("Unknown").to_string(),
        protocol: doc.get_str("protocol").unwrap_or("Unknown").to_string(),
        length: doc.get_i32("length").unwrap_or(0) as u32,
        is_handshake: doc.get_bool("is_handshake").unwrap_or(false),
    })
}

fn unpack_facet(mut docs: Vec<Document>) -> (i64, Vec<Document>) {
    let Some(facet) = docs.pop() else { return (0, Vec::new()) };
    let total = facet
        .get_array("metadata")
        .ok()
        .and_then(|m| m.first())
        .and_then(|d| d.as_document())
        .and_then(|d| d.get_i32("total").ok())
        .unwrap_or(0) as i64;
    let data = facet.get_array("data").ok().map(|a| a.iter().filter_map(|d| d.as_document().cloned()).collect()).unwrap_or_default();
    (total, data)
}

/// Composes pipelines and maps results to DTOs against a `DocumentStore`.
pub struct CrudService {
    store: Arc<dyn DocumentStore>,
}

impl CrudService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        CrudService { store }
    }

    fn clamp_page(page: i64, page_size: i64) -> (i64, i64) {
        (page.max(1), page_size.clamp(1, crate::config::MAX_PAGE_SIZE))
    }

    pub async fn find_by_time_range(&self, start: f64, end: f64, page: i64, page_size: i64) -> Page<PacketDto> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .sort(doc! { "timestamp": -1 })
            .paginate(page, page_size)
            .build();
        self.run_paginated(pipeline, page, page_size, packet_from_doc).await
    }

    pub async fn find_by_source_ip(&self, ip: &str, start: f64, end: f64, page: i64, page_size: i64) -> Page<PacketDto> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .match_source_ip(ip)
            .sort(doc! { "timestamp": -1 })
            .paginate(page, page_size)
            .build();
        self.run_paginated(pipeline, page, page_size, packet_from_doc).await
    }

    pub async fn find_by_protocol(&self, protocol: &str, start: f64, end: f64, page: i64, page_size: i64) -> Page<PacketDto> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .match_protocol(protocol)
            .sort(doc! { "timestamp": -1 })
            .paginate(page, page_size)
            .build();
        self.run_paginated(pipeline, page, page_size, packet_from_doc).await
    }

    pub async fn find_by_port(&self, port: i32, start: f64, end: f64, page: i64, page_size: i64) -> Page<PacketDto> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .match_port(port)
            .sort(doc! { "timestamp": -1 })
            .paginate(page, page_size)
            .build();
        self.run_paginated(pipeline, page, page_size, packet_from_doc).await
    }

    pub async fn find_by_region(&self, region: &str, start: f64, end: f64, page: i64, page_size: i64) -> Page<PacketDto> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .match_region(region)
            .sort(doc! { "timestamp": -1 })
            .paginate(page, page_size)
            .build();
        self.run_paginated(pipeline, page, page_size, packet_from_doc).await
    }

    /// Percentages are computed against the page's own sum of
    /// `total_bytes`/`total_packets`, not a separate global aggregation —
    /// see `DESIGN.md` open question 2.
    pub async fn top_source_ips(&self, start: f64, end: f64, page: i64, page_size: i64) -> Page<TopSourceIp> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .group_by_source_ip()
            .sort(doc! { "total_bytes": -1 })
            .paginate(page, page_size)
            .build();

        let result = self.aggregate_or_empty(pipeline).await;
        let (total, raw_data) = result;

        let total_packets_sum: i64 = raw_data.iter().filter_map(|d| d.get_i64("total_packets").ok()).sum();
        let total_bytes_sum: i64 = raw_data.iter().filter_map(|d| d.get_i64("total_bytes").ok()).sum();

        let data = raw_data
            .iter()
            .filter_map(|d| {
                let total_packets = d.get_i64("total_packets").ok()?;
                let total_bytes = d.get_i64("total_bytes").ok()?;
                Some(TopSourceIp {
                    source_ip: d.get_str("source_ip").ok()?.to_string(),
                    total_packets,
                    total_bytes,
                    source_region: d.get_str("source_region").unwrap_or("Unknown").to_string(),
                    percentage_packets: percentage(total_packets, total_packets_sum),
                    percentage_bytes: percentage(total_bytes, total_bytes_sum),
                })
            })
            .collect();

        Page { total, page, page_size, data }
    }

    pub async fn protocol_distribution(&self, start: f64, end: f64, page: i64, page_size: i64) -> Page<ProtocolDistributionEntry> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .group_by_protocol()
            .sort(doc! { "total_bytes": -1 })
            .paginate(page, page_size)
            .build();

        let (total, raw_data) = self.aggregate_or_empty(pipeline).await;

        let total_packets_sum: i64 = raw_data.iter().filter_map(|d| d.get_i64("total_packets").ok()).sum();
        let total_bytes_sum: i64 = raw_data.iter().filter_map(|d| d.get_i64("total_bytes").ok()).sum();

        let data = raw_data
            .iter()
            .filter_map(|d| {
                let total_packets = d.get_i64("total_packets").ok()?;
                let total_bytes = d.get_i64("total_bytes").ok()?;
                Some(ProtocolDistributionEntry {
                    protocol: d.get_str("protocol").ok()?.to_string(),
                    total_packets,
                    total_bytes,
                    percentage_count: percentage(total_packets, total_packets_sum),
                    percentage_bytes: percentage(total_bytes, total_bytes_sum),
                })
            })
            .collect();

        Page { total, page, page_size, data }
    }

    pub async fn time_series(&self, start: f64, end: f64, interval: f64, page: i64, page_size: i64) -> Page<TimeBucket> {
        let (page, page_size) = Self::clamp_page(page, page_size);
        let pipeline = PipelineBuilder::new()
            .match_time_range(start, end)
            .group_by_time_interval(interval)
            .sort(doc! { "start_time": 1 })
            .paginate(page, page_size)
            .build();

        let (total, raw_data) = self.aggregate_or_empty(pipeline).await;
        let data = raw_data
            .iter()
            .filter_map(|d| {
                Some(TimeBucket {
                    start_time: d.get_f64("start_time").ok()?,
                    end_time: d.get_f64("end_time").ok()?,
                    total_packets: d.get_i64("total_packets").ok()?,
                    total_bytes: d.get_i64("total_bytes").ok()?,
                })
            })
            .collect();
        Page { total, page, page_size, data }
    }

    /// Combines `top_source_ips` and `protocol_distribution` into a single
    /// entry, matching the original's `get_traffic_summary`, wrapped in the
    /// same single-entry paginated envelope every other query handler uses.
    pub async fn traffic_summary(&self, start: f64, end: f64) -> Page<TrafficSummary> {
        let top_ips = self.top_source_ips(start, end, 1, crate::config::MAX_PAGE_SIZE).await;
        let distribution = self.protocol_distribution(start, end, 1, crate::config::MAX_PAGE_SIZE).await;
        let summary = TrafficSummary {
            start,
            end,
            top_source_ips: top_ips.data,
            protocol_distribution: distribution.data,
        };
        Page { total: 1, page: 1, page_size: 1, data: vec![summary] }
    }

    async fn run_paginated<T>(
        &self,
        pipeline: Vec<Document>,
        page: i64,
        page_size: i64,
        map_fn: impl Fn(&Document) -> Option<T>,
    ) -> Page<T> {
        let (total, raw_data) = self.aggregate_or_empty(pipeline).await;
        let data = raw_data.iter().filter_map(map_fn).collect();
        Page { total, page, page_size, data }
    }

    async fn aggregate_or_empty(&self, pipeline: Vec<Document>) -> (i64, Vec<Document>) {
        match self.store.aggregate(pipeline).await {
            Ok(docs) => unpack_facet(docs),
            Err(e) => {
                warn!("query failed, returning empty page: {e}");
                (0, Vec::new())
            }
        }
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::record::{ClassifiedRecord, Layer};
    use crate::store::memory::InMemoryStore;

    fn record(protocol: &str, ip: &str, ts: f64, len: u32) -> ClassifiedRecord {
        ClassifiedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: ts,
            layer: Layer::Application,
            source_ip: ip.to_string(),
            source_port: 1234,
            dest_port: 80,
            source_region: "US".to_string(),
            protocol: protocol.to_string(),
            length: len,
            is_handshake: false,
        }
    }

    async fn seeded_service() -> CrudService {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..3 {
            store.insert_one(record("HTTP", "10.0.0.1", i as f64, 100)).await.unwrap();
        }
        for i in 0..2 {
            store.insert_one(record("DNS", "10.0.0.2", i as f64, 50)).await.unwrap();
        }
        CrudService::new(store)
    }

    #[tokio::test]
    async fn test_top_source_ips_returns_paginated_envelope_sorted_by_bytes() {
        let svc = seeded_service().await;
        let page = svc.top_source_ips(0.0, 10.0, 1, 2).await;
        assert_eq!(page.total, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 2);
        assert_eq!(page.data[0].source_ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_top_source_ips_percentages_sum_to_page_total() {
        let svc = seeded_service().await;
        let page = svc.top_source_ips(0.0, 10.0, 1, 10).await;
        let sum: f64 = page.data.iter().map(|d| d.percentage_bytes).sum();
        assert!((sum - 100.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_protocol_distribution_computes_percentages() {
        let svc = seeded_service().await;
        let page = svc.protocol_distribution(0.0, 10.0, 1, 10).await;
        assert_eq!(page.total, 2);
        let http = page.data.iter().find(|d| d.protocol == "HTTP").unwrap();
        // 300 bytes HTTP vs 100 bytes DNS -> 75%
        assert!((http.percentage_bytes - 75.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_empty_store_returns_zeroed_envelope_not_error() {
        let store = Arc::new(InMemoryStore::new());
        let svc = CrudService::new(store);
        let page = svc.find_by_time_range(0.0, 100.0, 1, 10).await;
        assert_eq!(page.total, 0);
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_traffic_summary_combines_both_queries() {
        let svc = seeded_service().await;
        let page = svc.traffic_summary(0.0, 10.0).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        let summary = &page.data[0];
        assert_eq!(summary.top_source_ips.len(), 2);
        assert_eq!(summary.protocol_distribution.len(), 2);
    }
}
