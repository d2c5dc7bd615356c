//! The classifier pipeline: an ordered set of processors that build a
//! `ClassifiedRecord` from a raw captured packet.
//!
//! The order below is fixed and semantically load-bearing, not cosmetic:
//! `check_tcp`/`check_udp` must run before `check_application_protocol`
//! because the latter only inspects TCP payloads once transport info (and
//! therefore the payload slice) is known.

pub mod geoip;
pub mod geoip_downloader;
pub mod parsed;
pub mod port_map;
pub mod record;
pub mod signatures;

use geoip::GeoIpService;
use parsed::{parse_ethernet_frame, Transport};
use port_map::PortMap;
use record::{ClassifiedRecord, Layer, RawPacket};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Shared, read-mostly context threaded through every processor.
pub struct ClassifierPipeline {
    geoip: Arc<GeoIpService>,
    port_map: Arc<PortMap>,
}

impl ClassifierPipeline {
    pub fn new(geoip: Arc<GeoIpService>, port_map: Arc<PortMap>) -> Self {
        ClassifierPipeline { geoip, port_map }
    }

    /// Exposes the live port map so operator-supplied port/protocol rules
    /// can be applied to in-flight classification, not just persisted to
    /// the config file.
    pub fn port_map(&self) -> &PortMap {
        &self.port_map
    }

    /// Runs the full fixed-order pipeline over one raw packet, returning
    /// the finished record. Never panics: a packet this crate cannot parse
    /// still yields a minimal datalink-layer record rather than being
    /// dropped silently.
    pub fn classify(&self, raw: &RawPacket) -> ClassifiedRecord {
        let mut record = ClassifiedRecord::new(raw.timestamp, raw.bytes.len() as u32);

        let Some(parsed) = parse_ethernet_frame(&raw.bytes) else {
            self.assign_id(&mut record);
            return record;
        };

        match parsed.transport {
            Transport::Udp => self.check_udp(&parsed, &mut record),
            Transport::Tcp => self.check_tcp(&parsed, &mut record),
            Transport::Other(_) => {}
        }

        self.check_src_ip_region(&parsed, &mut record);

        if parsed.transport == Transport::Tcp {
            self.check_application_protocol(&parsed, &mut record);
            self.check_ssh_type(&parsed, &mut record);
            self.check_handshake(&parsed, &mut record);
        }

        self.assign_id(&mut record);
        record
    }

    fn check_udp(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        record.source_ip = parsed.source_ip.clone();
        record.source_port = parsed.source_port as i32;
        record.dest_port = parsed.dest_port as i32;
        record.protocol = "UDP".to_string();
        record.bump_layer(Layer::Transport);
    }

    fn check_tcp(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        record.source_ip = parsed.source_ip.clone();
        record.source_port = parsed.source_port as i32;
        record.dest_port = parsed.dest_port as i32;
        if record.protocol == "Unknown" {
            record.protocol = "TCP".to_string();
        }
        record.bump_layer(Layer::Transport);
    }

    fn check_src_ip_region(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        if parsed.source_ip.is_empty() {
            return;
        }
        record.bump_layer(Layer::Network);
        if let Some(region) = self.geoip.check_region(&parsed.source_ip) {
            record.source_region = region;
        }
    }

    fn check_application_protocol(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        if let Some(tag) = signatures::match_signature(parsed.payload) {
            record.protocol = tag.to_string();
            record.bump_layer(Layer::Application);
            return;
        }
        if let Some(tag) = self.port_map.lookup(parsed.source_port, parsed.dest_port) {
            record.protocol = tag;
            record.bump_layer(Layer::Application);
        }
    }

    fn check_ssh_type(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        if parsed.source_port != 22 && parsed.dest_port != 22 {
            return;
        }
        let Some(&msg_type) = parsed.payload.get(5) else { return };
        let label = match msg_type {
            20 | 21 => "SSH-HANDSHAKE",
            50 => "SSH-AUTH",
            t if t >= 90 => "SSH-DATA",
            _ => return,
        };
        record.protocol = label.to_string();
        record.bump_layer(Layer::Application);
    }

    fn check_handshake(&self, parsed: &parsed::ParsedPacket, record: &mut ClassifiedRecord) {
        let syn = parsed.tcp_flags & 0x02 != 0;
        let ack = parsed.tcp_flags & 0x10 != 0;
        record.is_handshake = syn && !ack;
    }

    fn assign_id(&self, record: &mut ClassifiedRecord) {
        record.id = Uuid::new_v4().to_string();
        debug!(id = %record.id, protocol = %record.protocol, "record classified");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> ClassifierPipeline {
        ClassifierPipeline::new(
            Arc::new(GeoIpService::new("/nonexistent/does-not-exist.mmdb")),
            Arc::new(PortMap::default()),
        )
    }

    fn build_ipv4_tcp_frame(payload: &[u8], src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = 6;
        ip[12..16].copy_from_slice(&[93, 184, 216, 34]);
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = flags;
        frame.extend(ip);
        frame.extend(tcp);
        frame.extend(payload);
        frame
    }

    #[test]
    fn test_classify_http_response() {
        let p = pipeline();
        let frame = build_ipv4_tcp_frame(b"HTTP/1.1 200 OK\r\n", 80, 49152, 0x18);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert_eq!(record.protocol, "HTTP");
        assert_eq!(record.layer, Layer::Application);
        assert_eq!(record.source_port, 80);
        assert_eq!(record.dest_port, 49152);
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_classify_ssh_handshake_message_type() {
        let p = pipeline();
        let mut payload = vec![0u8; 6];
        payload[5] = 20; // SSH message type 20 = key exchange init
        let frame = build_ipv4_tcp_frame(&payload, 22, 54000, 0x18);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert_eq!(record.protocol, "SSH-HANDSHAKE");
    }

    #[test]
    fn test_classify_marks_syn_without_ack_as_handshake() {
        let p = pipeline();
        let frame = build_ipv4_tcp_frame(b"", 1000, 2000, 0x02);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert!(record.is_handshake);
    }

    #[test]
    fn test_classify_syn_ack_is_not_handshake() {
        let p = pipeline();
        let frame = build_ipv4_tcp_frame(b"", 1000, 2000, 0x12);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert!(!record.is_handshake);
    }

    #[test]
    fn test_classify_falls_back_to_port_map_when_no_signature_matches() {
        let p = pipeline();
        let frame = build_ipv4_tcp_frame(b"\x00\x01\x02\x03", 443, 51000, 0x18);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert_eq!(record.protocol, "HTTPS");
    }

    #[test]
    fn test_classify_unparsable_packet_still_yields_record_with_id() {
        let p = pipeline();
        let record = p.classify(&RawPacket { bytes: vec![0u8; 3], timestamp: 1.0 });
        assert!(!record.id.is_empty());
        assert_eq!(record.layer, Layer::Datalink);
    }

    #[test]
    fn test_classify_layer_never_regresses_across_processors() {
        let p = pipeline();
        let frame = build_ipv4_tcp_frame(b"GET / HTTP/1.1\r\n", 49200, 80, 0x18);
        let record = p.classify(&RawPacket { bytes: frame, timestamp: 1.0 });
        assert_eq!(record.layer, Layer::Application);
    }
}
