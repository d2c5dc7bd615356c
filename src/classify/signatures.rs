//! Payload signature checks, one per recognized application protocol.
//!
//! Each function inspects only the TCP payload bytes and returns `Some(tag)`
//! on a match. Ordering matters: `application_protocol` tries these before
//! falling back to the port map, in the fixed priority order below.

fn starts_with_any(payload: &[u8], prefixes: &[&[u8]]) -> bool {
    prefixes.iter().any(|p| payload.starts_with(p))
}

fn contains(payload: &[u8], needle: &[u8]) -> bool {
    payload.windows(needle.len().max(1)).any(|w| w == needle)
}

pub fn check_http(payload: &[u8]) -> bool {
    starts_with_any(
        payload,
        &[b"GET ", b"POST ", b"PUT ", b"DELETE ", b"HEAD ", b"OPTIONS ", b"HTTP/1.0", b"HTTP/1.1"],
    ) || contains(payload, b"Host: ")
        || contains(payload, b"User-Agent: ")
        || contains(payload, b"Content-Type: ")
}

pub fn check_tls(payload: &[u8]) -> bool {
    payload.len() >= 6 && payload[0] == 0x16 && payload[5] == 0x01
}

pub fn check_ssh(payload: &[u8]) -> bool {
    payload.starts_with(b"SSH")
}

pub fn check_dns_tcp(payload: &[u8]) -> bool {
    if payload.len() < 2 {
        return false;
    }
    let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    len > 0 && payload.len() >= len + 2
}

pub fn check_ftp(payload: &[u8]) -> bool {
    if starts_with_any(payload, &[b"USER ", b"PASS ", b"CWD ", b"LIST"]) {
        return true;
    }
    payload.len() >= 4 && payload[0..3].iter().all(|b| b.is_ascii_digit()) && payload[3] == b' '
}

pub fn check_smtp(payload: &[u8]) -> bool {
    starts_with_any(payload, &[b"EHLO ", b"HELO ", b"MAIL FROM:", b"220"])
}

pub fn check_rtsp(payload: &[u8]) -> bool {
    starts_with_any(payload, &[b"OPTIONS ", b"DESCRIBE ", b"SETUP "]) || contains(payload, b"RTSP/1.0")
}

pub fn check_smb(payload: &[u8]) -> bool {
    payload.len() >= 4 && payload[0] == 0x00 && &payload[1..4] == b"SMB"
}

pub fn check_ntp(payload: &[u8]) -> bool {
    !payload.is_empty() && (payload[0] & 0b1100_0111) == 0b0000_0011
}

pub fn check_rdp(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[0] == 0x03 && payload[1] == 0x00
}

pub fn check_quic(payload: &[u8]) -> bool {
    payload.len() >= 6 && (payload[0] & 0x80) == 0x80 && &payload[4..6] == b"Q0"
}

pub fn check_sip(payload: &[u8]) -> bool {
    starts_with_any(payload, &[b"INVITE ", b"REGISTER ", b"SIP/2.0 "])
}

pub fn check_mysql(payload: &[u8]) -> bool {
    payload.len() >= 4 && payload[3] == 0x00
}

pub fn check_bittorrent(payload: &[u8]) -> bool {
    payload.starts_with(b"\x13BitTorrent protocol") || contains(payload, b"8:announce")
}

pub fn check_rtp(payload: &[u8]) -> bool {
    payload.len() >= 12 && (payload[0] & 0xC0) == 0x80
}

/// Fixed priority order: signature order is part of the contract, not an
/// implementation detail — HTTP and TLS are checked before the more
/// ambiguous byte-pattern protocols so they win ties.
pub const SIGNATURE_ORDER: &[(&str, fn(&[u8]) -> bool)] = &[
    ("HTTP", check_http),
    ("TLS", check_tls),
    ("SSH", check_ssh),
    ("DNS", check_dns_tcp),
    ("FTP", check_ftp),
    ("SMTP", check_smtp),
    ("RTSP", check_rtsp),
    ("SMB", check_smb),
    ("NTP", check_ntp),
    ("RDP", check_rdp),
    ("QUIC", check_quic),
    ("SIP", check_sip),
    ("MySQL", check_mysql),
    ("BitTorrent", check_bittorrent),
    ("RTP", check_rtp),
];

/// Tries each signature in priority order, returning the first match.
pub fn match_signature(payload: &[u8]) -> Option<&'static str> {
    SIGNATURE_ORDER.iter().find(|(_, check)| check(payload)).map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_get_request_detected() {
        assert!(check_http(b"GET / HTTP/1.1\r\nHost: example.com\r\n"));
    }

    #[test]
    fn test_http_response_detected() {
        assert!(check_http(b"HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn test_tls_client_hello_detected() {
        let mut payload = vec![0x16, 0x03, 0x01, 0x00, 0x00, 0x01];
        payload.extend([0u8; 10]);
        assert!(check_tls(&payload));
    }

    #[test]
    fn test_ssh_banner_detected() {
        assert!(check_ssh(b"SSH-2.0-OpenSSH_9.0"));
    }

    #[test]
    fn test_match_signature_prefers_http_over_generic_bytes() {
        assert_eq!(match_signature(b"GET /index.html HTTP/1.1\r\n"), Some("HTTP"));
    }

    #[test]
    fn test_match_signature_empty_payload_matches_nothing() {
        assert_eq!(match_signature(b""), None);
    }

    #[test]
    fn test_sip_status_line_requires_trailing_space() {
        assert!(check_sip(b"SIP/2.0 200 OK\r\n"));
        assert!(!check_sip(b"SIP/2.0x is not a status line"));
    }

    #[test]
    fn test_bittorrent_handshake_detected() {
        assert!(check_bittorrent(b"\x13BitTorrent protocol\x00\x00\x00\x00\x00\x00\x00\x00"));
    }

    #[test]
    fn test_rtp_version_bits_detected() {
        let mut payload = vec![0x80u8];
        payload.extend([0u8; 11]);
        assert!(check_rtp(&payload));
    }
}
