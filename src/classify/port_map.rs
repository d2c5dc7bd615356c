//! Well-known port fallback table, consulted when payload signature checks
//! find no match. Augmentable at runtime by operator-supplied
//! `PortProtocolRule`s (see `crate::rules`).

use std::collections::HashMap;
use std::sync::RwLock;

fn builtin_ports() -> HashMap<u16, &'static str> {
    HashMap::from([
        (80, "HTTP"),
        (443, "HTTPS"),
        (53, "DNS"),
        (22, "SSH"),
        (21, "FTP"),
        (25, "SMTP"),
        (554, "RTSP"),
        (445, "SMB"),
        (123, "NTP"),
        (3389, "RDP"),
        (5060, "SIP"),
        (3306, "MySQL"),
        (5432, "PostgreSQL"),
        (27017, "MongoDB"),
    ])
}

/// Thread-safe port -> protocol lookup table, seeded with well-known ports
/// and extensible by operator config.
pub struct PortMap {
    table: RwLock<HashMap<u16, String>>,
}

impl Default for PortMap {
    fn default() -> Self {
        let table = builtin_ports()
            .into_iter()
            .map(|(p, name)| (p, name.to_string()))
            .collect();
        PortMap { table: RwLock::new(table) }
    }
}

impl PortMap {
    /// Looks up `source_port` first, falling back to `dest_port`, matching
    /// the original's sport-then-dport resolution order.
    pub fn lookup(&self, source_port: u16, dest_port: u16) -> Option<String> {
        let table = self.table.read().unwrap();
        table.get(&source_port).or_else(|| table.get(&dest_port)).cloned()
    }

    /// Adds or overwrites a mapping for `port`.
    pub fn set(&self, port: u16, protocol: impl Into<String>) {
        self.table.write().unwrap().insert(port, protocol.into());
    }

    pub fn remove(&self, port: u16) {
        self.table.write().unwrap().remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_source_port() {
        let map = PortMap::default();
        assert_eq!(map.lookup(80, 49152), Some("HTTP".to_string()));
    }

    #[test]
    fn test_lookup_falls_back_to_dest_port() {
        let map = PortMap::default();
        assert_eq!(map.lookup(49152, 443), Some("HTTPS".to_string()));
    }

    #[test]
    fn test_lookup_unknown_ports_returns_none() {
        let map = PortMap::default();
        assert_eq!(map.lookup(50000, 50001), None);
    }

    #[test]
    fn test_runtime_override_is_visible_to_lookup() {
        let map = PortMap::default();
        map.set(9000, "Custom");
        assert_eq!(map.lookup(9000, 1), Some("Custom".to_string()));
        map.remove(9000);
        assert_eq!(map.lookup(9000, 1), None);
    }
}
