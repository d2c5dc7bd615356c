//! Geo-IP region lookup with graceful, permanent degradation.
//!
//! Grounded on `GeoIPSingleton`: once the reader repeatedly fails to load
//! (missing database, bad license key, unreachable download), `given_up`
//! latches and every subsequent lookup silently returns "Unknown" rather
//! than retrying or erroring. The download itself is a boot-time utility and
//! is only attempted once, outside the hot lookup path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, error, warn};

const MAX_LOAD_ATTEMPTS: u32 = 3;

/// Looks up the ISO country code for a source IP, degrading to `"Unknown"`
/// once it has given up on the underlying database.
pub struct GeoIpService {
    reader: RwLock<Option<maxminddb::Reader<Vec<u8>>>>,
    given_up: AtomicBool,
    load_attempts: std::sync::atomic::AtomicU32,
    db_path: String,
}

impl GeoIpService {
    pub fn new(db_path: impl Into<String>) -> Self {
        let db_path = db_path.into();
        let reader = maxminddb::Reader::open_readfile(&db_path).ok();
        let given_up = reader.is_none();
        if given_up {
            warn!(path = %db_path, "GeoIP database not available at startup; lookups degrade to Unknown until loaded");
        }
        GeoIpService {
            reader: RwLock::new(reader),
            given_up: AtomicBool::new(false),
            load_attempts: std::sync::atomic::AtomicU32::new(0),
            db_path,
        }
    }

    /// Attempts a late (re-)load of the database, e.g. after a boot-time
    /// downloader has just populated `db_path`. No-op once given up.
    pub fn try_reload(&self) {
        if self.given_up.load(Ordering::Acquire) {
            return;
        }
        if self.reader.read().unwrap().is_some() {
            return;
        }
        let attempts = self.load_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        match maxminddb::Reader::open_readfile(&self.db_path) {
            Ok(r) => {
                *self.reader.write().unwrap() = Some(r);
            }
            Err(e) => {
                if attempts >= MAX_LOAD_ATTEMPTS {
                    self.given_up.store(true, Ordering::Release);
                    error!(path = %self.db_path, "giving up on GeoIP database after {attempts} failed attempts: {e}");
                } else {
                    warn!(path = %self.db_path, attempts, "GeoIP database still unavailable: {e}");
                }
            }
        }
    }

    /// Returns the ISO country code, `"Unknown"` if the address isn't
    /// found, or `None` if this service has given up on the database.
    pub fn check_region(&self, source_ip: &str) -> Option<String> {
        if self.given_up.load(Ordering::Acquire) {
            return None;
        }
        let reader = self.reader.read().unwrap();
        let Some(reader) = reader.as_ref() else {
            return Some("Unknown".to_string());
        };
        let Ok(ip) = source_ip.parse::<std::net::IpAddr>() else {
            return Some("Unknown".to_string());
        };
        match reader.lookup::<maxminddb::geoip2::Country>(ip) {
            Ok(country) => {
                let code = country
                    .country
                    .and_then(|c| c.iso_code)
                    .unwrap_or("Unknown")
                    .to_string();
                debug!(ip = %source_ip, code = %code, "GeoIP lookup resolved");
                Some(code)
            }
            Err(_) => Some("Unknown".to_string()),
        }
    }

    pub fn has_given_up(&self) -> bool {
        self.given_up.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_does_not_give_up_immediately() {
        let svc = GeoIpService::new("/nonexistent/path/does-not-exist.mmdb");
        assert!(!svc.has_given_up());
        assert_eq!(svc.check_region("1.2.3.4"), Some("Unknown".to_string()));
    }

    #[test]
    fn test_try_reload_gives_up_after_max_attempts() {
        let svc = GeoIpService::new("/nonexistent/path/does-not-exist.mmdb");
        for _ in 0..MAX_LOAD_ATTEMPTS {
            svc.try_reload();
        }
        assert!(svc.has_given_up());
        assert_eq!(svc.check_region("1.2.3.4"), None);
    }

    #[test]
    fn test_invalid_ip_string_returns_unknown_not_panic() {
        let svc = GeoIpService::new("/nonexistent/path/does-not-exist.mmdb");
        assert_eq!(svc.check_region("not-an-ip"), Some("Unknown".to_string()));
    }
}
