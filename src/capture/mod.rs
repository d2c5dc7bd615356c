//! Live packet capture over libpcap.
//!
//! A single named interface is opened in promiscuous, immediate,
//! non-blocking mode. The capture thread drains bounded batches and hands
//! each raw frame to a registered callback; it never blocks the caller
//! thread and is torn down cleanly by `Drop`, mirroring the teacher's
//! shutdown-flag-plus-background-thread shape. A filter change is applied to
//! the live handle on the capture loop's next iteration rather than
//! requiring a restart.

pub mod producer;

use crate::config::{CAPTURE_BATCH_SIZE, CAPTURE_IDLE_SLEEP};
use crate::error::AppError;
use pcap::{Active, Capture, Device};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

pub type PacketCallback = Arc<dyn Fn(&[u8], f64) + Send + Sync>;

/// Manages a background packet capture thread over one interface.
pub struct Capturer {
    shutdown: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    interface: Mutex<String>,
    filter: Arc<Mutex<String>>,
    /// Bumped on every `set_filter`; the running capture loop compares this
    /// against the generation it last applied to `Capture::filter` so a
    /// filter change reaches an already-running handle atomically, without
    /// a restart.
    filter_generation: Arc<AtomicU64>,
    callback: PacketCallback,
}

impl Capturer {
    pub fn new(callback: PacketCallback) -> Self {
        Capturer {
            shutdown: Arc::new(AtomicBool::new(true)),
            capture_thread: None,
            interface: Mutex::new(String::new()),
            filter: Arc::new(Mutex::new(String::new())),
            filter_generation: Arc::new(AtomicU64::new(0)),
            callback,
        }
    }

    pub fn set_interface(&self, name: impl Into<String>) {
        *self.interface.lock().unwrap() = name.into();
    }

    /// Updates the filter and bumps its generation counter so a running
    /// capture loop picks up the change on its next iteration.
    pub fn set_filter(&self, expr: impl Into<String>) {
        *self.filter.lock().unwrap() = expr.into();
        self.filter_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Opens the interface and spawns the capture thread. Fails fast if the
    /// interface does not exist — a capture lifecycle error the caller must
    /// see, not something to degrade silently.
    pub fn start(&mut self) -> Result<(), AppError> {
        let interface = self.interface.lock().unwrap().clone();
        if interface.is_empty() {
            return Err(AppError::Config("no capture interface configured".into()));
        }

        let device = Device::list()
            .map_err(|e| AppError::Capture(e.to_string()))?
            .into_iter()
            .find(|d| d.name == interface)
            .ok_or_else(|| AppError::Capture(format!("no such interface: {interface}")))?;

        let mut capture: Capture<Active> = Capture::from_device(device)
            .map_err(|e| AppError::Capture(e.to_string()))?
            .promisc(true)
            .immediate_mode(true)
            .open()
            .map_err(|e| AppError::Capture(e.to_string()))?;

        let filter = self.filter.lock().unwrap().clone();
        if !filter.is_empty() {
            capture.filter(&filter, true).map_err(|e| AppError::Capture(e.to_string()))?;
        }
        capture
            .setnonblock()
            .map_err(|e| AppError::Capture(e.to_string()))?;

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = self.shutdown.clone();
        let callback = self.callback.clone();
        let filter_handle = self.filter.clone();
        let filter_generation = self.filter_generation.clone();
        let applied_generation = filter_generation.load(Ordering::SeqCst);

        let thread = std::thread::Builder::new()
            .name("pcap-capture".into())
            .spawn(move || capture_loop(capture, shutdown, callback, filter_handle, filter_generation, applied_generation))
            .expect("failed to spawn capture thread");

        info!(interface = %interface, "capturer started");
        self.capture_thread = Some(thread);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(t) = self.capture_thread.take() {
            let _ = t.join();
        }
        info!("capturer stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn interface(&self) -> String {
        self.interface.lock().unwrap().clone()
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

fn capture_loop(
    mut capture: Capture<Active>,
    shutdown: Arc<AtomicBool>,
    callback: PacketCallback,
    filter: Arc<Mutex<String>>,
    filter_generation: Arc<AtomicU64>,
    mut applied_generation: u64,
) {
    info!("capture loop started");
    while !shutdown.load(Ordering::SeqCst) {
        let current_generation = filter_generation.load(Ordering::SeqCst);
        if current_generation != applied_generation {
            let expr = filter.lock().unwrap().clone();
            match capture.filter(&expr, true) {
                Ok(()) => {
                    applied_generation = current_generation;
                    info!("capture filter updated on running handle");
                }
                Err(e) => warn!("failed to apply updated filter: {e}"),
            }
        }

        let mut dispatched = 0;
        while dispatched < CAPTURE_BATCH_SIZE {
            match capture.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0;
                    callback(packet.data, ts);
                    dispatched += 1;
                }
                Err(pcap::Error::TimeoutExpired) => break,
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => {
                    warn!("capture read error: {e}");
                    break;
                }
            }
        }
        if dispatched == 0 {
            std::thread::sleep(CAPTURE_IDLE_SLEEP);
        }
    }
    info!("capture loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_without_interface_is_config_error() {
        let mut capturer = Capturer::new(Arc::new(|_bytes, _ts| {}));
        let result = capturer.start();
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_start_with_nonexistent_interface_is_capture_error() {
        let mut capturer = Capturer::new(Arc::new(|_bytes, _ts| {}));
        capturer.set_interface("netguard-test-does-not-exist-0");
        let result = capturer.start();
        assert!(matches!(result, Err(AppError::Capture(_))));
    }

}
