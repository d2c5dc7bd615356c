//! C4: adapts `Capturer` callbacks into `DoubleBufferQueue` enqueues.

use crate::classify::record::RawPacket;
use crate::config::PRODUCER_RESTART_PAUSE;
use crate::queue::DoubleBufferQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::Capturer;

/// Thin adapter between the capturer and the ingestion queue.
pub struct Producer {
    capturer: Capturer,
    captured: Arc<AtomicU64>,
}

impl Producer {
    pub fn new(queue: Arc<DoubleBufferQueue<RawPacket>>) -> Self {
        let captured = Arc::new(AtomicU64::new(0));
        let captured_clone = captured.clone();
        let callback = Arc::new(move |bytes: &[u8], timestamp: f64| {
            captured_clone.fetch_add(1, Ordering::Relaxed);
            if !queue.enqueue(RawPacket { bytes: bytes.to_vec(), timestamp }) {
                warn!("producer: queue full, packet dropped");
            }
        });
        Producer { capturer: Capturer::new(callback), captured }
    }

    pub fn set_interface(&self, name: impl Into<String>) {
        self.capturer.set_interface(name);
    }

    pub fn apply_filter(&self, expr: impl Into<String>) {
        self.capturer.set_filter(expr);
    }

    pub fn start(&mut self) -> Result<(), crate::error::AppError> {
        self.capturer.start()
    }

    pub fn stop(&mut self) {
        self.capturer.stop();
    }

    pub fn restart(&mut self) -> Result<(), crate::error::AppError> {
        self.stop();
        std::thread::sleep(PRODUCER_RESTART_PAUSE);
        info!("producer restarting");
        self.start()
    }

    pub fn captured_count(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.capturer.is_running()
    }

    pub fn interface(&self) -> String {
        self.capturer.interface()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ResizeStrategy, SwapStrategy};

    #[test]
    fn test_producer_requires_interface_before_start() {
        let q = Arc::new(DoubleBufferQueue::new(
            4,
            16,
            ResizeStrategy::default(),
            SwapStrategy::Size { threshold_ratio: 0.75 },
        ));
        let mut producer = Producer::new(q);
        assert!(producer.start().is_err());
    }

    #[test]
    fn test_captured_count_starts_at_zero() {
        let q = Arc::new(DoubleBufferQueue::new(
            4,
            16,
            ResizeStrategy::default(),
            SwapStrategy::Size { threshold_ratio: 0.75 },
        ));
        let producer = Producer::new(q);
        assert_eq!(producer.captured_count(), 0);
    }
}
