//! C6: the consumer pool. Coordinates batch collection from the ingestion
//! queue, dispatches to worker threads, classifies each packet, persists the
//! resulting record, and adapts its own batch size to observed load.
//!
//! Grounded on `PacketConsumer`: min/max batch bounds derived from the
//! configured starting batch size, a coordinator loop polling at a fixed
//! granularity, and a rolling-window metrics monitor logging on its own
//! interval — the same named-background-thread shape used throughout this
//! crate's queue and capture modules.

use crate::classify::record::RawPacket;
use crate::classify::ClassifierPipeline;
use crate::config::{CONSUMER_METRICS_INTERVAL, CONSUMER_POLL_GRANULARITY, METRICS_WINDOW_LEN};
use crate::queue::DoubleBufferQueue;
use crate::store::DocumentStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct ConsumerMetrics {
    pub processed: u64,
    pub avg_batch_size: f64,
    pub avg_wait_ms: f64,
    pub avg_processing_delay_ms: f64,
}

struct RollingWindow {
    batch_sizes: VecDeque<f64>,
    waits_ms: VecDeque<f64>,
    delays_ms: VecDeque<f64>,
}

impl RollingWindow {
    fn new() -> Self {
        RollingWindow { batch_sizes: VecDeque::new(), waits_ms: VecDeque::new(), delays_ms: VecDeque::new() }
    }

    fn push(&mut self, batch_size: f64, wait_ms: f64, delay_ms: f64) {
        for (deque, value) in [
            (&mut self.batch_sizes, batch_size),
            (&mut self.waits_ms, wait_ms),
            (&mut self.delays_ms, delay_ms),
        ] {
            deque.push_back(value);
            if deque.len() > METRICS_WINDOW_LEN {
                deque.pop_front();
            }
        }
    }

    fn avg(deque: &VecDeque<f64>) -> f64 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f64>() / deque.len() as f64
        }
    }
}

struct Shared {
    min_batch: usize,
    max_batch: usize,
    max_wait: Duration,
    current_batch: AtomicUsize,
    processed: AtomicUsize,
    window: Mutex<RollingWindow>,
    stop: AtomicBool,
}

/// Worker pool draining the ingestion queue, classifying, and persisting.
pub struct Consumer {
    shared: Arc<Shared>,
    coordinator: Option<JoinHandle<()>>,
    metrics_thread: Option<JoinHandle<()>>,
}

impl Consumer {
    /// `max_workers` bounds concurrent in-flight batches; `start_batch_size`
    /// seeds the adaptive batch size, with min/max derived as half and four
    /// times the start size, floored at 1.
    pub fn new(
        queue: Arc<DoubleBufferQueue<RawPacket>>,
        pipeline: Arc<ClassifierPipeline>,
        store: Arc<dyn DocumentStore>,
        runtime: Handle,
        max_workers: usize,
        start_batch_size: usize,
    ) -> Self {
        assert!(max_workers >= 1, "max_workers must be at least 1");
        assert!(start_batch_size >= 1, "start_batch_size must be at least 1");

        let min_batch = (start_batch_size / 2).max(1);
        let max_batch = start_batch_size * 4;
        let max_wait = CONSUMER_POLL_GRANULARITY * 4;

        let shared = Arc::new(Shared {
            min_batch,
            max_batch,
            max_wait,
            current_batch: AtomicUsize::new(start_batch_size),
            processed: AtomicUsize::new(0),
            window: Mutex::new(RollingWindow::new()),
            stop: AtomicBool::new(false),
        });

        let coordinator = {
            let shared = shared.clone();
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            let store = store.clone();
            let runtime = runtime.clone();
            Some(
                std::thread::Builder::new()
                    .name("consumer-coordinator".into())
                    .spawn(move || coordinator_loop(shared, queue, pipeline, store, runtime, max_workers))
                    .expect("failed to spawn consumer coordinator thread"),
            )
        };

        let metrics_thread = {
            let shared = shared.clone();
            Some(
                std::thread::Builder::new()
                    .name("consumer-metrics".into())
                    .spawn(move || metrics_loop(shared))
                    .expect("failed to spawn consumer metrics thread"),
            )
        };

        Consumer { shared, coordinator, metrics_thread }
    }

    pub fn get_metrics(&self) -> ConsumerMetrics {
        let window = self.shared.window.lock().unwrap();
        ConsumerMetrics {
            processed: self.shared.processed.load(Ordering::Relaxed) as u64,
            avg_batch_size: RollingWindow::avg(&window.batch_sizes),
            avg_wait_ms: RollingWindow::avg(&window.waits_ms),
            avg_processing_delay_ms: RollingWindow::avg(&window.delays_ms),
        }
    }

    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.coordinator.take() {
            let _ = h.join();
        }
        if let Some(h) = self.metrics_thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if !self.shared.stop.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

fn coordinator_loop(
    shared: Arc<Shared>,
    queue: Arc<DoubleBufferQueue<RawPacket>>,
    pipeline: Arc<ClassifierPipeline>,
    store: Arc<dyn DocumentStore>,
    runtime: Handle,
    max_workers: usize,
) {
    info!("consumer coordinator started");
    let pending = Arc::new(AtomicUsize::new(0));

    while !shared.stop.load(Ordering::SeqCst) {
        let target = shared.current_batch.load(Ordering::Relaxed);
        let wait_start = Instant::now();
        let batch = read_batch(&queue, &shared, target);
        let wait = wait_start.elapsed();

        if batch.is_empty() {
            continue;
        }

        if pending.load(Ordering::Relaxed) >= max_workers {
            warn!("consumer pool saturated, coordinator backs off");
            std::thread::sleep(CONSUMER_POLL_GRANULARITY);
        }

        pending.fetch_add(1, Ordering::Relaxed);
        let shared_c = shared.clone();
        let pipeline_c = pipeline.clone();
        let store_c = store.clone();
        let pending_c = pending.clone();
        let batch_len = batch.len();
        let process_start = Instant::now();

        runtime.spawn(async move {
            let mut records = Vec::with_capacity(batch_len);
            for raw in batch {
                records.push(pipeline_c.classify(&raw));
            }
            if let Err(e) = store_c.insert_many(records).await {
                warn!("consumer: persisting batch failed: {e}");
            }
            let delay = process_start.elapsed();
            shared_c.processed.fetch_add(batch_len, Ordering::Relaxed);
            shared_c.window.lock().unwrap().push(
                batch_len as f64,
                wait.as_secs_f64() * 1000.0,
                delay.as_secs_f64() * 1000.0,
            );
            pending_c.fetch_sub(1, Ordering::Relaxed);
        });

        adjust_batch_size(&shared, wait, batch_len, target);
    }
    info!("consumer coordinator stopped");
}

fn read_batch(queue: &DoubleBufferQueue<RawPacket>, shared: &Shared, target: usize) -> Vec<RawPacket> {
    let mut batch = Vec::with_capacity(target);
    let deadline = Instant::now() + shared.max_wait;
    while batch.len() < target && Instant::now() < deadline {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        match queue.pop(Some(CONSUMER_POLL_GRANULARITY)) {
            Some(item) => batch.push(item),
            None => {
                if batch.len() >= shared.min_batch {
                    break;
                }
            }
        }
    }
    batch
}

/// Grows the batch size ×1.5 (capped at `max_batch`) when the wait was
/// short and the batch filled; shrinks ×0.8 (floored at `min_batch`) when
/// the wait was long or the batch came up short.
fn adjust_batch_size(shared: &Shared, wait: Duration, actual_batch_size: usize, current: usize) {
    let half_max_wait = shared.max_wait / 2;
    let new_size = if wait < half_max_wait && actual_batch_size >= current {
        ((current as f64) * 1.5).floor() as usize
    } else if wait >= shared.max_wait || actual_batch_size < shared.min_batch {
        ((current as f64) * 0.8).floor() as usize
    } else {
        current
    };
    let clamped = new_size.clamp(shared.min_batch, shared.max_batch);
    shared.current_batch.store(clamped, Ordering::Relaxed);
}

fn metrics_loop(shared: Arc<Shared>) {
    info!("consumer metrics monitor started");
    while !shared.stop.load(Ordering::SeqCst) {
        std::thread::sleep(CONSUMER_METRICS_INTERVAL);
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let window = shared.window.lock().unwrap();
        info!(
            processed = shared.processed.load(Ordering::Relaxed),
            avg_batch = RollingWindow::avg(&window.batch_sizes),
            avg_wait_ms = RollingWindow::avg(&window.waits_ms),
            "consumer metrics"
        );
    }
    info!("consumer metrics monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_batch_derived_from_start_size() {
        let shared = Shared {
            min_batch: (32 / 2).max(1),
            max_batch: 32 * 4,
            max_wait: CONSUMER_POLL_GRANULARITY * 4,
            current_batch: AtomicUsize::new(32),
            processed: AtomicUsize::new(0),
            window: Mutex::new(RollingWindow::new()),
            stop: AtomicBool::new(false),
        };
        assert_eq!(shared.min_batch, 16);
        assert_eq!(shared.max_batch, 128);
    }

    #[test]
    fn test_adjust_batch_grows_on_short_wait_and_full_batch() {
        let shared = Shared {
            min_batch: 4,
            max_batch: 100,
            max_wait: Duration::from_millis(200),
            current_batch: AtomicUsize::new(20),
            processed: AtomicUsize::new(0),
            window: Mutex::new(RollingWindow::new()),
            stop: AtomicBool::new(false),
        };
        adjust_batch_size(&shared, Duration::from_millis(10), 20, 20);
        assert_eq!(shared.current_batch.load(Ordering::Relaxed), 30);
    }

    #[test]
    fn test_adjust_batch_shrinks_on_long_wait() {
        let shared = Shared {
            min_batch: 4,
            max_batch: 100,
            max_wait: Duration::from_millis(200),
            current_batch: AtomicUsize::new(20),
            processed: AtomicUsize::new(0),
            window: Mutex::new(RollingWindow::new()),
            stop: AtomicBool::new(false),
        };
        adjust_batch_size(&shared, Duration::from_millis(250), 5, 20);
        assert_eq!(shared.current_batch.load(Ordering::Relaxed), 16);
    }

    #[test]
    fn test_adjust_batch_never_exceeds_bounds() {
        let shared = Shared {
            min_batch: 4,
            max_batch: 30,
            max_wait: Duration::from_millis(200),
            current_batch: AtomicUsize::new(28),
            processed: AtomicUsize::new(0),
            window: Mutex::new(RollingWindow::new()),
            stop: AtomicBool::new(false),
        };
        adjust_batch_size(&shared, Duration::from_millis(5), 28, 28);
        assert_eq!(shared.current_batch.load(Ordering::Relaxed), 30);
    }

    #[test]
    fn test_rolling_window_caps_at_configured_length() {
        let mut window = RollingWindow::new();
        for i in 0..(METRICS_WINDOW_LEN + 10) {
            window.push(i as f64, 1.0, 1.0);
        }
        assert_eq!(window.batch_sizes.len(), METRICS_WINDOW_LEN);
    }
}
