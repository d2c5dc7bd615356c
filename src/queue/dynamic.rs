//! `DynamicQueue`: a bounded FIFO that grows and shrinks with observed load.
//!
//! Grounded on the original `DynamicQueue` implementation: two background
//! threads (shrink monitor, metrics monitor) run alongside the data path,
//! each consulting a stop-event so `stop()` can cleanly join them.

use crate::config::{METRICS_SAMPLE_INTERVAL, METRICS_WINDOW_LEN, SHRINK_CHECK_INTERVAL, SHRINK_TIMEOUT};
use crate::queue::strategy::ResizeStrategy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone)]
pub struct QueueMetrics {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub resize_count: u64,
    pub avg_load: f64,
}

struct Inner<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    min_capacity: usize,
    max_capacity: usize,
    strategy: ResizeStrategy,
    last_expand: Mutex<Instant>,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    resize_count: AtomicU64,
    load_samples: Mutex<VecDeque<f64>>,
    stop: AtomicBool,
}

/// A bounded, self-resizing FIFO queue.
pub struct DynamicQueue<T> {
    shared: Arc<Shared<T>>,
    shrink_thread: Mutex<Option<JoinHandle<()>>>,
    metrics_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> DynamicQueue<T> {
    pub fn new(min_capacity: usize, max_capacity: usize, strategy: ResizeStrategy) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner { buf: VecDeque::new(), capacity: min_capacity }),
            not_empty: Condvar::new(),
            min_capacity,
            max_capacity,
            strategy,
            last_expand: Mutex::new(Instant::now()),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            resize_count: AtomicU64::new(0),
            load_samples: Mutex::new(VecDeque::new()),
            stop: AtomicBool::new(false),
        });

        let shrink_thread = {
            let shared = shared.clone();
            Mutex::new(Some(
                std::thread::Builder::new()
                    .name("dynqueue-shrink".into())
                    .spawn(move || shrink_monitor_loop(shared))
                    .expect("failed to spawn dynqueue shrink monitor thread"),
            ))
        };
        let metrics_thread = {
            let shared = shared.clone();
            Mutex::new(Some(
                std::thread::Builder::new()
                    .name("dynqueue-metrics".into())
                    .spawn(move || metrics_monitor_loop(shared))
                    .expect("failed to spawn dynqueue metrics monitor thread"),
            ))
        };

        DynamicQueue { shared, shrink_thread, metrics_thread }
    }

    /// Attempts to enqueue `item`. Returns `false` (and counts a drop) if the
    /// queue is at capacity.
    pub fn enqueue(&self, item: T) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.buf.len() >= inner.capacity {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        inner.buf.push_back(item);
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);

        if self.shared.strategy.should_expand(inner.buf.len(), inner.capacity) {
            let new_cap = self.shared.strategy.grow(inner.capacity, self.shared.max_capacity);
            if new_cap != inner.capacity {
                inner.capacity = new_cap;
                self.shared.resize_count.fetch_add(1, Ordering::Relaxed);
                *self.shared.last_expand.lock().unwrap() = Instant::now();
                debug!(new_capacity = new_cap, "dynqueue expanded");
            }
        }
        self.shared.not_empty.notify_one();
        true
    }

    /// Pops the front item. If `timeout` is `Some`, blocks up to that long
    /// waiting for an item; `None` returns immediately.
    pub fn pop(&self, timeout: Option<Duration>) -> Option<T> {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.buf.is_empty() {
            match timeout {
                None => return None,
                Some(d) => {
                    let (guard, _) = self
                        .shared
                        .not_empty
                        .wait_timeout_while(inner, d, |i| i.buf.is_empty())
                        .unwrap();
                    inner = guard;
                }
            }
        }
        let item = inner.buf.pop_front();
        if item.is_some() {
            self.shared.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    pub fn peek(&self) -> bool {
        !self.shared.inner.lock().unwrap().buf.is_empty()
    }

    pub fn clear(&self) {
        self.shared.inner.lock().unwrap().buf.clear();
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.inner.lock().unwrap().capacity
    }

    pub fn get_metrics(&self) -> QueueMetrics {
        let avg_load = {
            let samples = self.shared.load_samples.lock().unwrap();
            if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            }
        };
        QueueMetrics {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            dequeued: self.shared.dequeued.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            resize_count: self.shared.resize_count.load(Ordering::Relaxed),
            avg_load,
        }
    }

    /// Signals the background monitors to stop and joins them. Items still
    /// queued at this point are left in place (the caller decides whether to
    /// drain or drop them). Takes `&self` so a queue shared via `Arc` can
    /// still be stopped by any holder.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.not_empty.notify_all();
        if let Some(h) = self.shrink_thread.lock().unwrap().take() {
            let _ = h.join();
        }
        if let Some(h) = self.metrics_thread.lock().unwrap().take() {
            let _ = h.join();
        }
    }
}

impl<T: Send + 'static> Drop for DynamicQueue<T> {
    fn drop(&mut self) {
        if !self.shared.stop.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

fn shrink_monitor_loop<T>(shared: Arc<Shared<T>>) {
    info!("dynqueue shrink monitor started");
    while !shared.stop.load(Ordering::SeqCst) {
        std::thread::sleep(SHRINK_CHECK_INTERVAL);
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let since_expand = shared.last_expand.lock().unwrap().elapsed();
        if since_expand < SHRINK_TIMEOUT {
            continue;
        }
        let mut inner = shared.inner.lock().unwrap();
        if shared.strategy.should_shrink(inner.buf.len()) {
            let new_cap = shared.strategy.shrink(inner.capacity, shared.min_capacity);
            let new_cap = new_cap.max(inner.buf.len());
            if new_cap != inner.capacity {
                inner.capacity = new_cap;
                shared.resize_count.fetch_add(1, Ordering::Relaxed);
                debug!(new_capacity = new_cap, "dynqueue shrunk");
            }
        }
    }
    info!("dynqueue shrink monitor stopped");
}

fn metrics_monitor_loop<T>(shared: Arc<Shared<T>>) {
    info!("dynqueue metrics monitor started");
    while !shared.stop.load(Ordering::SeqCst) {
        std::thread::sleep(METRICS_SAMPLE_INTERVAL);
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let inner = shared.inner.lock().unwrap();
        let load = if inner.capacity == 0 {
            0.0
        } else {
            inner.buf.len() as f64 / inner.capacity as f64
        };
        drop(inner);
        let mut samples = shared.load_samples.lock().unwrap();
        samples.push_back(load);
        if samples.len() > METRICS_WINDOW_LEN {
            samples.pop_front();
        }
    }
    info!("dynqueue metrics monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_queue() -> DynamicQueue<i32> {
        DynamicQueue::new(2, 8, ResizeStrategy::default())
    }

    #[test]
    fn test_empty_queue_blocking_pop_times_out() {
        let q = small_queue();
        let start = Instant::now();
        let result = q.pop(Some(Duration::from_millis(50)));
        let elapsed = start.elapsed();
        assert!(result.is_none());
        assert!(elapsed >= Duration::from_millis(45));
        assert!(elapsed <= Duration::from_millis(200));
    }

    #[test]
    fn test_enqueue_dequeue_preserves_fifo_order() {
        let q = small_queue();
        assert!(q.enqueue(1));
        assert!(q.enqueue(2));
        assert_eq!(q.pop(None), Some(1));
        assert_eq!(q.pop(None), Some(2));
    }

    #[test]
    fn test_expand_on_fill_grows_capacity() {
        let q = DynamicQueue::new(2, 8, ResizeStrategy::default());
        assert_eq!(q.capacity(), 2);
        q.enqueue(1);
        q.enqueue(2);
        // 2/2 >= 0.8 ratio -> expand to floor(2*1.5)=3
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    fn test_drop_counted_when_at_max_capacity() {
        let q = DynamicQueue::new(1, 1, ResizeStrategy::default());
        assert!(q.enqueue(1));
        assert!(!q.enqueue(2));
        assert_eq!(q.get_metrics().dropped, 1);
    }

    #[test]
    fn test_capacity_never_exceeds_configured_max() {
        let q = DynamicQueue::new(2, 4, ResizeStrategy::default());
        for i in 0..4 {
            q.enqueue(i);
        }
        assert!(q.capacity() <= 4);
    }

    #[test]
    fn test_conservation_of_items_enqueued_equals_dequeued_plus_dropped_plus_len() {
        let q = DynamicQueue::new(2, 4, ResizeStrategy::default());
        for i in 0..10 {
            q.enqueue(i);
        }
        let _ = q.pop(None);
        let _ = q.pop(None);
        let metrics = q.get_metrics();
        assert_eq!(metrics.enqueued, metrics.dequeued + metrics.dropped + q.len() as u64);
    }
}
