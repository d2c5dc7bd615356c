//! Resize and buffer-swap strategies.
//!
//! Collapsed from a hierarchy of strategy classes into tagged variants: each
//! carries only the parameters it needs and exposes a single `decide`-style
//! method.

use crate::config::{EXPAND_THRESHOLD_RATIO, SHRINK_THRESHOLD_RATIO};
use std::time::{Duration, Instant};

/// Decides when a `DynamicQueue` should grow or shrink its capacity.
#[derive(Debug, Clone, Copy)]
pub struct ResizeStrategy {
    pub expand_threshold_ratio: f64,
    pub shrink_threshold_ratio: f64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
}

impl Default for ResizeStrategy {
    fn default() -> Self {
        ResizeStrategy {
            expand_threshold_ratio: EXPAND_THRESHOLD_RATIO,
            shrink_threshold_ratio: SHRINK_THRESHOLD_RATIO,
            growth_factor: 1.5,
            shrink_factor: 0.5,
        }
    }
}

impl ResizeStrategy {
    pub fn should_expand(&self, len: usize, capacity: usize) -> bool {
        if capacity == 0 {
            return false;
        }
        (len as f64) / (capacity as f64) >= self.expand_threshold_ratio
    }

    /// Mirrors the original source's shrink condition literally:
    /// `current_size <= current_size * shrink_factor * shrink_threshold_ratio`.
    /// For the default factors (0.5 * 0.6 = 0.3) this is true only when
    /// `current_size <= 0`, i.e. the queue is empty — shrinking under load is
    /// effectively never triggered by this clause alone, by design inherited
    /// from upstream rather than a new bug.
    pub fn should_shrink(&self, len: usize) -> bool {
        let len = len as f64;
        len <= len * self.shrink_factor * self.shrink_threshold_ratio
    }

    pub fn grow(&self, capacity: usize, max_capacity: usize) -> usize {
        let grown = ((capacity as f64) * self.growth_factor).floor() as usize;
        grown.min(max_capacity).max(capacity)
    }

    pub fn shrink(&self, capacity: usize, min_capacity: usize) -> usize {
        let shrunk = ((capacity as f64) * self.shrink_factor).floor() as usize;
        shrunk.max(min_capacity)
    }
}

/// Decides when a `DoubleBufferQueue` should flip its active buffer.
#[derive(Debug, Clone, Copy)]
pub enum SwapStrategy {
    Time { interval: Duration },
    Size { threshold_ratio: f64 },
    Mixed { interval: Duration, threshold_ratio: f64 },
}

impl SwapStrategy {
    pub fn should_swap(&self, len: usize, capacity: usize, last_swap: Instant) -> bool {
        match *self {
            SwapStrategy::Time { interval } => last_swap.elapsed() >= interval,
            SwapStrategy::Size { threshold_ratio } => {
                capacity > 0 && (len as f64) / (capacity as f64) >= threshold_ratio
            }
            SwapStrategy::Mixed { interval, threshold_ratio } => {
                last_swap.elapsed() >= interval
                    || (capacity > 0 && (len as f64) / (capacity as f64) >= threshold_ratio)
            }
        }
    }
}
