//! Bounded, self-resizing queues: the ingestion backbone between the
//! capturer and the consumer pool.

pub mod double_buffer;
pub mod dynamic;
pub mod strategy;

pub use double_buffer::{DoubleBufferMetrics, DoubleBufferQueue};
pub use dynamic::{DynamicQueue, QueueMetrics};
pub use strategy::{ResizeStrategy, SwapStrategy};
