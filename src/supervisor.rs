//! Single supervisor owning the capture/consume pipeline's lifecycle.
//! Starts the double-buffer queue, consumer pool, and producer in that
//! order; stops in reverse.

use crate::bpf;
use crate::capture::producer::Producer;
use crate::classify::record::RawPacket;
use crate::classify::ClassifierPipeline;
use crate::config::EnvConfig;
use crate::consumer::Consumer;
use crate::queue::{DoubleBufferQueue, ResizeStrategy, SwapStrategy};
use crate::rules::ConfigFile;
use crate::store::DocumentStore;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::info;

use crate::config::SWAP_THRESHOLD_RATIO;

pub struct Supervisor {
    pub queue: Arc<DoubleBufferQueue<RawPacket>>,
    pub consumer: Consumer,
    pub producer: Arc<Mutex<Producer>>,
}

impl Supervisor {
    /// Wires C2, C6, C4 together and starts capture using the interface and
    /// filters found in `config` and the persisted config file.
    pub fn start(
        env: &EnvConfig,
        store: Arc<dyn DocumentStore>,
        pipeline: Arc<ClassifierPipeline>,
        runtime: Handle,
        config_file: &ConfigFile,
    ) -> Result<Self, crate::error::AppError> {
        let resize_strategy = ResizeStrategy {
            growth_factor: env.growth_factor,
            shrink_factor: env.shrink_factor,
            ..ResizeStrategy::default()
        };
        let queue = Arc::new(DoubleBufferQueue::new(
            env.min_queue_size,
            env.max_queue_size,
            resize_strategy,
            SwapStrategy::Mixed {
                interval: crate::config::SWAP_POLL_INTERVAL * 50,
                threshold_ratio: SWAP_THRESHOLD_RATIO,
            },
        ));

        let consumer = Consumer::new(
            queue.clone(),
            pipeline,
            store,
            runtime,
            env.max_workers,
            env.start_batch_size,
        );

        let mut producer = Producer::new(queue.clone());
        producer.set_interface(env.capture_interface.clone());
        if let Some(expr) = bpf::build_filter_expression(&config_file.filters) {
            producer.apply_filter(expr);
        }
        producer.start()?;
        info!("supervisor: pipeline started");

        Ok(Supervisor { queue, consumer, producer: Arc::new(Mutex::new(producer)) })
    }

    /// Stops producer, consumer, and the shared queue's own swap-monitor and
    /// shrink/metrics threads, in that order, so nothing is left enqueuing
    /// into or polling a queue that downstream consumers have already left.
    pub fn stop(&mut self) {
        self.producer.lock().unwrap().stop();
        self.consumer.stop();
        self.queue.stop();
        info!("supervisor: pipeline stopped");
    }
}
